use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct CountCommand {}

impl SubCommandExtend for CountCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts, None)?;
        println!("{}", engine.image_count().await?);
        Ok(())
    }
}
