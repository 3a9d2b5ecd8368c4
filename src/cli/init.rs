use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct InitCommand {}

impl SubCommandExtend for InitCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts, None)?;
        engine.initialize().await?;
        Ok(())
    }
}
