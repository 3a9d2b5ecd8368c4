use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// Id returned when the image was added
    pub id: String,
}

impl SubCommandExtend for DeleteCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts, None)?;
        if engine.delete_image(&self.id).await? {
            println!("deleted {}", self.id);
        }
        Ok(())
    }
}
