use std::path::PathBuf;

use clap::Parser;

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// Image file, or directory whose files are all indexed
    pub path: PathBuf,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = open_engine(opts, None)?;
        let ids = if self.path.is_dir() {
            engine.index_directory(&self.path).await?
        } else {
            vec![engine.index_image(&self.path).await?]
        };
        for id in ids {
            println!("{}", id);
        }
        Ok(())
    }
}
