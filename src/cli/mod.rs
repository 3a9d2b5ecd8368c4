mod add;
mod count;
mod delete;
mod init;
mod search;

pub use add::*;
pub use count::*;
pub use delete::*;
pub use init::*;
pub use search::*;

use std::path::PathBuf;

use crate::config::{BackendConfig, Opts};
use crate::engine::{DEFAULT_OUTPUT_DIR, ImageSearchEngine, ImageSearchEngineBuilder};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

fn open_engine(opts: &Opts, output_dir: Option<PathBuf>) -> anyhow::Result<ImageSearchEngine> {
    let builder = ImageSearchEngineBuilder::new(BackendConfig::from(&opts.backend))
        .output_dir(output_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)));
    Ok(builder.open()?)
}
