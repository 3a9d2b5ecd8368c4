use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::{SubCommandExtend, open_engine};
use crate::config::Opts;
use crate::searcher::{SearchOptions, SearchSummary};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// Image to search for
    pub image: PathBuf,
    /// Number of neighbors requested from the database
    #[arg(short, long, value_name = "N", default_value_t = 10)]
    pub limit: usize,
    /// Minimum similarity of a result, from 0 to 1
    #[arg(short, long, default_value_t = 0.7)]
    pub threshold: f32,
    /// Number of leading neighbors to skip
    #[arg(long, value_name = "N")]
    pub offset: Option<usize>,
    /// Directory similar images are saved to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let options = SearchOptions::new(self.limit, self.threshold, self.offset)?;
        let engine = open_engine(opts, self.output.clone())?;
        let summary = engine.find_similar_images(&self.image, &options).await?;
        print_result(&summary, self.output_format)
    }
}

fn print_result(summary: &SearchSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?)
        }
        OutputFormat::Table => {
            for hit in &summary.hits {
                println!(
                    "{:.2}\t{}\t{}\t{}",
                    hit.similarity,
                    hit.id,
                    hit.text.as_deref().unwrap_or("-"),
                    hit.saved.display()
                );
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
