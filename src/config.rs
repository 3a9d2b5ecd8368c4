use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::cli::*;

/// Class every image is stored under
pub const CLASS_NAME: &str = "Image";
/// Weaviate module that turns the `image` blob into a vector
pub const VECTORIZER: &str = "img2vec-neural";

/// Connection settings of the vector database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub host: String,
    pub scheme: String,
    pub port: u16,
    /// Extra headers sent with every request, e.g. API keys
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            scheme: "http".to_string(),
            port: 8080,
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Class definition created on first use
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchema {
    pub class: &'static str,
    pub vectorizer: &'static str,
    pub module_config: BTreeMap<&'static str, ModuleConfig>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    pub image_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: &'static str,
    pub data_type: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

impl ClassSchema {
    pub fn image() -> Self {
        Self {
            class: CLASS_NAME,
            vectorizer: VECTORIZER,
            module_config: BTreeMap::from([(VECTORIZER, ModuleConfig { image_fields: vec!["image"] })]),
            properties: vec![
                Property { name: "image", data_type: vec!["blob"], description: None },
                Property {
                    name: "text",
                    data_type: vec!["string"],
                    description: Some("Optional description or caption for the image"),
                },
            ],
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct BackendOptions {
    /// Vector database host
    #[arg(long, global = true, default_value = "localhost")]
    pub host: String,
    /// Vector database scheme
    #[arg(long, global = true, default_value = "http")]
    pub scheme: String,
    /// Vector database port
    #[arg(long, global = true, default_value_t = 8080)]
    pub port: u16,
    /// Extra request header, may be repeated
    #[arg(short = 'H', long = "header", global = true, value_name = "KEY=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
}

impl From<&BackendOptions> for BackendConfig {
    fn from(opts: &BackendOptions) -> Self {
        Self {
            host: opts.host.clone(),
            scheme: opts.scheme.clone(),
            port: opts.port,
            headers: opts.headers.iter().cloned().collect(),
            timeout: Duration::from_secs(opts.timeout),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imgsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    #[command(flatten)]
    pub backend: BackendOptions,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// Connect to the database and create the image class if missing
    Init(InitCommand),
    /// Index an image, or every image in a directory
    Add(AddCommand),
    /// Search images similar to the given one
    Search(SearchCommand),
    /// Delete an indexed image
    Delete(DeleteCommand),
    /// Show the number of indexed images
    Count(CountCommand),
}

fn parse_header(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid header, expected KEY=VALUE: {}", s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}
