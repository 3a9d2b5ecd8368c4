pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod searcher;

pub use backend::{SearchHit, VectorBackend, WeaviateBackend};
pub use client::{RemoteState, SearchClient};
pub use config::{BackendConfig, Opts};
pub use engine::{ImageSearchEngine, ImageSearchEngineBuilder};
pub use error::{Error, Result};
pub use image::{ImageRecord, MimeType};
pub use searcher::{HitSummary, SearchOptions, SearchSummary, Searcher};
