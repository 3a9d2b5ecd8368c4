use std::path::{Path, PathBuf};

use log::{error, info};

use crate::backend::{VectorBackend, WeaviateBackend};
use crate::client::{RemoteState, SearchClient};
use crate::config::BackendConfig;
use crate::error::Result;
use crate::searcher::{SearchOptions, SearchSummary, Searcher};

/// Where search results are written unless configured otherwise
pub const DEFAULT_OUTPUT_DIR: &str = "similar_images";

pub struct ImageSearchEngineBuilder {
    config: BackendConfig,
    output_dir: PathBuf,
}

impl ImageSearchEngineBuilder {
    pub fn new(config: BackendConfig) -> Self {
        Self { config, output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR) }
    }

    /// Directory similar images are saved to
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Build the engine; no connection is made until first use
    pub fn open(self) -> Result<ImageSearchEngine> {
        let backend = WeaviateBackend::new(&self.config)?;
        Ok(ImageSearchEngine::with_backend(backend, self.output_dir))
    }
}

/// Index images and search for similar ones
pub struct ImageSearchEngine<B = WeaviateBackend> {
    searcher: Searcher<B>,
}

impl<B: VectorBackend> ImageSearchEngine<B> {
    pub fn with_backend(backend: B, output_dir: impl Into<PathBuf>) -> Self {
        Self { searcher: Searcher::new(SearchClient::new(backend), output_dir) }
    }

    pub fn state(&self) -> RemoteState {
        self.searcher.client().state()
    }

    pub fn output_dir(&self) -> &Path {
        self.searcher.output_dir()
    }

    /// Connect and create the image class if needed
    pub async fn initialize(&self) -> Result<()> {
        match self.searcher.client().initialize().await {
            Ok(()) => {
                info!("image search engine initialized");
                Ok(())
            }
            Err(e) => {
                error!("failed to initialize image search engine: {}", e.report());
                Err(e)
            }
        }
    }

    /// Index a single image, returning its id
    pub async fn index_image(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        match self.searcher.index_one(path).await {
            Ok(id) => {
                info!("indexed image {} with id {}", path.display(), id);
                Ok(id)
            }
            Err(e) => {
                error!("failed to index image {}: {}", path.display(), e.report());
                Err(e)
            }
        }
    }

    /// Index all images in a directory, returning the ids of those that succeeded
    pub async fn index_directory(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = path.as_ref();
        match self.searcher.index_all(path).await {
            Ok(ids) => {
                info!("indexed {} images from {}", ids.len(), path.display());
                Ok(ids)
            }
            Err(e) => {
                error!("failed to process directory {}: {}", path.display(), e.report());
                Err(e)
            }
        }
    }

    /// Find images similar to `query`, saving each hit under the output directory
    pub async fn find_similar_images(
        &self,
        query: impl AsRef<Path>,
        options: &SearchOptions,
    ) -> Result<SearchSummary> {
        let query = query.as_ref();
        match self.searcher.search(query, options).await {
            Ok(summary) => {
                info!("found {} images similar to {}", summary.total, query.display());
                Ok(summary)
            }
            Err(e) => {
                error!("failed to find similar images for {}: {}", query.display(), e.report());
                Err(e)
            }
        }
    }

    pub async fn delete_image(&self, id: &str) -> Result<bool> {
        match self.searcher.remove_one(id).await {
            Ok(deleted) => {
                if deleted {
                    info!("deleted image with id {}", id);
                }
                Ok(deleted)
            }
            Err(e) => {
                error!("failed to delete image {}: {}", id, e.report());
                Err(e)
            }
        }
    }

    /// Total number of indexed images
    pub async fn image_count(&self) -> Result<u64> {
        self.searcher.count().await.inspect_err(|e| error!("failed to get image count: {}", e.report()))
    }
}
