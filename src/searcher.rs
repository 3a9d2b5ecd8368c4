use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::backend::{SearchHit, VectorBackend};
use crate::client::SearchClient;
use crate::error::{Error, Result, Stage, StageExt};
use crate::image::{self, ImageRecord, MimeType};

/// Parameters of a similarity search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    limit: usize,
    threshold: f32,
    offset: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 10, threshold: 0.7, offset: None }
    }
}

impl SearchOptions {
    /// # Arguments
    ///
    /// * `limit` - number of neighbors requested from the database, at least 1
    /// * `threshold` - minimum similarity of returned hits, within `[0, 1]`
    /// * `offset` - number of leading neighbors to skip
    pub fn new(limit: usize, threshold: f32, offset: Option<usize>) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidArgument("limit must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidArgument(format!("threshold {} is not within [0, 1]", threshold)));
        }
        Ok(Self { limit, threshold, offset })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

/// A search hit without its image data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitSummary {
    pub id: String,
    pub text: Option<String>,
    pub similarity: f32,
    /// Where the hit's image was written
    pub saved: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub total: usize,
    /// In the order the database returned them
    pub hits: Vec<HitSummary>,
}

/// Keep hits at or above `threshold`, preserving their order
///
/// Applied regardless of any filtering the database may have done.
pub fn filter_hits(hits: Vec<SearchHit>, threshold: f32) -> Vec<SearchHit> {
    hits.into_iter().filter(|hit| hit.similarity >= threshold).collect()
}

/// File name of the `rank`-th (1-based) saved hit
fn hit_filename(rank: usize, hit: &SearchHit) -> String {
    let ext = MimeType::sniff_encoded(&hit.encoded_image).map_or("jpg", |mime| mime.extension());
    format!("similar_{}_{:.2}.{}", rank, hit.similarity, ext)
}

/// Glue between local image files and the vector database
pub struct Searcher<B> {
    client: SearchClient<B>,
    output_dir: PathBuf,
}

impl<B: VectorBackend> Searcher<B> {
    pub fn new(client: SearchClient<B>, output_dir: impl Into<PathBuf>) -> Self {
        Self { client, output_dir: output_dir.into() }
    }

    pub fn client(&self) -> &SearchClient<B> {
        &self.client
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Load an image file and add it to the database
    pub async fn index_one(&self, path: impl AsRef<Path>) -> Result<String> {
        let image = ImageRecord::load(path).await.stage(Stage::Load)?;
        self.client.insert(&image).await.stage(Stage::Insert)
    }

    /// Add every loadable image directly under `dir`, one after another
    ///
    /// Images that fail to load or insert are logged and left out of the result.
    pub async fn index_all(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let images = image::load_directory(dir).await.stage(Stage::Load)?;
        let mut ids = Vec::with_capacity(images.len());
        for image in &images {
            match self.client.insert(image).await {
                Ok(id) => {
                    info!("indexed {} with id {}", image.filename(), id);
                    ids.push(id);
                }
                Err(e) => warn!("failed to index {}: {}", image.filename(), e.report()),
            }
        }
        Ok(ids)
    }

    /// Find images similar to the one at `query` and save them to the output directory
    pub async fn search(&self, query: impl AsRef<Path>, options: &SearchOptions) -> Result<SearchSummary> {
        let image = ImageRecord::load(query).await.stage(Stage::Load)?;
        let hits = self
            .client
            .query(&image, options.limit(), options.offset())
            .await
            .stage(Stage::Query)?;
        let hits = filter_hits(hits, options.threshold());

        image::ensure_directory(&self.output_dir).await.stage(Stage::Save)?;

        let mut summaries = Vec::with_capacity(hits.len());
        for (i, hit) in hits.into_iter().enumerate() {
            let saved = self.output_dir.join(hit_filename(i + 1, &hit));
            image::save(&hit.encoded_image, &saved).await.stage(Stage::Save)?;
            summaries.push(HitSummary {
                id: hit.id,
                text: hit.text,
                similarity: hit.similarity,
                saved,
            });
        }

        Ok(SearchSummary { total: summaries.len(), hits: summaries })
    }

    pub async fn remove_one(&self, id: &str) -> Result<bool> {
        self.client.delete(id).await.stage(Stage::Delete)
    }

    pub async fn count(&self) -> Result<u64> {
        self.client.count().await.stage(Stage::Count)
    }
}
