use std::future::Future;

use crate::error::Result;
use crate::image::ImageRecord;

mod weaviate;

pub use weaviate::WeaviateBackend;

/// An object returned by a nearest-neighbor query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Identifier assigned by the remote store
    pub id: String,
    /// Base64 image stored with the object
    pub encoded_image: String,
    pub text: Option<String>,
    /// Closeness in `[0, 1]`
    pub similarity: f32,
}

/// Operations the search pipeline needs from a vector database
///
/// Implementations do not filter query results by similarity and keep the order
/// the database ranked them in.
pub trait VectorBackend: Send + Sync {
    /// Check the database is reachable
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Create the image class unless it already exists
    fn ensure_schema(&self) -> impl Future<Output = Result<()>> + Send;

    /// Store an image, returning its identifier
    fn insert(&self, image: &ImageRecord) -> impl Future<Output = Result<String>> + Send;

    /// Find the `limit` nearest neighbors of `image`, skipping the first `offset`
    fn query(
        &self,
        image: &ImageRecord,
        limit: usize,
        offset: Option<usize>,
    ) -> impl Future<Output = Result<Vec<SearchHit>>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Number of stored images
    fn count(&self) -> impl Future<Output = Result<u64>> + Send;
}
