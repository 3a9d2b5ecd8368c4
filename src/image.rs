use std::fmt;
use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Maximum accepted image size: 10M
pub const MAX_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl MimeType {
    /// Bytes needed to tell every signature apart
    const PREFIX_LEN: u64 = 4;

    /// Magic numbers, in detection priority order
    const SIGNATURES: [(MimeType, &'static [u8]); 4] = [
        (MimeType::Jpeg, &[0xFF, 0xD8, 0xFF]),
        (MimeType::Png, &[0x89, 0x50, 0x4E, 0x47]),
        (MimeType::Gif, &[0x47, 0x49, 0x46]),
        (MimeType::Webp, &[0x52, 0x49, 0x46, 0x46]),
    ];

    /// Detect the image type from the leading bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        Self::SIGNATURES
            .iter()
            .find(|(_, magic)| bytes.starts_with(magic))
            .map(|(mime, _)| *mime)
    }

    /// Detect the image type of a base64 payload, decoding only its prefix
    pub fn sniff_encoded(encoded: &str) -> Option<Self> {
        // 12 chars decode to 9 bytes, enough for every signature
        let n = encoded.len().min(12) / 4 * 4;
        let prefix = STANDARD.decode(encoded.get(..n)?).ok()?;
        Self::detect(&prefix)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated image held in memory, with its base64 form
#[derive(Clone, PartialEq, Eq)]
pub struct ImageRecord {
    bytes: Vec<u8>,
    encoded: String,
    filename: String,
    mime_type: MimeType,
}

impl ImageRecord {
    /// Build a record from raw bytes
    ///
    /// The type is checked before the size, so an oversized file without a known
    /// signature reports `UnsupportedType`.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        let Some(mime_type) = MimeType::detect(&bytes) else {
            return Err(Error::UnsupportedType { filename });
        };
        if bytes.len() > MAX_SIZE {
            return Err(Error::TooLarge { size: bytes.len(), max: MAX_SIZE });
        }
        let encoded = STANDARD.encode(&bytes);
        Ok(Self { bytes, encoded, filename, mime_type })
    }

    /// Read and validate an image file
    ///
    /// Only the signature is read before the size check, so oversized files are
    /// rejected without being buffered.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = File::open(path).await.map_err(|e| Error::io(path, e))?;
        let len = file.metadata().await.map_err(|e| Error::io(path, e))?.len();

        let mut bytes = Vec::with_capacity(len.min(MAX_SIZE as u64) as usize);
        (&mut file)
            .take(MimeType::PREFIX_LEN)
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| Error::io(path, e))?;
        if MimeType::detect(&bytes).is_none() {
            return Err(Error::UnsupportedType { filename });
        }
        if len > MAX_SIZE as u64 {
            let size = usize::try_from(len).unwrap_or(usize::MAX);
            return Err(Error::TooLarge { size, max: MAX_SIZE });
        }

        // one byte past the limit still fails if the file grew meanwhile
        let rest = (MAX_SIZE as u64 + 1).saturating_sub(bytes.len() as u64);
        file.take(rest).read_to_end(&mut bytes).await.map_err(|e| Error::io(path, e))?;
        Self::from_bytes(filename, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRecord")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes())
            .finish_non_exhaustive()
    }
}

/// Decode a base64 image and write it to `output`
pub async fn save(encoded: &str, output: impl AsRef<Path>) -> Result<()> {
    let output = output.as_ref();
    let bytes = STANDARD.decode(encoded)?;
    tokio::fs::write(output, bytes).await.map_err(|e| Error::io(output, e))
}

/// Load every image file directly under `path`
///
/// Entries are visited one at a time in file name order. Files that fail to load
/// are logged and left out; only a failure to read `path` itself is an error.
pub async fn load_directory(path: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path).await.map_err(|e| Error::io(path, e))?;
    if !meta.is_dir() {
        return Err(Error::io(path, io::Error::from(io::ErrorKind::NotADirectory)));
    }

    let mut images = vec![];
    let entries = WalkDir::new(path).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("failed to read entry in {}: {}", path.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            debug!("skipping non-file {}", entry.path().display());
            continue;
        }
        match ImageRecord::load(entry.path()).await {
            Ok(image) => images.push(image),
            Err(e) => warn!("failed to process {}: {}", entry.path().display(), e.report()),
        }
    }

    Ok(images)
}

/// Create `path` and its parents if missing
pub async fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await.map_err(|e| Error::io(path, e))
}
