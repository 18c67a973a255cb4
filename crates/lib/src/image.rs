//! Image retrieval.
//!
//! An assembly's image reference is resolved by an [`ImageProvider`] and
//! unpacked into a scratch directory. The bundled [`ArchiveImageProvider`]
//! maps references to gzip-compressed tarballs under a local directory or an
//! HTTP base URL:
//!
//! ```text
//! registry/app:v1              -> {source}/registry/app_v1.tar.gz
//! registry/app@sha256:abc123   -> {source}/registry/app_sha256_abc123.tar.gz
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ImageError {
  #[error("invalid image reference: {0}")]
  InvalidReference(String),

  #[error("image not found: {0}")]
  NotFound(String),

  #[error("fetch failed for {reference}: {message}")]
  FetchFailed { reference: String, message: String },

  #[error("failed to unpack {reference}: {source}")]
  Unpack {
    reference: String,
    #[source]
    source: io::Error,
  },
}

/// Resolves, downloads, decompresses and unpacks an image into `dest`.
#[async_trait]
pub trait ImageProvider: Send + Sync {
  async fn fetch(&self, reference: &str, dest: &Path) -> Result<(), ImageError>;
}

#[derive(Debug, Clone)]
enum ArchiveSource {
  Directory(PathBuf),
  Http { base_url: String, client: reqwest::Client },
}

/// Serves images from `.tar.gz` archives.
#[derive(Debug, Clone)]
pub struct ArchiveImageProvider {
  source: ArchiveSource,
}

impl ArchiveImageProvider {
  /// `source` is either an `http(s)://` base URL or a local directory.
  pub fn new(source: &str) -> Self {
    let source = if source.starts_with("http://") || source.starts_with("https://") {
      ArchiveSource::Http {
        base_url: source.trim_end_matches('/').to_string(),
        client: reqwest::Client::new(),
      }
    } else {
      ArchiveSource::Directory(PathBuf::from(source))
    };
    Self { source }
  }

  async fn read_archive(&self, reference: &str, relative: &str) -> Result<Vec<u8>, ImageError> {
    match &self.source {
      ArchiveSource::Directory(root) => {
        let path = root.join(relative);
        debug!(path = %path.display(), "reading image archive");
        tokio::fs::read(&path).await.map_err(|e| {
          if e.kind() == io::ErrorKind::NotFound {
            ImageError::NotFound(reference.to_string())
          } else {
            ImageError::FetchFailed {
              reference: reference.to_string(),
              message: e.to_string(),
            }
          }
        })
      }
      ArchiveSource::Http { base_url, client } => {
        let url = format!("{}/{}", base_url, relative);
        debug!(url = %url, "downloading image archive");

        let response = client.get(&url).send().await.map_err(|e| ImageError::FetchFailed {
          reference: reference.to_string(),
          message: e.to_string(),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
          return Err(ImageError::NotFound(reference.to_string()));
        }
        if !response.status().is_success() {
          return Err(ImageError::FetchFailed {
            reference: reference.to_string(),
            message: format!("HTTP {}", response.status()),
          });
        }

        let bytes = response.bytes().await.map_err(|e| ImageError::FetchFailed {
          reference: reference.to_string(),
          message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
      }
    }
  }
}

#[async_trait]
impl ImageProvider for ArchiveImageProvider {
  async fn fetch(&self, reference: &str, dest: &Path) -> Result<(), ImageError> {
    info!(image = %reference, "fetching image");

    let relative = archive_path(reference)?;
    let bytes = self.read_archive(reference, &relative).await?;

    let dest = dest.to_path_buf();
    let unpacked = tokio::task::spawn_blocking(move || unpack_tar_gz(&bytes, &dest))
      .await
      .map_err(io::Error::other)
      .and_then(|result| result);

    unpacked.map_err(|source| ImageError::Unpack {
      reference: reference.to_string(),
      source,
    })?;

    info!(image = %reference, "image unpacked");
    Ok(())
  }
}

/// Map an image reference to its archive path relative to the source.
///
/// Path separators in the repository part are kept; tag and digest separators
/// become underscores. Traversal components are rejected.
pub(crate) fn archive_path(reference: &str) -> Result<String, ImageError> {
  let invalid = || ImageError::InvalidReference(reference.to_string());

  if reference.is_empty() || reference.starts_with('/') {
    return Err(invalid());
  }

  let mut segments = Vec::new();
  for segment in reference.split('/') {
    if segment.is_empty() || segment == "." || segment == ".." {
      return Err(invalid());
    }
    let sanitized: String = segment
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();
    segments.push(sanitized);
  }

  Ok(format!("{}.tar.gz", segments.join("/")))
}

/// Unpack a gzip-compressed tarball into `dest`, keeping file modes so the
/// install entrypoint stays executable.
fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> io::Result<()> {
  std::fs::create_dir_all(dest)?;
  let mut archive = Archive::new(GzDecoder::new(bytes));
  archive.set_preserve_permissions(true);
  archive.unpack(dest)
}
