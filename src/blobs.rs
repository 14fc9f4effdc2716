use std::path::{Path, PathBuf};

use tower_http::services::ServeDir;

use crate::{AppError, AppResult};

/// Files under a local directory, published read-only at `/blobs`.
#[derive(Debug, Clone)]
pub struct Blobs {
    root: PathBuf,
    public_url: String,
}

impl Blobs {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Blobs {
        Blobs {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/blobs/{path}", self.public_url)
    }

    /// Stores `bytes` at `path` (relative, `/`-separated) and returns its URL.
    pub async fn upload(&self, path: &str, bytes: &[u8]) -> AppResult<String> {
        let full = self.root.join(checked(path)?);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        tracing::info!(path, size = bytes.len(), "blob stored");
        Ok(self.url(path))
    }

    pub fn service(&self) -> ServeDir {
        ServeDir::new(&self.root)
    }
}

fn checked(path: &str) -> AppResult<&Path> {
    let ok = !path.is_empty()
        && !path.contains('\\')
        && path.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if !ok {
        return Err(AppError::bad_request(format!("bad blob path {path:?}")));
    }
    Ok(Path::new(path))
}

/// Reduces an uploaded file name to characters that are safe in a path and a URL.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_owned()
    } else {
        cleaned.to_owned()
    }
}
