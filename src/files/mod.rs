//! Static file responder.
//!
//! Resolves request paths under a configured root directory and serves
//! file contents with extension-based MIME types. Requests the proxy
//! router does not claim end up here.

use std::path::PathBuf;

use crate::config::StaticFilesConfig;
use crate::http::mime;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const INDEX_FILE: &str = "index.html";

/// Serves files from a single root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(config: &StaticFilesConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    /// Compute the file a request path refers to.
    ///
    /// Components are joined under the root in order; a directory resolves
    /// to its index file. `..` components are rejected so the result stays
    /// under the root.
    pub async fn resolve(&self, components: &[&str]) -> Option<PathBuf> {
        let mut file = self.root.clone();

        for component in components {
            if *component == ".." {
                return None;
            }
            file.push(component);
        }

        let is_dir = tokio::fs::metadata(&file)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            file.push(INDEX_FILE);
        }

        Some(file)
    }

    /// Serve the file for `components`, or a plain-text 404.
    pub async fn serve(&self, components: &[&str]) -> Response {
        let Some(file) = self.resolve(components).await else {
            tracing::warn!(components = ?components, "Rejected path outside root");
            return Response::plain(StatusCode::NotFound, "Not found\nFile");
        };

        match tokio::fs::read(&file).await {
            Ok(payload) => {
                tracing::debug!(file = %file.display(), bytes = payload.len(), "Serving file");
                ResponseBuilder::new(StatusCode::Ok)
                    .header("Content-Type", mime::detect_mime_type(&file))
                    .body(payload)
                    .build()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Response::plain(
                    StatusCode::NotFound,
                    format!("Not found\nFile: {}", file.display()),
                )
            }
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "Failed to read file");
                Response::plain(StatusCode::InternalServerError, "Failed to read file")
            }
        }
    }
}
