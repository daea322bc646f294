//! Static files from a public directory.
//!
//! Installed as the dispatcher's fallback handler, so it only ever sees
//! requests no route claimed. GET and HEAD only; everything else, and every
//! miss, is a plain 404.

use std::io;
use std::path::{Component, Path, PathBuf};

use http::Method;
use tracing::debug;

use crate::error::{Error, HttpError};
use crate::handler::Link;
use crate::inject::{Injected, ResourceKey};
use crate::response::{ContentType, Response};

pub const STATIC_FILES: ResourceKey<StaticFiles> = ResourceKey::new("static_files");

const NOT_FOUND_MESSAGE: &str = "The requested URL was not found on the server. \
     If you entered the URL manually please check your spelling and try again.";

/// A directory served read-only.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base_dir: base.into() }
    }

    /// Joins a URL path onto the base directory. `None` for anything that
    /// would leave it.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut path = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => path.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    /// File contents and content type. `NotFound` for directories, misses,
    /// and paths outside the base.
    pub async fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, ContentType)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "path escapes base directory"))?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok((bytes, ContentType::from_path(&path)))
    }
}

/// Fallback handler serving [`STATIC_FILES`].
pub fn serve_static() -> Link {
    Link::handler("serve_static", serve).request().resource(STATIC_FILES)
}

async fn serve(inj: Injected) -> Result<Response, Error> {
    let request = inj.request()?;
    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
        return Err(HttpError::not_found(NOT_FOUND_MESSAGE).into());
    }

    let files = inj.resource(STATIC_FILES)?;
    match files.load(request.path()).await {
        Ok((bytes, content_type)) => {
            let body = if method == Method::HEAD { Vec::new() } else { bytes };
            Ok(Response::builder().bytes(content_type, body))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = request.path(), "no static file");
            Err(HttpError::not_found(NOT_FOUND_MESSAGE).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js").join("script.js"), "console.log(1)").unwrap();
        dir
    }

    #[test]
    fn map_path_prevents_traversal() {
        let files = StaticFiles::new("/srv/public");
        assert!(files.map_path("/../Cargo.toml").is_none());
        assert!(files.map_path("/js/../../etc/passwd").is_none());
        assert_eq!(
            files.map_path("/js/./script.js"),
            Some(PathBuf::from("/srv/public/js/script.js"))
        );
    }

    #[tokio::test]
    async fn loads_files_with_content_type() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        let (bytes, ct) = files.load("/index.html").await.unwrap();
        assert_eq!(bytes, b"<h1>hi</h1>");
        assert_eq!(ct, ContentType::Html);
        let (_, ct) = files.load("/js/script.js").await.unwrap();
        assert_eq!(ct, ContentType::JavaScript);
    }

    #[tokio::test]
    async fn directories_and_misses_are_not_found() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        for path in ["/", "/js", "/missing.css", "/../secret"] {
            let err = files.load(path).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::NotFound, "{path}");
        }
    }
}
