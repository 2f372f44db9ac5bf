use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use url::Url;

use crate::error::{Error, Result};
use crate::url::Source;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// One place metric documents can be fetched from.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Human-readable location, used in logs and load errors.
    fn describe(&self) -> String;

    /// Fetch the raw bytes of `rel_path` (e.g. `MANIFEST.json`).
    async fn fetch(&self, rel_path: &str) -> Result<Vec<u8>>;
}

/// Reject paths that could escape the source root.
fn check_relative(rel_path: &str) -> Result<()> {
    let path = Path::new(rel_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if rel_path.is_empty() || escapes {
        return Err(Error::Other(format!("refusing to fetch path {rel_path:?}")));
    }
    Ok(())
}

/// Reads documents from a local `calculations/` directory.
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Resolver for DirResolver {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn fetch(&self, rel_path: &str) -> Result<Vec<u8>> {
        check_relative(rel_path)?;
        let path = self.root.join(rel_path);
        log::trace!("Reading {}", path.display());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fetches documents over HTTP(S) below a base URL.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    base: Url,
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dorareport/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn fetch(&self, rel_path: &str) -> Result<Vec<u8>> {
        check_relative(rel_path)?;
        let url = self.base.join(rel_path)?;
        log::trace!("GET {url}");
        let resp = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Http(format!("{url}: {status}")));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Build the resolver for a configured source.
pub fn resolver_for(source: &Source, timeout: Duration) -> Result<Box<dyn Resolver>> {
    let resolver: Box<dyn Resolver> = match source {
        Source::Http(url) => Box::new(HttpResolver::new(url.clone(), timeout)?),
        Source::Dir(path) => Box::new(DirResolver::new(path.clone())),
    };
    Ok(resolver)
}
