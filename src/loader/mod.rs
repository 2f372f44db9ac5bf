pub mod resolver;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::{Manifest, VelocityTrend};
use crate::url::{Source, CALCULATIONS_DIR};

pub use resolver::{resolver_for, DirResolver, HttpResolver, Resolver, DEFAULT_TIMEOUT_SECS};

pub const MANIFEST_FILE: &str = "MANIFEST.json";

/// Report returned after weekly trend documents have been fetched.
#[derive(Debug, Clone, Serialize)]
pub struct HydrateReport {
    pub status: HydrateStatus,
    pub loaded: u64,
    pub failed: u64,
    /// Repos left on period-based filtering.
    pub failed_repos: Vec<String>,
    pub error: Option<String>,
}

impl HydrateReport {
    /// Create a HydrateReport with the status derived from counts.
    pub fn from_counts(loaded: u64, failed_repos: Vec<String>) -> Self {
        let failed = failed_repos.len() as u64;
        let status = if failed == 0 {
            HydrateStatus::Success
        } else if loaded > 0 {
            HydrateStatus::PartialFailure
        } else {
            HydrateStatus::Failed
        };
        let error = if failed > 0 {
            Some(format!("{failed} velocity trend(s) unavailable"))
        } else {
            None
        };
        Self {
            status,
            loaded,
            failed,
            failed_repos,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HydrateStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Fetches metric documents, trying each configured source in order.
pub struct Loader {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl Loader {
    /// Sources with the same location are only tried once.
    pub fn new(resolvers: Vec<Box<dyn Resolver>>) -> Self {
        let mut seen = Vec::new();
        let resolvers = resolvers
            .into_iter()
            .filter(|r| {
                let key = r.describe();
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            })
            .collect();
        Self { resolvers }
    }

    pub fn from_sources(sources: &[Source], timeout: Duration) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::Config("no metric sources configured".into()));
        }
        let resolvers = sources
            .iter()
            .map(|s| resolver_for(s, timeout))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(resolvers))
    }

    /// Locations tried, in order.
    pub fn candidates(&self) -> Vec<String> {
        self.resolvers.iter().map(|r| r.describe()).collect()
    }

    /// Fetch `rel_path` from the first source that has it and parses.
    async fn fetch_with<T, F>(&self, rel_path: &str, parse: F) -> Result<T>
    where
        F: Fn(&[u8]) -> Result<T>,
    {
        let mut tried = Vec::with_capacity(self.resolvers.len());
        for resolver in &self.resolvers {
            let location = resolver.describe();
            match resolver.fetch(rel_path).await.and_then(|b| parse(&b)) {
                Ok(value) => {
                    log::debug!("Loaded {rel_path} from {location}");
                    return Ok(value);
                }
                Err(e) => {
                    log::warn!("Could not load {rel_path} from {location}: {e}");
                    tried.push(location);
                }
            }
        }
        Err(Error::Load {
            path: rel_path.to_string(),
            tried,
        })
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, rel_path: &str) -> Result<T> {
        self.fetch_with(rel_path, |b| Ok(serde_json::from_slice(b)?))
            .await
    }

    /// Load and validate `MANIFEST.json`.
    pub async fn load_manifest(&self) -> Result<Manifest> {
        let manifest = self.fetch_with(MANIFEST_FILE, Manifest::from_slice).await?;
        log::info!(
            "Loaded manifest {} ({} repos, status {})",
            manifest.manifest_id.as_deref().unwrap_or("(unnamed)"),
            manifest.per_repo_metrics.len(),
            manifest.validation_status.as_deref().unwrap_or("unknown")
        );
        for name in &manifest.malformed_repos {
            log::warn!("Repo {name} has a malformed metrics entry; treating as empty");
        }
        Ok(manifest)
    }

    /// Fetch the full velocity trend for `repo`.
    ///
    /// Uses the `file` pointer from the manifest when present, otherwise the
    /// conventional `per_repo/<repo>/velocity_trend.json`.
    pub async fn fetch_velocity_trend(&self, repo: &str, stub: &VelocityTrend) -> Result<VelocityTrend> {
        let rel_path = trend_path(repo, stub)?;
        self.fetch_json(&rel_path).await
    }

    /// Fetch weekly buckets for every repo whose trend is referenced but not
    /// embedded, and return a new manifest with them installed.
    ///
    /// A repo whose trend cannot be fetched keeps period-based filtering;
    /// that is reported, not raised.
    pub async fn hydrate_velocity_trends(&self, manifest: &Manifest) -> (Manifest, HydrateReport) {
        let pending = manifest.repos_missing_weekly_data();
        if pending.is_empty() {
            return (manifest.clone(), HydrateReport::from_counts(0, Vec::new()));
        }

        let mut trends = BTreeMap::new();
        let mut failed = Vec::new();
        for (repo, stub) in pending {
            match self.fetch_velocity_trend(repo, stub).await {
                Ok(trend) if trend.weeks().is_some() => {
                    trends.insert(repo.to_string(), trend);
                }
                Ok(_) => {
                    log::warn!("Velocity trend for {repo} has no weekly data");
                    failed.push(repo.to_string());
                }
                Err(e) => {
                    log::warn!("Velocity trend for {repo} unavailable: {e}");
                    failed.push(repo.to_string());
                }
            }
        }

        let report = HydrateReport::from_counts(trends.len() as u64, failed);
        log::info!(
            "Hydrated {} velocity trend(s), {} unavailable",
            report.loaded,
            report.failed
        );
        (manifest.with_velocity_trends(trends), report)
    }
}

/// Resolve where a repo's velocity trend lives, relative to `calculations/`.
fn trend_path(repo: &str, stub: &VelocityTrend) -> Result<String> {
    if let Some(file) = stub.file.as_deref().filter(|f| !f.is_empty()) {
        let rel = file.trim_start_matches("./");
        return Ok(rel.strip_prefix(CALCULATIONS_DIR).unwrap_or(rel).to_string());
    }
    if repo.is_empty() || repo.contains(['/', '\\']) || repo == "." || repo == ".." {
        return Err(Error::Other(format!("unsafe repo name {repo:?}")));
    }
    Ok(format!("per_repo/{repo}/velocity_trend.json"))
}
