pub mod config;
pub mod date_util;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod present;
pub mod query;
pub mod session;
pub mod url;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use loader::{HydrateReport, HydrateStatus, Loader};
pub use metrics::{
    aggregate, aggregate_with_date_filter, rank_repos_by_score, AggregatedView, Average, Manifest,
    RepoMetricSet, RepoScore,
};
pub use query::{filter_repo_by_date_range, DateWindow, FilteredCommits, Regime, Scope};
pub use session::{FilterState, Session};
pub use url::{candidate_bases, Source};

use serde::Serialize;

/// One repository's metrics plus its commits restricted to a window.
#[derive(Debug, Clone, Serialize)]
pub struct RepoDetail {
    pub name: String,
    pub metrics: RepoMetricSet,
    pub window: DateWindow,
    pub filtered: FilteredCommits,
    pub uncovered_epics: Vec<String>,
    /// The manifest entry could not be read; all metrics are missing.
    pub malformed: bool,
}

/// Organization AI usage with repositories ranked by score.
#[derive(Debug, Clone, Serialize)]
pub struct AiReport {
    pub global_ai_score: Option<f64>,
    pub score_interpretation: Option<String>,
    pub total_ai_commits: Option<u64>,
    pub total_commits_analyzed: Option<u64>,
    pub global_ai_percentage: Option<f64>,
    pub ranked: Vec<RepoScore>,
}

/// Main entry point: a loaded manifest and the session computing views
/// over it.
pub struct DoraReport {
    loader: Loader,
    session: Session,
    hydrate: HydrateReport,
}

impl DoraReport {
    /// Load the manifest and fetch any weekly trends it only references.
    pub async fn open(loader: Loader) -> Result<Self> {
        let manifest = loader.load_manifest().await?;
        let (manifest, hydrate) = loader.hydrate_velocity_trends(&manifest).await;
        Ok(Self {
            loader,
            session: Session::new(manifest),
            hydrate,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        self.session.manifest()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn hydrate_report(&self) -> &HydrateReport {
        &self.hydrate
    }

    /// Recompute the organization view for `state`.
    pub fn apply(&mut self, state: FilterState) -> &AggregatedView {
        self.session.apply(state)
    }

    /// Load a fresh manifest and replace the current one wholesale. The
    /// current filter is kept and recomputed against it.
    pub async fn reload(&mut self) -> Result<&AggregatedView> {
        let manifest = self.loader.load_manifest().await?;
        let (manifest, hydrate) = self.loader.hydrate_velocity_trends(&manifest).await;
        self.hydrate = hydrate;
        Ok(self.session.replace_manifest(manifest))
    }

    pub fn repo_detail(&self, name: &str, window: &DateWindow) -> Result<RepoDetail> {
        let manifest = self.manifest();
        let metrics = manifest
            .repo(name)
            .ok_or_else(|| Error::NotFound(format!("repository {name}")))?;
        Ok(RepoDetail {
            name: name.to_string(),
            metrics: metrics.clone(),
            window: *window,
            filtered: filter_repo_by_date_range(metrics, window),
            uncovered_epics: manifest.uncovered_epics(name),
            malformed: manifest.malformed_repos.contains(name),
        })
    }

    /// AI usage for `scope`. Uses the precomputed organization ranking when
    /// the manifest has one, otherwise ranks the per-repo analyses.
    pub fn ai_report(&self, scope: &Scope) -> AiReport {
        let manifest = self.manifest();
        let global = manifest.global_metrics.ai_usage().unwrap_or_default();
        let ranked = if global.repositories_ranked.is_empty() {
            metrics::repo_ai_scores(manifest, scope)
        } else {
            let in_scope = global
                .repositories_ranked
                .into_iter()
                .filter(|r| match scope {
                    Scope::All => true,
                    Scope::Projects(names) => names.contains(&r.repo),
                })
                .collect();
            rank_repos_by_score(in_scope)
        };
        AiReport {
            global_ai_score: global.global_ai_score,
            score_interpretation: global.score_interpretation,
            total_ai_commits: global.total_ai_commits,
            total_commits_analyzed: global.total_commits_analyzed,
            global_ai_percentage: global.global_ai_percentage,
            ranked,
        }
    }
}
