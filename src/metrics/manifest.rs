use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::{lenient, lenient_vec, GlobalMetricSet, RepoMetricSet, VelocityTrend};
use crate::error::{Error, Result};

/// Counts reported by the validation pass that produced the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub total_metrics: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub validation_errors: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub validation_warnings: Option<u64>,
}

/// Epics found in each repo and the ones referenced by tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanArtifacts {
    #[serde(default, deserialize_with = "lenient_vec_map")]
    pub epics: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "lenient_vec_map")]
    pub epic_coverage: BTreeMap<String, Vec<String>>,
}

fn lenient_vec_map<'de, D>(d: D) -> std::result::Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient(d)?.unwrap_or_default())
}

/// On-the-wire shape. Per-repo entries stay raw so one bad entry is isolated.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default, deserialize_with = "lenient")]
    manifest_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    generated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    validation_status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    summary: Option<ValidationSummary>,
    #[serde(default, deserialize_with = "lenient")]
    global_metrics: Option<GlobalMetricSet>,
    #[serde(default)]
    per_repo_metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "lenient")]
    github_scan_artifacts: Option<ScanArtifacts>,
    #[serde(default, deserialize_with = "lenient_vec")]
    errors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    warnings: Vec<String>,
}

/// The consolidated snapshot of every computed metric.
///
/// Immutable once loaded. A refresh builds a new `Manifest` and replaces the
/// old one; nothing patches it in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawManifest")]
pub struct Manifest {
    pub manifest_id: Option<String>,
    pub generated_at: Option<String>,
    pub validation_status: Option<String>,
    pub summary: Option<ValidationSummary>,
    pub global_metrics: GlobalMetricSet,
    pub per_repo_metrics: BTreeMap<String, RepoMetricSet>,
    pub github_scan_artifacts: Option<ScanArtifacts>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Repos whose entry was not a JSON object. They stay in the manifest
    /// with no metrics so scope selection still sees them.
    #[serde(skip)]
    pub malformed_repos: BTreeSet<String>,
}

impl From<RawManifest> for Manifest {
    fn from(raw: RawManifest) -> Self {
        let mut per_repo_metrics = BTreeMap::new();
        let mut malformed_repos = BTreeSet::new();
        for (name, value) in raw.per_repo_metrics {
            let metrics = match serde_json::from_value::<RepoMetricSet>(value) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Repo entry {name} is malformed: {e}");
                    malformed_repos.insert(name.clone());
                    RepoMetricSet::default()
                }
            };
            per_repo_metrics.insert(name, metrics);
        }

        Self {
            manifest_id: raw.manifest_id,
            generated_at: raw.generated_at,
            validation_status: raw.validation_status,
            summary: raw.summary,
            global_metrics: raw.global_metrics.unwrap_or_default(),
            per_repo_metrics,
            github_scan_artifacts: raw.github_scan_artifacts,
            errors: raw.errors,
            warnings: raw.warnings,
            malformed_repos,
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Manifest("document is not a JSON object".into()))?;
        if let Some(repos) = obj.get("per_repo_metrics") {
            if !repos.is_object() {
                return Err(Error::Manifest("per_repo_metrics is not an object".into()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn repo(&self, name: &str) -> Option<&RepoMetricSet> {
        self.per_repo_metrics.get(name)
    }

    /// Repo names in sorted order.
    pub fn repo_names(&self) -> impl Iterator<Item = &str> {
        self.per_repo_metrics.keys().map(String::as_str)
    }

    pub fn is_validated(&self) -> bool {
        self.validation_status.as_deref() == Some("PASS")
    }

    /// Earliest `period_start` and latest `period_end` across repos, used to
    /// pre-fill a date filter.
    pub fn default_date_range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let mut min: Option<NaiveDate> = None;
        let mut max: Option<NaiveDate> = None;
        for repo in self.per_repo_metrics.values() {
            let (start, end) = repo.period();
            if let Some(s) = start {
                min = Some(min.map_or(s, |m| m.min(s)));
            }
            if let Some(e) = end {
                max = Some(max.map_or(e, |m| m.max(e)));
            }
        }
        (min, max)
    }

    /// Epics found in `repo` that no test references.
    pub fn uncovered_epics(&self, repo: &str) -> Vec<String> {
        let Some(scan) = &self.github_scan_artifacts else {
            return Vec::new();
        };
        let Some(all) = scan.epics.get(repo) else {
            return Vec::new();
        };
        let covered: BTreeSet<&str> = scan
            .epic_coverage
            .get(repo)
            .map(|c| c.iter().map(String::as_str).collect())
            .unwrap_or_default();
        all.iter()
            .filter(|e| !covered.contains(e.as_str()))
            .cloned()
            .collect()
    }

    /// Repos whose velocity trend is referenced but carries no weekly buckets.
    pub fn repos_missing_weekly_data(&self) -> Vec<(&str, &VelocityTrend)> {
        self.per_repo_metrics
            .iter()
            .filter_map(|(name, m)| {
                let trend = m.velocity_trend.as_ref()?;
                trend.weekly_data.is_none().then_some((name.as_str(), trend))
            })
            .collect()
    }

    /// A copy of this manifest with the given velocity trends installed.
    pub fn with_velocity_trends(&self, trends: BTreeMap<String, VelocityTrend>) -> Manifest {
        let mut next = self.clone();
        for (name, trend) in trends {
            if let Some(repo) = next.per_repo_metrics.get_mut(&name) {
                repo.velocity_trend = Some(trend);
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Manifest {
        Manifest::from_slice(
            json!({
                "manifest_id": "dora.manifest",
                "generated_at": "2026-02-01T10:00:00Z",
                "validation_status": "PASS",
                "summary": {"total_metrics": 12, "validation_errors": 0, "validation_warnings": 1},
                "global_metrics": {
                    "commits.json": {"total_commits": 30}
                },
                "per_repo_metrics": {
                    "RnDMetrics": {
                        "commits": {"total_commits": 10, "avg_commits_per_day": 2.0,
                                    "period_start": "2025-12-01", "period_end": "2026-01-10"},
                        "velocity_trend": {"file": "calculations/per_repo/RnDMetrics/velocity_trend.json"}
                    },
                    "TrailEquip": {
                        "commits": {"total_commits": 20, "avg_commits_per_day": null,
                                    "period_start": "2025-10-15", "period_end": "2025-12-20"}
                    },
                    "Broken": "not an object"
                },
                "github_scan_artifacts": {
                    "epics": {"TrailEquip": ["EPIC-1", "EPIC-2", "EPIC-3"]},
                    "epic_coverage": {"TrailEquip": ["EPIC-2"]}
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let m = sample();
        assert!(m.is_validated());
        assert_eq!(m.manifest_id.as_deref(), Some("dora.manifest"));
        assert_eq!(m.summary.as_ref().unwrap().validation_warnings, Some(1));
        assert_eq!(
            m.repo_names().collect::<Vec<_>>(),
            vec!["Broken", "RnDMetrics", "TrailEquip"]
        );
        assert_eq!(m.repo("RnDMetrics").unwrap().total_commits(), Some(10));
        assert_eq!(m.global_metrics.commits().unwrap().total_commits, Some(30));
    }

    #[test]
    fn test_malformed_repo_is_kept_empty() {
        let m = sample();
        assert!(m.malformed_repos.contains("Broken"));
        assert_eq!(m.repo("Broken"), Some(&RepoMetricSet::default()));
    }

    #[test]
    fn test_rejects_non_object_documents() {
        assert!(Manifest::from_slice(b"[1, 2, 3]").is_err());
        assert!(Manifest::from_slice(b"{\"per_repo_metrics\": []}").is_err());
        assert!(Manifest::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_missing_sections_default() {
        let m = Manifest::from_slice(b"{}").unwrap();
        assert!(m.per_repo_metrics.is_empty());
        assert!(!m.is_validated());
        assert_eq!(m.default_date_range(), (None, None));
    }

    #[test]
    fn test_default_date_range() {
        let m = sample();
        assert_eq!(
            m.default_date_range(),
            (
                NaiveDate::from_ymd_opt(2025, 10, 15),
                NaiveDate::from_ymd_opt(2026, 1, 10)
            )
        );
    }

    #[test]
    fn test_uncovered_epics() {
        let m = sample();
        assert_eq!(m.uncovered_epics("TrailEquip"), vec!["EPIC-1", "EPIC-3"]);
        assert!(m.uncovered_epics("RnDMetrics").is_empty());
        assert!(m.uncovered_epics("Ghost").is_empty());
    }

    #[test]
    fn test_with_velocity_trends_replaces_copy() {
        let m = sample();
        let missing = m.repos_missing_weekly_data();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, "RnDMetrics");

        let mut trends = BTreeMap::new();
        trends.insert(
            "RnDMetrics".to_string(),
            VelocityTrend {
                weekly_data: Some(BTreeMap::from([("2026-W01".to_string(), Some(5))])),
                ..Default::default()
            },
        );
        let next = m.with_velocity_trends(trends);

        assert!(next.repo("RnDMetrics").unwrap().weekly_data().is_some());
        assert!(m.repo("RnDMetrics").unwrap().weekly_data().is_none());
        assert!(next.repos_missing_weekly_data().is_empty());
    }
}
