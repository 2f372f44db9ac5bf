use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize an optional field, treating a wrong-typed value as missing.
///
/// Upstream documents are trusted to be either a real number or `null`, but a
/// single bad field must not make the whole manifest unreadable.
pub(crate) fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(d)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Same as [`lenient`] for list fields: anything unreadable becomes empty.
pub(crate) fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient(d)?.unwrap_or_default())
}

/// Weekly commit counts keyed by label. Each entry is read on its own: a
/// count that is not a non-negative integer becomes `None` so callers can
/// drop and count it. A value that is not an object becomes missing.
pub(crate) fn lenient_counts<'de, D>(d: D) -> Result<Option<BTreeMap<String, Option<u64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(d)?;
    Ok(value.as_object().map(|entries| {
        entries
            .iter()
            .map(|(label, count)| (label.clone(), count.as_u64()))
            .collect()
    }))
}

/// Where a metric came from: the calculation file and its raw inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Why a value is null, when it is.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub calculation_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec", skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, deserialize_with = "lenient")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub end: Option<String>,
}

/// Commit activity for one repository over its active period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitsMetric {
    #[serde(default, deserialize_with = "lenient")]
    pub total_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub avg_commits_per_day: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub period_start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub period_end: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub days_active: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub unique_dates: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorsMetric {
    #[serde(default, deserialize_with = "lenient")]
    pub unique_contributors: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Test coverage percentage, `0..=100`. Null when no local test run happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetric {
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<f64>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A single measured value with a unit, e.g. deployment frequency in
/// `commits/day` or lead time in `hours`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateMetric {
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestsMetric {
    #[serde(default, deserialize_with = "lenient")]
    pub test_files: Option<u64>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub test_frameworks: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub epics: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_stories: Option<u64>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Commits bucketed by ISO week label (`YYYY-Www`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityTrend {
    #[serde(default, deserialize_with = "lenient_counts")]
    pub weekly_data: Option<BTreeMap<String, Option<u64>>>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub weeks_active: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub avg_commits_per_week: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Location of the full document when the manifest only carries a pointer.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl VelocityTrend {
    /// Weekly buckets, if present and non-empty.
    pub fn weeks(&self) -> Option<&BTreeMap<String, Option<u64>>> {
        self.weekly_data.as_ref().filter(|w| !w.is_empty())
    }
}

/// Per-repository AI usage heuristics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoAiAnalysis {
    #[serde(default, deserialize_with = "lenient")]
    pub ai_probability_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ai_score_interpretation: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ai_attributed_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ai_commits_percentage: Option<f64>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Every independently computed metric for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoMetricSet {
    #[serde(default, deserialize_with = "lenient")]
    pub commits: Option<CommitsMetric>,
    #[serde(default, deserialize_with = "lenient")]
    pub contributors: Option<ContributorsMetric>,
    #[serde(default, deserialize_with = "lenient")]
    pub coverage: Option<CoverageMetric>,
    #[serde(default, deserialize_with = "lenient")]
    pub dora_frequency: Option<RateMetric>,
    #[serde(default, deserialize_with = "lenient")]
    pub lead_time: Option<RateMetric>,
    #[serde(default, deserialize_with = "lenient")]
    pub tests: Option<TestsMetric>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub velocity_trend: Option<VelocityTrend>,
    #[serde(
        default,
        alias = "ai_usage_indicators",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub ai_analysis: Option<RepoAiAnalysis>,
}

impl RepoMetricSet {
    pub fn total_commits(&self) -> Option<u64> {
        self.commits.as_ref().and_then(|c| c.total_commits)
    }

    pub fn avg_commits_per_day(&self) -> Option<f64> {
        self.commits.as_ref().and_then(|c| c.avg_commits_per_day)
    }

    pub fn period(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match &self.commits {
            Some(c) => (c.period_start, c.period_end),
            None => (None, None),
        }
    }

    pub fn unique_contributors(&self) -> Option<u64> {
        self.contributors.as_ref().and_then(|c| c.unique_contributors)
    }

    pub fn weekly_data(&self) -> Option<&BTreeMap<String, Option<u64>>> {
        self.velocity_trend.as_ref().and_then(VelocityTrend::weeks)
    }
}

// ── Global (organization-wide, precomputed upstream) ──────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalCommits {
    #[serde(default, deserialize_with = "lenient")]
    pub total_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub repos_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub time_range: Option<TimeRange>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub repos_analyzed: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub repos_total_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub repos_with_issues: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub unique_contributors: Option<u64>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalTests {
    #[serde(default, deserialize_with = "lenient")]
    pub total_test_files: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_epics_found: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_user_stories_found: Option<u64>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// One repository's position in the AI usage ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoScore {
    pub repo: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub ai_commits: u64,
    #[serde(default)]
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiUsageAnalysis {
    #[serde(default, deserialize_with = "lenient")]
    pub global_ai_score: Option<f64>,
    #[serde(default, alias = "ai_score_interpretation", deserialize_with = "lenient")]
    pub score_interpretation: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_ai_commits: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_commits_analyzed: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub global_ai_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub repositories_ranked: Vec<RepoScore>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Organization-wide documents keyed by file name (`commits.json`,
/// `summary.json`, ...). Kept raw; typed views are parsed on access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalMetricSet(pub BTreeMap<String, serde_json::Value>);

impl GlobalMetricSet {
    fn typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("Ignoring malformed global metric {key}: {e}");
                None
            }
        }
    }

    pub fn commits(&self) -> Option<GlobalCommits> {
        self.typed("commits.json")
    }

    pub fn summary(&self) -> Option<GlobalSummary> {
        self.typed("summary.json")
    }

    pub fn velocity(&self) -> Option<RateMetric> {
        self.typed("velocity.json")
    }

    pub fn contributors(&self) -> Option<ContributorsMetric> {
        self.typed("contributors.json")
    }

    pub fn tests(&self) -> Option<GlobalTests> {
        self.typed("tests.json")
    }

    pub fn ai_usage(&self) -> Option<AiUsageAnalysis> {
        self.typed("ai_usage_analysis.json")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_commits_metric_from_upstream_document() {
        let c: CommitsMetric = serde_json::from_value(json!({
            "metric_id": "repo.commits",
            "repo": "TrailEquip",
            "total_commits": 42,
            "unique_dates": 10,
            "avg_commits_per_day": 4.2,
            "period_start": "2025-11-01",
            "period_end": "2026-01-15",
            "days_active": 76,
            "inputs": ["git_artifacts/TrailEquip/commits.json"],
            "calculation_path": "calculations/per_repo/TrailEquip/commits.json"
        }))
        .unwrap();

        assert_eq!(c.total_commits, Some(42));
        assert_eq!(c.avg_commits_per_day, Some(4.2));
        assert_eq!(c.period_start, NaiveDate::from_ymd_opt(2025, 11, 1));
        assert_eq!(c.days_active, Some(76));
        assert_eq!(c.provenance.metric_id.as_deref(), Some("repo.commits"));
        assert_eq!(c.provenance.inputs.len(), 1);
    }

    #[test]
    fn test_null_and_wrong_typed_fields_become_missing() {
        let c: CommitsMetric = serde_json::from_value(json!({
            "total_commits": null,
            "avg_commits_per_day": "fast",
            "period_start": "not a date",
            "days_active": -3
        }))
        .unwrap();

        assert_eq!(c.total_commits, None);
        assert_eq!(c.avg_commits_per_day, None);
        assert_eq!(c.period_start, None);
        assert_eq!(c.days_active, None);
    }

    #[test]
    fn test_malformed_section_does_not_poison_repo() {
        let r: RepoMetricSet = serde_json::from_value(json!({
            "commits": "oops",
            "contributors": {"unique_contributors": 3},
            "lead_time": {"value": 12.5, "unit": "hours"}
        }))
        .unwrap();

        assert!(r.commits.is_none());
        assert_eq!(r.unique_contributors(), Some(3));
        assert_eq!(r.lead_time.unwrap().unit.as_deref(), Some("hours"));
    }

    #[test]
    fn test_ai_indicator_alias() {
        let r: RepoMetricSet = serde_json::from_value(json!({
            "ai_usage_indicators": {"ai_probability_score": 35.0, "ai_attributed_commits": 4}
        }))
        .unwrap();
        let ai = r.ai_analysis.unwrap();
        assert_eq!(ai.ai_probability_score, Some(35.0));
        assert_eq!(ai.ai_attributed_commits, Some(4));
    }

    #[test]
    fn test_empty_weekly_data_is_not_weekly() {
        let r = RepoMetricSet {
            velocity_trend: Some(VelocityTrend {
                weekly_data: Some(BTreeMap::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(r.weekly_data().is_none());
    }

    #[test]
    fn test_bad_weekly_count_keeps_other_weeks() {
        let t: VelocityTrend = serde_json::from_value(json!({
            "weekly_data": {"2026-W01": 5, "2026-W02": null, "2026-W03": 7, "2026-W04": -2, "2026-W05": 1.5}
        }))
        .unwrap();
        let weeks = t.weeks().unwrap();
        assert_eq!(weeks.len(), 5);
        assert_eq!(weeks["2026-W01"], Some(5));
        assert_eq!(weeks["2026-W02"], None);
        assert_eq!(weeks["2026-W03"], Some(7));
        assert_eq!(weeks["2026-W04"], None);
        assert_eq!(weeks["2026-W05"], None);

        let t: VelocityTrend = serde_json::from_value(json!({"weekly_data": [1, 2]})).unwrap();
        assert!(t.weekly_data.is_none());
    }

    #[test]
    fn test_global_accessors() {
        let g: GlobalMetricSet = serde_json::from_value(json!({
            "commits.json": {"total_commits": 120, "repos_count": 3},
            "summary.json": {"repos_analyzed": ["A", "B"], "repos_total_count": 3},
            "velocity.json": {"value": 1.75, "unit": "commits/day"},
            "tests.json": {"total_test_files": 14, "total_epics_found": 5},
            "ai_usage_analysis.json": {
                "global_ai_score": 22.5,
                "repositories_ranked": [{"repo": "A", "score": 30.0, "ai_commits": 3, "percentage": 10.0}]
            }
        }))
        .unwrap();

        assert_eq!(g.commits().unwrap().total_commits, Some(120));
        assert_eq!(g.summary().unwrap().repos_analyzed, vec!["A", "B"]);
        assert_eq!(g.velocity().unwrap().value, Some(1.75));
        assert_eq!(g.tests().unwrap().total_epics_found, Some(5));
        assert_eq!(g.ai_usage().unwrap().repositories_ranked[0].repo, "A");
        assert!(g.contributors().is_none());
    }
}
