pub mod manifest;
pub mod types;

pub use manifest::*;
pub use types::*;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::query::scope::Scope;
use crate::query::window::{filter_repo_by_date_range, DateWindow, Regime};

/// A mean that may have had nothing to average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Average {
    Value(f64),
    /// No repo reported a finite value. Rendered as `N/A`.
    NotAvailable,
}

impl Average {
    /// Mean of the finite values; non-finite values are ignored.
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let (sum, n) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 {
            Average::NotAvailable
        } else {
            Average::Value(sum / n as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Average::Value(v) => Some(*v),
            Average::NotAvailable => None,
        }
    }
}

impl std::fmt::Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Average::Value(v) => write!(f, "{v:.2}"),
            Average::NotAvailable => f.write_str("N/A"),
        }
    }
}

impl Serialize for Average {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Average::Value(v) => s.serialize_f64(*v),
            Average::NotAvailable => s.serialize_str("N/A"),
        }
    }
}

/// A figure plus how many repos fed it and how many were skipped for
/// lacking the field. `skipped` is diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tally<T> {
    pub value: T,
    pub counted: usize,
    pub skipped: usize,
}

fn sum_field<F>(repos: &[&RepoMetricSet], field: F) -> Tally<u64>
where
    F: Fn(&RepoMetricSet) -> Option<u64>,
{
    let mut tally = Tally { value: 0, counted: 0, skipped: 0 };
    for &repo in repos {
        match field(repo) {
            Some(v) => {
                tally.value += v;
                tally.counted += 1;
            }
            None => tally.skipped += 1,
        }
    }
    tally
}

fn mean_field<F>(repos: &[&RepoMetricSet], field: F) -> Tally<Average>
where
    F: Fn(&RepoMetricSet) -> Option<f64>,
{
    let values: Vec<f64> = repos
        .iter()
        .filter_map(|&r| field(r))
        .filter(|v| v.is_finite())
        .collect();
    Tally {
        counted: values.len(),
        skipped: repos.len() - values.len(),
        value: Average::of(values),
    }
}

/// Sum of `commits.total_commits`; repos without it add nothing.
pub fn sum_commits(repos: &[&RepoMetricSet]) -> Tally<u64> {
    sum_field(repos, RepoMetricSet::total_commits)
}

/// Sum of per-repo unique contributor counts.
///
/// Not a headcount: someone active in two repos is counted twice.
pub fn sum_contributors(repos: &[&RepoMetricSet]) -> Tally<u64> {
    sum_field(repos, RepoMetricSet::unique_contributors)
}

/// Mean `avg_commits_per_day` over repos reporting a finite value. Null
/// repos are left out of the divisor, not counted as zero.
pub fn average_velocity(repos: &[&RepoMetricSet]) -> Tally<Average> {
    mean_field(repos, RepoMetricSet::avg_commits_per_day)
}

pub fn average_dora_frequency(repos: &[&RepoMetricSet]) -> Tally<Average> {
    mean_field(repos, |r| r.dora_frequency.as_ref().and_then(|m| m.value))
}

pub fn average_lead_time(repos: &[&RepoMetricSet]) -> Tally<Average> {
    mean_field(repos, |r| r.lead_time.as_ref().and_then(|m| m.value))
}

/// Anything carrying a numeric score to rank by.
pub trait Scored {
    fn score(&self) -> f64;
}

impl Scored for RepoScore {
    fn score(&self) -> f64 {
        self.score
    }
}

/// Stable sort, highest score first. Equal scores keep their input order;
/// NaN scores sink to the bottom.
pub fn rank_repos_by_score<T: Scored>(mut items: Vec<T>) -> Vec<T> {
    fn key(v: f64) -> f64 {
        if v.is_nan() {
            f64::NEG_INFINITY
        } else {
            v
        }
    }
    items.sort_by(|a, b| key(b.score()).total_cmp(&key(a.score())));
    items
}

/// Ranking built from per-repo AI analysis, for manifests without a global
/// `ai_usage_analysis.json`.
pub fn repo_ai_scores(manifest: &Manifest, scope: &Scope) -> Vec<RepoScore> {
    let scores = scope
        .select(manifest)
        .into_iter()
        .filter_map(|(name, m)| {
            let ai = m.ai_analysis.as_ref()?;
            Some(RepoScore {
                repo: name.to_string(),
                score: ai.ai_probability_score?,
                ai_commits: ai.ai_attributed_commits.unwrap_or(0),
                percentage: ai.ai_commits_percentage.unwrap_or(0.0),
            })
        })
        .collect();
    rank_repos_by_score(scores)
}

/// How many repos each filtering rule handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegimeCounts {
    pub weekly: usize,
    pub period: usize,
    pub none: usize,
    /// Repos that contributed nothing because they fell outside the window.
    pub outside_window: usize,
}

/// Organization figures for one (manifest, filter) pair. Always recomputed,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedView {
    pub scope: String,
    pub total_commits: u64,
    pub avg_commits_per_day: Average,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub contributors_count: u64,
    /// Contributors are summed per repo, so people active in several repos
    /// are counted more than once.
    pub contributors_approximate: bool,
    pub repos_in_scope: usize,
    pub regimes: RegimeCounts,
    /// Repos without commit data.
    pub skipped: usize,
    pub malformed_weeks: usize,
    pub method: String,
}

fn period_bounds(repos: &[&RepoMetricSet]) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let starts = repos.iter().filter_map(|r| r.period().0);
    let ends = repos.iter().filter_map(|r| r.period().1);
    (starts.min(), ends.max())
}

/// Aggregate the repos selected by `scope` over their whole periods.
pub fn aggregate(manifest: &Manifest, scope: &Scope) -> AggregatedView {
    let repos: Vec<&RepoMetricSet> = scope.select(manifest).into_iter().map(|(_, m)| m).collect();

    let commits = sum_commits(&repos);
    let velocity = average_velocity(&repos);
    let contributors = sum_contributors(&repos);
    let (period_start, period_end) = period_bounds(&repos);

    let mut method = format!(
        "Sum of total_commits over {} repo(s); avg_commits_per_day averaged over {} repo(s) reporting a value; contributors summed per repo (not deduplicated)",
        repos.len(),
        velocity.counted
    );
    if commits.skipped > 0 {
        method.push_str(&format!("; {} repo(s) without commit data skipped", commits.skipped));
    }

    AggregatedView {
        scope: scope.to_string(),
        total_commits: commits.value,
        avg_commits_per_day: velocity.value,
        period_start,
        period_end,
        contributors_count: contributors.value,
        contributors_approximate: contributors.counted > 1,
        repos_in_scope: repos.len(),
        regimes: RegimeCounts {
            none: repos.len(),
            ..Default::default()
        },
        skipped: commits.skipped,
        malformed_weeks: 0,
        method,
    }
}

/// Aggregate the repos selected by `scope`, restricted to `window`.
///
/// Each repo is filtered on its own (weekly buckets where present, whole
/// period otherwise). Commits are summed; commits/day is the total over the
/// repos with activity in the window divided by their active days, so a repo
/// outside the window weighs nothing. Contributors come only from in-window
/// repos. An unbounded window is the same as no filter.
pub fn aggregate_with_date_filter(
    manifest: &Manifest,
    scope: &Scope,
    window: &DateWindow,
) -> AggregatedView {
    if window.is_unbounded() {
        return aggregate(manifest, scope);
    }

    let selected = scope.select(manifest);
    let mut active: Vec<&RepoMetricSet> = Vec::new();
    let mut total_commits = 0u64;
    let mut window_commits = 0u64;
    let mut window_days = 0u64;
    let mut regimes = RegimeCounts::default();
    let mut malformed_weeks = 0;
    let mut skipped = 0;

    for &(name, repo) in &selected {
        let f = filter_repo_by_date_range(repo, window);
        match f.regime {
            Regime::Weekly => regimes.weekly += 1,
            Regime::Period => regimes.period += 1,
            Regime::None => regimes.none += 1,
        }
        total_commits += f.total_commits;
        if f.in_window {
            active.push(repo);
            window_commits += f.total_commits;
            // A repo with no recorded active days still counts as one day.
            window_days += f.active_days.filter(|&d| d > 0).unwrap_or(1);
        } else {
            regimes.outside_window += 1;
        }
        if repo.commits.is_none() && f.regime != Regime::Weekly {
            skipped += 1;
        }
        if f.malformed_weeks > 0 {
            log::warn!("{name}: dropped {} malformed weekly bucket(s)", f.malformed_weeks);
        }
        malformed_weeks += f.malformed_weeks;
    }

    let velocity = if window_days == 0 {
        Average::NotAvailable
    } else {
        Average::Value(window_commits as f64 / window_days as f64)
    };
    let contributors = sum_contributors(&active);
    let (min_start, max_end) = period_bounds(&selected.iter().map(|(_, m)| *m).collect::<Vec<_>>());

    let mut method = format!(
        "Date-filtered ({window}) over {} repo(s): {} weekly-bucket, {} period-overlap (coarse: partially overlapping periods counted in full), {} outside the window; avg_commits_per_day weighted by active days over in-window repos; contributors summed per repo (not deduplicated)",
        selected.len(),
        regimes.weekly,
        regimes.period,
        regimes.outside_window
    );
    if skipped > 0 {
        method.push_str(&format!("; {skipped} repo(s) without commit data skipped"));
    }
    if malformed_weeks > 0 {
        method.push_str(&format!("; {malformed_weeks} malformed weekly bucket(s) dropped"));
    }

    AggregatedView {
        scope: scope.to_string(),
        total_commits,
        avg_commits_per_day: velocity,
        period_start: window.from.or(min_start),
        period_end: window.to.or(max_end),
        contributors_count: contributors.value,
        contributors_approximate: contributors.counted > 1,
        repos_in_scope: selected.len(),
        regimes,
        skipped,
        malformed_weeks,
        method,
    }
}
