use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::date_util::{iso_week_start, parse_bound};
use crate::error::{Error, Result};
use crate::metrics::RepoMetricSet;

static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").unwrap());

/// An inclusive `[from, to]` date window. A missing bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Parse `YYYY-MM-DD` bounds; blank or missing means open.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self> {
        Ok(Self {
            from: parse_bound(from)?,
            to: parse_bound(to)?,
        })
    }

    /// No bound on either side: filtering is a no-op.
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// `from > to`: nothing can fall inside.
    pub fn is_empty(&self) -> bool {
        matches!((self.from, self.to), (Some(f), Some(t)) if f > t)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        !self.is_empty()
            && self.from.map_or(true, |f| date >= f)
            && self.to.map_or(true, |t| date <= t)
    }

    /// Whether `[start, end]` shares at least one day with this window.
    pub fn intersects(&self, start: NaiveDate, end: NaiveDate) -> bool {
        !self.is_empty()
            && self.from.map_or(true, |f| end >= f)
            && self.to.map_or(true, |t| start <= t)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let from = self.from.map(|d| d.to_string());
        let to = self.to.map(|d| d.to_string());
        write!(
            f,
            "{} to {}",
            from.as_deref().unwrap_or("start"),
            to.as_deref().unwrap_or("end")
        )
    }
}

/// Which filtering rule a repo's data supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Weekly commit buckets were available.
    Weekly,
    /// Only the repo's overall period was known.
    Period,
    /// No window was applied.
    None,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::Weekly => "weekly",
            Regime::Period => "period",
            Regime::None => "none",
        };
        f.write_str(s)
    }
}

/// One repo's commit figures restricted to a date window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredCommits {
    pub total_commits: u64,
    /// `None` only when no window applied and the repo never reported a value.
    pub avg_commits_per_day: Option<f64>,
    pub regime: Regime,
    /// The repo has activity inside the window.
    pub in_window: bool,
    /// Period regime inclusion: the whole period's totals were kept even if
    /// the overlap was partial.
    pub coarse: bool,
    /// Weekly regime: `retained weeks × 7`. Otherwise the repo's own figure.
    pub active_days: Option<u64>,
    pub weeks_retained: usize,
    /// Weekly buckets dropped for an unparseable label or count.
    pub malformed_weeks: usize,
}

impl FilteredCommits {
    fn zero(regime: Regime) -> Self {
        Self {
            total_commits: 0,
            avg_commits_per_day: Some(0.0),
            regime,
            in_window: false,
            coarse: false,
            active_days: Some(0),
            weeks_retained: 0,
            malformed_weeks: 0,
        }
    }
}

/// Parse an ISO week label (`2026-W05`) into the Monday that starts it.
pub fn parse_week_label(label: &str) -> Result<NaiveDate> {
    let caps = RE_WEEK
        .captures(label.trim())
        .ok_or_else(|| Error::WeekParse(label.to_string()))?;
    let year: i32 = caps[1]
        .parse()
        .map_err(|_| Error::WeekParse(label.to_string()))?;
    let week: u32 = caps[2]
        .parse()
        .map_err(|_| Error::WeekParse(label.to_string()))?;
    if week > 53 {
        return Err(Error::WeekParse(format!("{label}: week out of range")));
    }
    iso_week_start(year, week).ok_or_else(|| Error::WeekParse(label.to_string()))
}

/// Restrict one repo's commit figures to `window`.
///
/// Weekly buckets are used when the repo has them. Otherwise the repo's
/// `[period_start, period_end]` decides all-or-nothing: no intersection
/// contributes zero, any intersection keeps the original totals.
pub fn filter_repo_by_date_range(repo: &RepoMetricSet, window: &DateWindow) -> FilteredCommits {
    let days_active = repo.commits.as_ref().and_then(|c| c.days_active);

    if window.is_unbounded() {
        return FilteredCommits {
            total_commits: repo.total_commits().unwrap_or(0),
            avg_commits_per_day: repo.avg_commits_per_day(),
            regime: Regime::None,
            in_window: true,
            coarse: false,
            active_days: days_active,
            weeks_retained: 0,
            malformed_weeks: 0,
        };
    }

    if let Some(weeks) = repo.weekly_data() {
        let mut total = 0u64;
        let mut retained = 0usize;
        let mut malformed = 0usize;
        for (label, count) in weeks {
            let Some(count) = count else {
                log::debug!("Dropping weekly bucket {label}: count is not a non-negative integer");
                malformed += 1;
                continue;
            };
            match parse_week_label(label) {
                Ok(start) => {
                    if window.contains(start) {
                        total += count;
                        retained += 1;
                    }
                }
                Err(e) => {
                    log::debug!("Dropping weekly bucket: {e}");
                    malformed += 1;
                }
            }
        }
        let active_days = retained as u64 * 7;
        let avg = if active_days > 0 {
            total as f64 / active_days as f64
        } else {
            0.0
        };
        return FilteredCommits {
            total_commits: total,
            avg_commits_per_day: Some(avg),
            regime: Regime::Weekly,
            in_window: retained > 0,
            coarse: false,
            active_days: Some(active_days),
            weeks_retained: retained,
            malformed_weeks: malformed,
        };
    }

    match repo.period() {
        (Some(start), Some(end)) if window.intersects(start, end) => FilteredCommits {
            total_commits: repo.total_commits().unwrap_or(0),
            avg_commits_per_day: repo.avg_commits_per_day(),
            regime: Regime::Period,
            in_window: true,
            coarse: true,
            active_days: days_active,
            weeks_retained: 0,
            malformed_weeks: 0,
        },
        // An undated repo cannot be placed in any window.
        _ => FilteredCommits::zero(Regime::Period),
    }
}
