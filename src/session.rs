use std::sync::Arc;

use serde::Serialize;

use crate::metrics::{aggregate_with_date_filter, AggregatedView, Manifest};
use crate::query::{DateWindow, Scope};

/// The user's current selection: which repos and which dates.
///
/// Transitions return a new value; the old one is untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub scope: Scope,
    pub window: DateWindow,
}

impl FilterState {
    pub fn new(scope: Scope, window: DateWindow) -> Self {
        Self { scope, window }
    }

    pub fn with_project(&self, scope: Scope) -> Self {
        Self {
            scope,
            window: self.window,
        }
    }

    pub fn with_dates(&self, window: DateWindow) -> Self {
        Self {
            scope: self.scope.clone(),
            window,
        }
    }

    pub fn without_dates(&self) -> Self {
        self.with_dates(DateWindow::unbounded())
    }

    pub fn is_date_filtered(&self) -> bool {
        !self.window.is_unbounded()
    }
}

/// One recomputation request, detached from the session so it can run
/// anywhere (a blocking task, another thread).
#[derive(Debug, Clone)]
pub struct Pass {
    generation: u64,
    manifest: Arc<Manifest>,
    state: FilterState,
}

impl Pass {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Pure: the same pass always yields the same view.
    pub fn compute(&self) -> Computed {
        Computed {
            generation: self.generation,
            view: aggregate_with_date_filter(&self.manifest, &self.state.scope, &self.state.window),
        }
    }
}

/// The result of a [`Pass`], tagged with the generation that requested it.
#[derive(Debug, Clone, Serialize)]
pub struct Computed {
    pub generation: u64,
    pub view: AggregatedView,
}

/// Holds the loaded manifest and the last view shown for it.
///
/// Every [`Session::begin`] bumps the generation. A result is only accepted
/// if it belongs to the newest generation, so a slow pass finishing after a
/// newer one can never overwrite it.
#[derive(Debug)]
pub struct Session {
    manifest: Arc<Manifest>,
    state: FilterState,
    view: Option<AggregatedView>,
    generation: u64,
}

impl Session {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
            state: FilterState::default(),
            view: None,
            generation: 0,
        }
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    /// The most recently requested filter.
    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// The view for the most recently committed pass, if any.
    pub fn view(&self) -> Option<&AggregatedView> {
        self.view.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Request a recomputation for `state`. Earlier passes become stale.
    pub fn begin(&mut self, state: FilterState) -> Pass {
        self.generation += 1;
        self.state = state;
        log::debug!(
            "Pass {} started (scope={}, window={})",
            self.generation,
            self.state.scope,
            self.state.window
        );
        Pass {
            generation: self.generation,
            manifest: Arc::clone(&self.manifest),
            state: self.state.clone(),
        }
    }

    /// Install a computed view. Returns `false` and drops it when a newer
    /// pass has been started since.
    pub fn commit(&mut self, computed: Computed) -> bool {
        if computed.generation != self.generation {
            log::debug!(
                "Dropping stale pass {} (current {})",
                computed.generation,
                self.generation
            );
            return false;
        }
        self.view = Some(computed.view);
        true
    }

    /// Begin, compute and commit in one step.
    pub fn apply(&mut self, state: FilterState) -> &AggregatedView {
        let computed = self.begin(state).compute();
        self.view.insert(computed.view)
    }

    /// Swap in a freshly loaded manifest. In-flight passes computed against
    /// the old one are invalidated and the current filter is recomputed.
    pub fn replace_manifest(&mut self, manifest: Manifest) -> &AggregatedView {
        self.manifest = Arc::new(manifest);
        let state = self.state.clone();
        self.apply(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Average, CommitsMetric, RepoMetricSet};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn manifest(repos: &[(&str, u64, Option<f64>)]) -> Manifest {
        Manifest {
            per_repo_metrics: repos
                .iter()
                .map(|(name, total, avg)| {
                    (
                        name.to_string(),
                        RepoMetricSet {
                            commits: Some(CommitsMetric {
                                total_commits: Some(*total),
                                avg_commits_per_day: *avg,
                                period_start: Some(d(2025, 6, 1)),
                                period_end: Some(d(2025, 6, 30)),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_state_transitions_are_pure() {
        let base = FilterState::default();
        let scoped = base.with_project(Scope::single("A"));
        let dated = scoped.with_dates(DateWindow::new(Some(d(2025, 1, 1)), None));

        assert_eq!(base.scope, Scope::All);
        assert_eq!(scoped.scope, Scope::single("A"));
        assert!(!scoped.is_date_filtered());
        assert!(dated.is_date_filtered());
        assert_eq!(dated.scope, Scope::single("A"));
        assert_eq!(dated.without_dates(), scoped);
    }

    #[test]
    fn test_apply_computes_view() {
        let mut s = Session::new(manifest(&[("A", 10, Some(2.0)), ("B", 20, None)]));
        let view = s.apply(FilterState::default());
        assert_eq!(view.total_commits, 30);
        assert_eq!(view.avg_commits_per_day, Average::Value(2.0));
        assert_eq!(s.generation(), 1);
    }

    #[test]
    fn test_stale_pass_is_dropped() {
        let mut s = Session::new(manifest(&[("A", 10, Some(2.0)), ("B", 20, None)]));

        let slow = s.begin(FilterState::default().with_project(Scope::single("A")));
        let fast = s.begin(FilterState::default().with_project(Scope::single("B")));

        assert!(s.commit(fast.compute()));
        assert!(!s.commit(slow.compute()));

        let view = s.view().unwrap();
        assert_eq!(view.scope, "B");
        assert_eq!(view.total_commits, 20);
        assert_eq!(s.state().scope, Scope::single("B"));
    }

    #[test]
    fn test_pass_compute_is_deterministic() {
        let mut s = Session::new(manifest(&[("A", 10, Some(2.0))]));
        let pass = s.begin(FilterState::default().with_dates(DateWindow::new(Some(d(2025, 6, 10)), None)));
        assert_eq!(pass.compute().view, pass.compute().view);
    }

    #[test]
    fn test_replace_manifest_invalidates_in_flight() {
        let mut s = Session::new(manifest(&[("A", 10, Some(2.0))]));
        let in_flight = s.begin(FilterState::default());

        let view = s.replace_manifest(manifest(&[("A", 10, Some(2.0)), ("C", 5, Some(1.0))]));
        assert_eq!(view.total_commits, 15);

        assert!(!s.commit(in_flight.compute()));
        assert_eq!(s.view().unwrap().total_commits, 15);
        assert_eq!(s.manifest().per_repo_metrics.len(), 2);
    }

    #[tokio::test]
    async fn test_pass_runs_on_blocking_task() {
        let mut s = Session::new(manifest(&[("A", 10, Some(2.0))]));
        let pass = s.begin(FilterState::default());
        let computed = tokio::task::spawn_blocking(move || pass.compute()).await.unwrap();
        assert!(s.commit(computed));
        assert_eq!(s.view().unwrap().total_commits, 10);
    }
}
