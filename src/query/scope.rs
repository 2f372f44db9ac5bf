use std::collections::BTreeSet;

use crate::metrics::{Manifest, RepoMetricSet};

/// Which repos take part in an aggregation.
///
/// Dashboards only ever ask for `All` or a single project, but any set of
/// names is accepted. Names are matched exactly against manifest keys;
/// unknown names simply select nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    All,
    Projects(BTreeSet<String>),
}

impl Scope {
    pub fn single(name: impl Into<String>) -> Self {
        Scope::Projects(BTreeSet::from([name.into()]))
    }

    pub fn projects<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scope::Projects(names.into_iter().map(Into::into).collect())
    }

    /// Parse `all` (or blank) or a comma-separated list of repo names.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Scope::All;
        }
        Scope::projects(
            s.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty()),
        )
    }

    /// Like [`Scope::parse`], but an exact manifest key wins, so a repo
    /// named `all` (or one with a comma in its name) can still be picked alone.
    pub fn parse_in(s: &str, manifest: &Manifest) -> Self {
        let name = s.trim();
        if !name.is_empty() && manifest.repo(name).is_some() {
            return Scope::single(name);
        }
        Self::parse(s)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Scope::All)
    }

    /// The repos this scope selects, in manifest (sorted) order.
    pub fn select<'m>(&self, manifest: &'m Manifest) -> Vec<(&'m str, &'m RepoMetricSet)> {
        match self {
            Scope::All => manifest
                .per_repo_metrics
                .iter()
                .map(|(name, m)| (name.as_str(), m))
                .collect(),
            Scope::Projects(names) => manifest
                .per_repo_metrics
                .iter()
                .filter(|(name, _)| names.contains(name.as_str()))
                .map(|(name, m)| (name.as_str(), m))
                .collect(),
        }
    }

    /// Requested names that the manifest does not know.
    pub fn unknown<'s>(&'s self, manifest: &Manifest) -> Vec<&'s str> {
        match self {
            Scope::All => Vec::new(),
            Scope::Projects(names) => names
                .iter()
                .filter(|n| manifest.repo(n).is_none())
                .map(String::as_str)
                .collect(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::Projects(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}
