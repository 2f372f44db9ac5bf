pub mod scope;
pub mod window;

pub use scope::Scope;
pub use window::{filter_repo_by_date_range, DateWindow, FilteredCommits, Regime};
