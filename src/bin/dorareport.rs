use clap::{Parser, Subcommand};

use dorareport::date_util::days_inclusive;
use dorareport::metrics::{average_dora_frequency, average_lead_time, RepoMetricSet};
use dorareport::present::{
    ai_score_band, format_average, format_count, format_list, format_opt_count, format_range,
    format_rate, validation_badge,
};
use dorareport::{
    candidate_bases, AggregatedView, AiReport, ConfigStore, DateWindow, DoraReport, FilterState,
    HydrateReport, HydrateStatus, Loader, RepoDetail, Scope, Source,
};

#[derive(Parser)]
#[command(name = "dorareport", about = "Delivery metrics report over computed repository metrics")]
struct Cli {
    /// Metrics source: a calculations/ URL or directory (repeatable, tried in order)
    #[arg(long)]
    source: Vec<String>,

    /// Dashboard page URL; derives calculations/ candidates from its location
    #[arg(long)]
    page: Option<String>,

    /// Config path (default: ~/.dorareport/config.json)
    #[arg(long)]
    config: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    #[command(flatten)]
    Report(ReportCommand),
}

/// Commands that read the metrics manifest.
#[derive(Subcommand)]
enum ReportCommand {
    /// Organization totals, optionally scoped to projects and dates
    Summary {
        /// Repo name, comma-separated names, or "all"
        #[arg(long)]
        project: Option<String>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Details for one repository
    Repo {
        name: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List repositories in the manifest
    Repos,
    /// AI usage indicators with ranked repositories
    Ai {
        /// Repo name, comma-separated names, or "all"
        #[arg(long)]
        project: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manifest and validation status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Remove a config value
    Unset { key: String },
    /// List all config values
    List,
}

/// Sources from flags, then config, then the conventional local layouts.
fn resolve_sources(
    flags: &[String],
    page: Option<&str>,
    config: &ConfigStore,
) -> anyhow::Result<Vec<Source>> {
    let mut sources = flags
        .iter()
        .map(|s| Source::parse(s))
        .collect::<dorareport::Result<Vec<_>>>()?;
    if let Some(page) = page {
        sources.extend(candidate_bases(page)?.into_iter().map(Source::Http));
    }
    if sources.is_empty() {
        sources = config.sources()?;
    }
    if sources.is_empty() {
        sources = ["calculations", "../calculations"]
            .iter()
            .map(|s| Source::parse(s))
            .collect::<dorareport::Result<Vec<_>>>()?;
    }
    Ok(sources)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &cli.config {
        Some(path) => ConfigStore::open_at(path).await?,
        None => ConfigStore::open().await?,
    };

    let command = match cli.command {
        Commands::Config { action } => return handle_config(&mut config, action).await,
        Commands::Report(command) => command,
    };

    let sources = resolve_sources(&cli.source, cli.page.as_deref(), &config)?;
    log::info!(
        "Metric sources: {}",
        sources.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );
    let loader = Loader::from_sources(&sources, config.timeout()?)?;
    let mut report = DoraReport::open(loader).await?;
    warn_on_hydrate(report.hydrate_report());

    match command {
        ReportCommand::Summary {
            project,
            from,
            to,
            json,
        } => {
            let project = project.or_else(|| config.default_project().map(str::to_string));
            let scope = Scope::parse_in(project.as_deref().unwrap_or("all"), report.manifest());
            for name in scope.unknown(report.manifest()) {
                log::warn!("Unknown project '{name}'");
            }
            let window = DateWindow::parse(from.as_deref(), to.as_deref())?;
            let state = FilterState::new(scope, window);
            let view = report.apply(state.clone()).clone();
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_summary(&report, &state, &view);
            }
        }
        ReportCommand::Repo { name, from, to, json } => {
            let window = DateWindow::parse(from.as_deref(), to.as_deref())?;
            let detail = report.repo_detail(&name, &window)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_repo(&detail);
            }
        }
        ReportCommand::Repos => {
            print_repos(&report);
        }
        ReportCommand::Ai { project, json } => {
            let scope = Scope::parse_in(project.as_deref().unwrap_or("all"), report.manifest());
            let ai = report.ai_report(&scope);
            if json {
                println!("{}", serde_json::to_string_pretty(&ai)?);
            } else {
                print_ai(&ai);
            }
        }
        ReportCommand::Status => {
            print_status(&report);
        }
    }

    Ok(())
}

async fn handle_config(config: &mut ConfigStore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match config.get(&key) {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::Unset { key } => {
            if config.remove(&key).await? {
                println!("Removed: {key}");
            } else {
                println!("{key} is not set");
            }
        }
        ConfigAction::List => {
            let items = config.list();
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

fn warn_on_hydrate(report: &HydrateReport) {
    if report.status != HydrateStatus::Success {
        log::warn!(
            "Weekly data unavailable for {}; date filters use whole periods there",
            report.failed_repos.join(", ")
        );
    }
}

fn print_summary(report: &DoraReport, state: &FilterState, view: &AggregatedView) {
    println!("Summary: {}", view.scope);
    if state.is_date_filtered() {
        println!("  Window:        {}", state.window);
    }
    println!("  Repos:         {}", view.repos_in_scope);
    println!("  Commits:       {}", format_count(view.total_commits));
    println!("  Commits/day:   {}", format_average(&view.avg_commits_per_day));
    let approx = if view.contributors_approximate { " (summed per repo)" } else { "" };
    println!("  Contributors:  {}{approx}", format_count(view.contributors_count));
    println!("  Period:        {}", format_range(view.period_start, view.period_end));

    let repos: Vec<&RepoMetricSet> = state
        .scope
        .select(report.manifest())
        .into_iter()
        .map(|(_, m)| m)
        .collect();
    let freq = average_dora_frequency(&repos);
    let lead = average_lead_time(&repos);
    println!("  Deploy freq:   {}", format_average(&freq.value));
    println!("  Lead time:     {}", format_average(&lead.value));

    if state.is_date_filtered() {
        println!(
            "  Filtering:     {} weekly, {} period, {} outside window",
            view.regimes.weekly, view.regimes.period, view.regimes.outside_window
        );
    }
    if view.skipped > 0 {
        println!("  Skipped:       {} repo(s) without commit data", view.skipped);
    }
    println!("  Method:        {}", view.method);
}

fn print_repo(d: &RepoDetail) {
    let m = &d.metrics;
    println!("Repository: {}", d.name);
    if d.malformed {
        println!("  (metrics entry unreadable)");
    }
    println!("  Commits:       {}", format_opt_count(m.total_commits()));
    println!("  Commits/day:   {}", format_rate(m.avg_commits_per_day(), None));
    let (start, end) = m.period();
    println!("  Period:        {}", format_range(start, end));
    println!("  Contributors:  {}", format_opt_count(m.unique_contributors()));
    println!(
        "  Coverage:      {}",
        format_rate(m.coverage.as_ref().and_then(|c| c.value), Some("%"))
    );
    if let Some(reason) = m.coverage.as_ref().and_then(|c| c.provenance.reason.as_deref()) {
        println!("                 {reason}");
    }
    let dora = m.dora_frequency.as_ref();
    println!(
        "  Deploy freq:   {}",
        format_rate(dora.and_then(|r| r.value), dora.and_then(|r| r.unit.as_deref()))
    );
    let lead = m.lead_time.as_ref();
    println!(
        "  Lead time:     {}",
        format_rate(lead.and_then(|r| r.value), lead.and_then(|r| r.unit.as_deref()))
    );

    if let Some(t) = &m.tests {
        println!("  Tests:");
        println!("    Files:       {}", format_opt_count(t.test_files));
        println!("    Frameworks:  {}", format_list(&t.test_frameworks));
        println!("    Epics:       {}", format_opt_count(t.epics));
        println!("    Stories:     {}", format_opt_count(t.user_stories));
    }
    if !d.uncovered_epics.is_empty() {
        println!("  Untested epics: {}", format_list(&d.uncovered_epics));
    }

    if let Some(ai) = &m.ai_analysis {
        if let Some(score) = ai.ai_probability_score {
            println!("  AI score:      {score:.1} ({})", ai_score_band(score));
        }
    }

    if !d.window.is_unbounded() {
        let f = &d.filtered;
        println!("  In window {}:", d.window);
        if let (Some(from), Some(to)) = (d.window.from, d.window.to) {
            if !d.window.is_empty() {
                println!("    Days:        {}", days_inclusive(from, to));
            }
        }
        println!("    Commits:     {}", format_count(f.total_commits));
        println!("    Commits/day: {}", format_rate(f.avg_commits_per_day, None));
        let note = if f.coarse { " (whole period counted)" } else { "" };
        println!("    Basis:       {}{note}", f.regime);
        if f.malformed_weeks > 0 {
            println!("    Dropped:     {} malformed weekly bucket(s)", f.malformed_weeks);
        }
    }
}

fn print_repos(report: &DoraReport) {
    let manifest = report.manifest();
    if manifest.per_repo_metrics.is_empty() {
        println!("No repositories found.");
        return;
    }
    for (name, m) in &manifest.per_repo_metrics {
        let (start, end) = m.period();
        let weekly = if m.weekly_data().is_some() { " weekly" } else { "" };
        println!(
            "{name}  commits: {}  period: {}{weekly}",
            format_opt_count(m.total_commits()),
            format_range(start, end)
        );
    }
    println!("\n{} repositories", manifest.per_repo_metrics.len());
}

fn print_ai(ai: &AiReport) {
    println!("AI usage:");
    match ai.global_ai_score {
        Some(score) => println!("  Score:         {score:.1} ({})", ai_score_band(score)),
        None => println!("  Score:         N/A"),
    }
    if let Some(text) = &ai.score_interpretation {
        println!("                 {text}");
    }
    println!(
        "  AI commits:    {} of {}",
        format_opt_count(ai.total_ai_commits),
        format_opt_count(ai.total_commits_analyzed)
    );
    println!("  Share:         {}", format_rate(ai.global_ai_percentage, Some("%")));
    if ai.ranked.is_empty() {
        println!("  No repositories ranked.");
        return;
    }
    println!("  Ranking:");
    for (i, r) in ai.ranked.iter().enumerate() {
        println!(
            "    {}. {} {:.1} ({} commits, {:.1}%)",
            i + 1,
            r.repo,
            r.score,
            r.ai_commits,
            r.percentage
        );
    }
}

fn print_status(report: &DoraReport) {
    let m = report.manifest();
    println!("Manifest: {}", m.manifest_id.as_deref().unwrap_or("(unnamed)"));
    println!("  Generated:  {}", m.generated_at.as_deref().unwrap_or("unknown"));
    println!("  Validation: {}", validation_badge(m.validation_status.as_deref()));
    if let Some(s) = &m.summary {
        println!(
            "  Metrics:    {} ({} errors, {} warnings)",
            format_opt_count(s.total_metrics),
            format_opt_count(s.validation_errors),
            format_opt_count(s.validation_warnings)
        );
    }
    println!("  Repos:      {}", m.per_repo_metrics.len());
    if !m.malformed_repos.is_empty() {
        let names: Vec<String> = m.malformed_repos.iter().cloned().collect();
        println!("  Malformed:  {}", format_list(&names));
    }
    let globals: Vec<String> = m.global_metrics.keys().map(str::to_string).collect();
    println!("  Globals:    {}", format_list(&globals));
    let (start, end) = m.default_date_range();
    println!("  Range:      {}", format_range(start, end));

    let h = report.hydrate_report();
    println!("  Weekly:     {:?} ({} loaded, {} failed)", h.status, h.loaded, h.failed);
    if let Some(ref err) = h.error {
        println!("  Error:      {err}");
    }
    for e in &m.errors {
        println!("  ! {e}");
    }
    for w in &m.warnings {
        println!("  ~ {w}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_is_split_from_report_commands() {
        let cli = Cli::try_parse_from(["dorareport", "config", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::List
            }
        ));

        let cli = Cli::try_parse_from(["dorareport", "summary", "--project", "A", "--json"]).unwrap();
        match cli.command {
            Commands::Report(ReportCommand::Summary { project, json, .. }) => {
                assert_eq!(project.as_deref(), Some("A"));
                assert!(json);
            }
            _ => panic!("expected summary"),
        }

        let cli = Cli::try_parse_from(["dorareport", "--source", "calculations", "status"]).unwrap();
        assert_eq!(cli.source, vec!["calculations"]);
        assert!(matches!(cli.command, Commands::Report(ReportCommand::Status)));
    }
}
