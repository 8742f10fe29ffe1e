use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use dialoguer::Input;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use compliance_purge::core::logging;
use compliance_purge::toolkit::deletion::{
    ConfirmationPrompt, Confirmer, DeletionExecutor, DeletionMode, DeletionRequest,
    ExecutorSettings, TargetSpec, artifact, load_result, parse_expected_names, read_ids_file,
    save_json,
};
use compliance_purge::toolkit::discovery::{self, Matcher};
use compliance_purge::toolkit::verification;
use compliance_purge::{GatewayClient, PurgeConfig, PurgeError, ResourceApi, ResourceKind};

/// Discover, analyze and bulk-delete compliance hierarchy records.
#[derive(Parser)]
#[command(name = "compliance-purge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML/TOML/JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete records of one kind (dry-run unless --live)
    Delete(DeleteArgs),

    /// Search records by uid or name
    Search {
        kind: ResourceKind,
        pattern: String,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show everything below a region
    AnalyzeRegion {
        #[arg(long)]
        region_id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the dependents of each record
    Dependencies {
        kind: ResourceKind,
        #[arg(long, num_args = 1.., required = true)]
        ids: Vec<i64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Confirm records no longer exist
    VerifyDeleted {
        kind: ResourceKind,
        #[arg(long, num_args = 1.., required = true)]
        ids: Vec<i64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare restored records with the snapshots in a deletion artifact
    VerifyRestored {
        /// Deletion artifact, or a `.partial.jsonl` journal
        #[arg(long)]
        artifact: PathBuf,
        /// Field to leave out of the comparison (repeatable)
        #[arg(long = "ignore-field")]
        ignore_fields: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether deleted records have come back
    CheckRestoration(CheckRestorationArgs),
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("targets")
        .required(true)
        .args(["ids", "ids_file", "pattern", "region_id"])
))]
struct DeleteArgs {
    kind: ResourceKind,
    #[arg(long, num_args = 1..)]
    ids: Vec<i64>,
    /// JSON array of ids
    #[arg(long)]
    ids_file: Option<PathBuf>,
    /// Case-insensitive substring of uid or name
    #[arg(long)]
    pattern: Option<String>,
    #[arg(long, requires = "pattern")]
    regex: bool,
    #[arg(long, requires = "pattern")]
    case_sensitive: bool,
    #[arg(long)]
    region_id: Option<i64>,
    /// Actually delete. Without it nothing is changed.
    #[arg(long)]
    live: bool,
    /// Skip dependency checks
    #[arg(long)]
    force: bool,
    /// Skip the typed confirmation (the countdown still runs)
    #[arg(short, long)]
    yes: bool,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DeleteArgs {
    fn target_spec(&self) -> TargetSpec {
        if let Some(path) = &self.ids_file {
            TargetSpec::IdsFile(path.clone())
        } else if let Some(pattern) = &self.pattern {
            TargetSpec::Pattern {
                pattern: pattern.clone(),
                regex: self.regex,
                case_sensitive: self.case_sensitive,
            }
        } else if let Some(region_id) = self.region_id {
            TargetSpec::Region(region_id)
        } else {
            TargetSpec::Ids(self.ids.clone())
        }
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("targets").required(true).args(["ids", "ids_file"])))]
struct CheckRestorationArgs {
    kind: ResourceKind,
    #[arg(long, num_args = 1..)]
    ids: Vec<i64>,
    #[arg(long)]
    ids_file: Option<PathBuf>,
    /// JSON object of id -> expected name
    #[arg(long)]
    names: Option<String>,
    #[arg(long, conflicts_with = "names")]
    names_file: Option<PathBuf>,
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Delete(_) => "delete",
            Self::Search { .. } => "search",
            Self::AnalyzeRegion { .. } => "analyze_region",
            Self::Dependencies { .. } => "dependencies",
            Self::VerifyDeleted { .. } => "verify_deleted",
            Self::VerifyRestored { .. } => "verify_restored",
            Self::CheckRestoration(_) => "check_restoration",
        }
    }
}

/// Typed-phrase confirmation on the terminal.
struct TerminalConfirmer {
    assume_yes: bool,
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        eprintln!();
        eprintln!("WARNING: this is NOT a sandbox environment: {}", prompt.environment_url);
        eprintln!(
            "You are about to permanently delete {} {}.",
            prompt.count,
            prompt.kind.collection()
        );
        if self.assume_yes {
            warn!("--yes given; skipping typed confirmation");
            return true;
        }
        let phrase = prompt.phrase();
        match Input::<String>::new()
            .with_prompt(format!("Type '{}' to proceed", phrase))
            .allow_empty(true)
            .interact_text()
        {
            Ok(answer) => answer.trim() == phrase,
            Err(e) => {
                warn!("confirmation aborted: {}", e);
                false
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = PurgeConfig::from_process_env(cli.config.as_deref())?;
    if let Some(path) = logging::init(&config, cli.command.name())? {
        info!("Logging to {}", path.display());
    }
    let api: Arc<dyn ResourceApi> = Arc::new(GatewayClient::from_config(&config.gateway)?);
    let results_dir = config.deletion.results_dir.clone();

    match cli.command {
        Commands::Delete(args) => delete(&config, api, args).await,

        Commands::Search {
            kind,
            pattern,
            regex,
            case_sensitive,
            output,
        } => {
            let matcher = if regex {
                Matcher::regex(&pattern, case_sensitive)?
            } else {
                Matcher::substring(&pattern, case_sensitive)
            };
            let report = discovery::search(api.as_ref(), kind, &matcher).await?;
            for hit in &report.hits {
                let lineage: Vec<&str> = hit.lineage.iter().map(|r| r.display_name()).collect();
                println!(
                    "{:>8}  {:<20} {}  [{}]",
                    hit.record.id().unwrap_or_default(),
                    hit.record.uid().unwrap_or("-"),
                    hit.record.name().unwrap_or("-"),
                    lineage.join(" / ")
                );
            }
            println!("{} match(es) out of {}", report.hits.len(), report.scanned);
            write_report(&results_dir, output, "search", kind.collection(), &report)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::AnalyzeRegion { region_id, output } => {
            let analysis = discovery::analyze_region(api.as_ref(), region_id).await?;
            println!("{}", serde_json::to_string_pretty(&analysis.summary)?);
            write_report(
                &results_dir,
                output,
                "region_analysis",
                &region_id.to_string(),
                &analysis,
            )?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Dependencies { kind, ids, output } => {
            let reports = discovery::find_dependencies(api, kind, &ids).await?;
            for report in &reports {
                println!(
                    "{}: {}",
                    report.resource,
                    if report.safe_to_delete {
                        "safe to delete".to_string()
                    } else {
                        format!("{} dependent(s)", report.blocker_count())
                    }
                );
            }
            write_report(&results_dir, output, "dependencies", kind.collection(), &reports)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::VerifyDeleted { kind, ids, output } => {
            let checks = verification::verify_deleted(api.as_ref(), kind, &ids).await?;
            for (id, check) in &checks {
                println!("{} {}: {}", kind, id, if check.gone { "gone" } else { "STILL PRESENT" });
            }
            write_report(&results_dir, output, "verify_deleted", kind.collection(), &checks)?;
            Ok(exit_when(checks.values().all(|c| c.gone)))
        }

        Commands::VerifyRestored {
            artifact,
            ignore_fields,
            output,
        } => {
            let result = load_result(&artifact)?;
            let checks =
                verification::verify_restored(api.as_ref(), &result, &ignore_fields).await?;
            for (id, check) in &checks {
                let status = match (check.restored, check.missing) {
                    (true, _) => "restored".to_string(),
                    (false, true) => "NOT FOUND".to_string(),
                    (false, false) => format!("{} field(s) differ", check.diffs.len()),
                };
                println!("{} {}: {}", result.request.kind(), id, status);
            }
            let kind = result.request.kind();
            write_report(&results_dir, output, "verify_restored", kind.collection(), &checks)?;
            Ok(exit_when(checks.values().all(|c| c.restored)))
        }

        Commands::CheckRestoration(args) => {
            let ids = match &args.ids_file {
                Some(path) => read_ids_file(path)?,
                None => args.ids.clone(),
            };
            let names = match (&args.names, &args.names_file) {
                (Some(raw), _) => parse_expected_names(raw)?,
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    parse_expected_names(&raw)?
                }
                (None, None) => Default::default(),
            };
            let report = verification::check_present(api.as_ref(), args.kind, &ids, &names).await?;
            println!(
                "restored: {}, still missing: {}",
                report.restored.len(),
                report.still_missing.len()
            );
            write_report(
                &results_dir,
                args.output,
                "check_restoration",
                args.kind.collection(),
                &report,
            )?;
            Ok(exit_when(report.all_present()))
        }
    }
}

async fn delete(
    config: &PurgeConfig,
    api: Arc<dyn ResourceApi>,
    args: DeleteArgs,
) -> anyhow::Result<ExitCode> {
    let (ids, selector) = args.target_spec().resolve(api.as_ref(), args.kind).await?;
    if ids.is_empty() {
        warn!("No {} matched; nothing to do", args.kind.collection());
    }
    let mode = DeletionMode::resolve(args.live, config.safety.force_dry_run);
    if args.live && mode.is_dry_run() {
        warn!("DRY_RUN is set; --live ignored");
    }
    let request = DeletionRequest::new(args.kind, ids, mode, args.force).with_selector(selector);

    let confirmer = Arc::new(TerminalConfirmer {
        assume_yes: args.yes,
    });
    let executor = DeletionExecutor::new(api, confirmer, ExecutorSettings::from_config(config));

    match executor.run(request, args.output).await {
        Ok(run) => {
            let summary = run.result.summary;
            println!(
                "{}: {} succeeded, {} skipped, {} failed (of {})",
                mode.banner(),
                summary.succeeded,
                summary.skipped,
                summary.failed,
                summary.total
            );
            println!("Results saved to: {}", run.artifact.display());
            if run.result.authorization.is_fatal() {
                error!("Deletion aborted: operator did not confirm");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ PurgeError::Authentication(_)) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e).context("deletion run failed")),
    }
}

fn write_report<T: Serialize>(
    results_dir: &Path,
    output: Option<PathBuf>,
    command: &str,
    detail: &str,
    value: &T,
) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| artifact::report_path(results_dir, command, detail));
    save_json(&path, value)?;
    println!("Saved to: {}", path.display());
    Ok(())
}

fn exit_when(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
