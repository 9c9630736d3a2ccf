//! converge - plan configuration patches and wait on remote state changes.

use clap::{Parser, Subcommand};
use converge_engine::{patch, ConfigTree, DiffOptions, DiffSummary, Differ, NewKeyPolicy, PatchPath};
use converge_runtime::{CancelToken, CommandProbe, Config, Waiter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "converge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the patch operations that turn one JSON configuration into another
    Plan {
        /// Current configuration (JSON)
        #[arg(long)]
        old: PathBuf,
        /// Desired configuration (JSON)
        #[arg(long)]
        new: PathBuf,
        /// Path prefix for every operation, e.g. /variables
        #[arg(long, default_value = "")]
        base_path: String,
        /// Emit `add` instead of `replace` for keys missing from the old side
        #[arg(long)]
        add_when_absent: bool,
        #[arg(long)]
        pretty: bool,
    },
    /// Run a command repeatedly until its first output line is a target status
    Wait {
        /// Status labels that mean "still in progress"
        #[arg(long, value_delimiter = ',')]
        pending: Vec<String>,
        /// Status labels that mean "done". Leave empty to wait for the resource to disappear.
        #[arg(long, value_delimiter = ',')]
        target: Vec<String>,
        #[arg(long, env = "CONVERGE_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
        #[arg(long, env = "CONVERGE_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,
        #[arg(long, env = "CONVERGE_NOT_FOUND_CHECKS")]
        not_found_checks: Option<u32>,
        #[arg(long, env = "CONVERGE_CONTINUOUS_TARGET")]
        continuous_target: Option<u32>,
        /// Exit code of the command that means the resource does not exist
        #[arg(long)]
        not_found_exit_code: Option<i32>,
        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "converge_runtime=info,converge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Plan {
            old,
            new,
            base_path,
            add_when_absent,
            pretty,
        } => plan(&old, &new, &base_path, add_when_absent, pretty).await,
        Command::Wait {
            pending,
            target,
            timeout_secs,
            poll_interval_ms,
            not_found_checks,
            continuous_target,
            not_found_exit_code,
            command,
        } => {
            let overrides = Overrides {
                timeout_secs,
                poll_interval_ms,
                not_found_checks,
                continuous_target,
            };
            wait(pending, target, overrides, not_found_exit_code, &command).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn load_tree(path: &Path) -> Result<ConfigTree, BoxError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("reading {}: {e}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| format!("parsing {}: {e}", path.display()))?;
    Ok(ConfigTree::from_json(&value)?)
}

async fn plan(
    old: &Path,
    new: &Path,
    base_path: &str,
    add_when_absent: bool,
    pretty: bool,
) -> Result<(), BoxError> {
    let old = load_tree(old).await?;
    let new = load_tree(new).await?;
    let base = PatchPath::parse(base_path)?;

    let policy = if add_when_absent {
        NewKeyPolicy::AddWhenAbsent
    } else {
        NewKeyPolicy::AlwaysReplace
    };
    let ops = Differ::new(DiffOptions {
        new_key_policy: policy,
    })
    .diff(&old, &new, &base)?;

    let summary = DiffSummary::from_ops(&ops);
    tracing::info!(
        adds = summary.adds,
        replaces = summary.replaces,
        removes = summary.removes,
        "planned {} operations",
        summary.total()
    );

    let document = if pretty {
        serde_json::to_string_pretty(&ops)?
    } else {
        patch::to_document(&ops)?
    };
    println!("{document}");
    Ok(())
}

struct Overrides {
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    not_found_checks: Option<u32>,
    continuous_target: Option<u32>,
}

async fn wait(
    pending: Vec<String>,
    target: Vec<String>,
    overrides: Overrides,
    not_found_exit_code: Option<i32>,
    argv: &[String],
) -> Result<(), BoxError> {
    let mut config = Config::from_env()?;
    if let Some(secs) = overrides.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = overrides.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(checks) = overrides.not_found_checks {
        config.not_found_checks = checks;
    }
    if let Some(occurrences) = overrides.continuous_target {
        config.continuous_target = occurrences;
    }

    let spec = config.waiter_spec(pending, target)?;
    let mut probe = CommandProbe::from_argv(argv).ok_or("missing command to run")?;
    if let Some(code) = not_found_exit_code {
        probe = probe.not_found_exit_code(code);
    }
    probe.check_waiter(&spec)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let outcome = Waiter::new(spec).wait(&probe, &cancel).await?;
    if let Some(output) = outcome.value {
        println!("{output}");
    }
    Ok(())
}
