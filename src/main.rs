//! # ddl-relay
//!
//! Replays scripted transactions through the relay, playing the host
//! database's part with an in-memory catalog, and forwards each committed
//! delta to a control plane (or just prints it when no URL is given).

mod replay;
mod script;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use relay_forward::{DeliveryClient, DeliveryOutcome, RetryPolicy};
use relay_hook::{Coordinator, RelaySettingsBuilder, SharedSettings, DEFAULT_PRIVILEGED_ROLE};
use replay::{Replayer, TxReport};
use script::Script;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ddl-relay")]
#[command(about = "Replay DDL transactions and forward their deltas to a control plane")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script of transactions
    Replay {
        /// Path to the script
        script: PathBuf,
        /// Control plane endpoint; deltas are only printed when absent
        #[arg(long)]
        console_url: Option<String>,
        /// Record but do not forward
        #[arg(long)]
        no_forward: bool,
        /// Regression test mode (allows CREATE TABLESPACE)
        #[arg(long)]
        regress: bool,
        /// Protected administrative role
        #[arg(long, default_value = DEFAULT_PRIVILEGED_ROLE)]
        privileged_role: String,
        /// Environment variable holding the bearer token
        #[arg(long, default_value = relay_forward::TOKEN_ENV_VAR)]
        token_env: String,
        /// Stop at the first failed transaction and exit non-zero
        #[arg(long)]
        fail_fast: bool,
    },
    /// Print an example script
    Example,
}

const EXAMPLE_SCRIPT: &str = r#"{
  "user": "alice",
  "roles": [{ "name": "bob", "password": "secret" }],
  "databases": [{ "name": "legacy", "owner": "bob" }],
  "transactions": [
    { "steps": [
        { "event": { "kind": "rename_database", "old_name": "legacy", "new_name": "archive" } },
        "savepoint",
        { "event": { "kind": "create_role", "name": "tmp", "password": "x" } },
        "rollback",
        "savepoint",
        { "event": { "kind": "alter_role_password", "name": "bob", "password": "rotated" } },
        "release"
    ] },
    { "steps": [
        { "event": { "kind": "create_database", "name": "scratch" } },
        { "event": { "kind": "drop_database", "name": "scratch" } }
    ], "abort": true }
  ]
}"#;

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn print_report(index: usize, report: &TxReport) {
    println!("\n{} {}", "▸".bright_yellow(), format!("transaction {}", index + 1).bold());
    match report {
        TxReport::Committed { outcome, message } => {
            match message {
                Ok(Some(message)) => match message.to_json() {
                    Ok(json) => println!("  {} {}", "delta".bright_white(), json),
                    Err(err) => println!("  {} {}", "delta".bright_white(), err.to_string().bright_red()),
                },
                Ok(None) => println!("  {} {}", "delta".bright_white(), "(empty)".dimmed()),
                Err(err) => println!(
                    "  {} cannot be rendered: {}",
                    "delta".bright_white(),
                    err.to_string().bright_red()
                ),
            }
            match outcome {
                DeliveryOutcome::Delivered { attempts } => println!(
                    "  {} delivered after {} attempt(s)",
                    "✓".bright_green().bold(),
                    attempts
                ),
                DeliveryOutcome::Skipped(reason) => {
                    println!("  {} committed, not forwarded: {}", "✓".bright_green().bold(), reason)
                }
            }
        }
        TxReport::Aborted => println!("  {} rolled back", "↺".bright_yellow()),
        TxReport::Failed { step, error } => {
            let at = step.map(|s| format!(" at step {}", s + 1)).unwrap_or_default();
            println!("  {} failed{}: {}", "✗".bright_red().bold(), at, error.to_string().bright_red());
        }
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_replay(
    path: PathBuf,
    console_url: Option<String>,
    no_forward: bool,
    regress: bool,
    privileged_role: String,
    token_env: String,
    fail_fast: bool,
) -> Result<usize, String> {
    let text = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let script = Script::parse(&text).map_err(|e| format!("invalid script: {}", e))?;
    let catalog = script
        .seed_catalog()
        .map_err(|e| format!("invalid seed: {}", e))?;

    let mut settings = RelaySettingsBuilder::new()
        .forward_ddl(!no_forward)
        .regress_test_mode(regress)
        .privileged_role_name(privileged_role)
        .token_env_var(token_env);
    if let Some(url) = console_url {
        settings = settings.console_url(url);
    }
    let settings = settings.build();

    let client = DeliveryClient::from_env(&settings.token_env_var, RetryPolicy::default());
    let coordinator = Coordinator::new(SharedSettings::new(settings), Arc::new(client));
    let mut replayer = Replayer::new(coordinator, catalog);

    header(&format!("Replaying {}", path.display()));
    let mut failures = 0;
    for (index, transaction) in script.transactions.iter().enumerate() {
        let report = replayer.run(transaction);
        print_report(index, &report);
        if let TxReport::Failed { .. } = report {
            failures += 1;
            if fail_fast {
                break;
            }
        }
    }
    Ok(failures)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("DDL_RELAY_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay {
            script,
            console_url,
            no_forward,
            regress,
            privileged_role,
            token_env,
            fail_fast,
        } => {
            match run_replay(
                script,
                console_url,
                no_forward,
                regress,
                privileged_role,
                token_env,
                fail_fast,
            ) {
                Ok(0) => {}
                Ok(failures) => {
                    println!(
                        "\n  {} {} transaction(s) failed",
                        "✗".bright_red().bold(),
                        failures
                    );
                    if fail_fast {
                        std::process::exit(1);
                    }
                }
                Err(message) => {
                    eprintln!("{} {}", "error:".bright_red().bold(), message);
                    std::process::exit(2);
                }
            }
        }
        Commands::Example => println!("{}", EXAMPLE_SCRIPT),
    }
}
