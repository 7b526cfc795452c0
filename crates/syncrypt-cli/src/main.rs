mod commands;
mod logging;
mod progress;

use std::io;
use std::process;
use std::thread;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use crossbeam_channel::{Receiver, Sender};
use dotenv::dotenv;
use progress::CliReporter;
use syncrypt_core::{
    generate_keys, paths, reconcile, AppConfig, Ledger, PassReport, ProgressReporter, Scheduler,
    SealedBoxGateway, SilentReporter, SyncEngine, SyncOptions,
};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let mut config = match syncrypt_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", "Error loading configuration:".red(), err);
            process::exit(1);
        }
    };
    args.global.apply_to(&mut config);
    if let Some(Commands::Sync {
        interval,
        propagate_deletions,
        ..
    }) = &args.command
    {
        if let Some(interval) = interval {
            config.interval_ms = *interval;
        }
        config.propagate_deletions |= *propagate_deletions;
    }

    let guards = logging::init_logger(&config);

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, &config) {
        error!("{:#}", err);
        // exit() skips destructors; flush the log writers first.
        drop(guards);
        process::exit(1);
    }
}

fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Sync { daemon, .. } => run_sync(config, daemon),
        Commands::Decrypt => run_decrypt(config),
        Commands::Keygen => run_keygen(config),
        Commands::ReviewDeletions => run_review_deletions(config),
        Commands::ApplyDeletions => run_apply_deletions(config),
        Commands::PrintConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Cannot render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

fn open_ledger(config: &AppConfig) -> Result<Ledger> {
    Ledger::open(&config.ledger_path)
        .with_context(|| format!("Cannot open ledger {}", config.ledger_path.display()))
}

fn reporter(config: &AppConfig) -> Box<dyn ProgressReporter> {
    if config.quiet || config.very_quiet {
        Box::new(SilentReporter)
    } else {
        Box::new(CliReporter::new())
    }
}

fn run_sync(config: &AppConfig, daemon: bool) -> Result<()> {
    let ledger = open_ledger(config)?;
    let gateway = SealedBoxGateway::new();
    let options = SyncOptions::from_config(config)?;
    let reporter = reporter(config);

    {
        let engine = SyncEngine::new(&ledger, &gateway, options);
        if daemon {
            let (_keepalive, shutdown) = shutdown_channel()?;
            let scheduler = Scheduler::new(config.interval());
            info!(
                "Running every {:?}. Press Enter or Ctrl-C to stop.",
                scheduler.interval()
            );
            let passes = scheduler.run(&shutdown, || {
                engine
                    .run_pass(reporter.as_ref())
                    .map(|report| print_pass_summary(&report, config))
            })?;
            info!("Stopped after {} passes", passes);
        } else {
            let report = engine.run_pass(reporter.as_ref())?;
            print_pass_summary(&report, config);
        }
    }

    ledger.close().context("Cannot close ledger")?;
    Ok(())
}

fn run_decrypt(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let gateway = SealedBoxGateway::new();
    let options = SyncOptions::from_config(config)?;
    let reporter = reporter(config);

    let report = SyncEngine::new(&ledger, &gateway, options).decrypt_all(reporter.as_ref())?;
    if !config.quiet && !config.very_quiet {
        println!(
            "{} decrypted, {} skipped, {} failed",
            report.decrypted.to_string().green(),
            report.skipped,
            report.failed.to_string().red(),
        );
    }
    Ok(())
}

fn run_keygen(config: &AppConfig) -> Result<()> {
    let keys = config.key_ring();
    if keys.passphrase.is_empty() {
        warn!("No passphrase given, the private key will be protected by an empty passphrase");
    }
    paths::ensure_dir(&config.key_path)?;
    generate_keys(&SealedBoxGateway::new(), &keys)?;
    if !config.very_quiet {
        println!(
            "Wrote {} and {}",
            keys.public_key.display().to_string().cyan(),
            keys.private_key.display().to_string().cyan()
        );
    }
    Ok(())
}

fn run_review_deletions(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let pending = reconcile::review_deletions(&ledger)?;

    if pending.is_empty() {
        println!("No files pending deletion.");
        return Ok(());
    }

    println!("{} files pending deletion:", pending.len().to_string().yellow());
    for record in &pending {
        println!(
            "  {}  {}  {}",
            record.filename,
            record.content_hash.dimmed(),
            record.last_updated.dimmed()
        );
    }
    Ok(())
}

fn run_apply_deletions(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;
    let gateway = SealedBoxGateway::new();
    let options = SyncOptions::from_config(config)?;

    let report = SyncEngine::new(&ledger, &gateway, options).apply_deletions()?;
    if !config.very_quiet {
        println!(
            "{} rows removed, {} artifacts deleted, {} kept (hash mismatch), {} missing",
            report.removed_from_ledger,
            report.artifacts_deleted.to_string().green(),
            report.artifacts_kept.to_string().yellow(),
            report.artifacts_missing,
        );
    }
    Ok(())
}

fn print_pass_summary(report: &PassReport, config: &AppConfig) {
    if config.quiet || config.very_quiet {
        return;
    }
    println!(
        "Scan: {}, Sync: {}",
        format!("{:.2}s", report.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.sync_duration.as_secs_f64()).green(),
    );
    println!(
        "{} new, {} updated, {} unchanged, {} duplicates, {} failed",
        report.new.to_string().green(),
        report.updated.to_string().green(),
        report.unchanged,
        report.duplicates.to_string().yellow(),
        report.failed.to_string().red(),
    );
    if report.flagged_for_deletion > 0 || report.restored > 0 {
        println!(
            "{} pending deletion, {} restored",
            report.flagged_for_deletion.to_string().yellow(),
            report.restored
        );
    }
    if let Some(deletions) = &report.deletions {
        println!(
            "{} artifacts deleted, {} kept (hash mismatch), {} missing",
            deletions.artifacts_deleted.to_string().green(),
            deletions.artifacts_kept.to_string().yellow(),
            deletions.artifacts_missing,
        );
    }
}

/// Channel that receives a message on SIGINT, SIGTERM or Enter. The returned
/// sender keeps it connected while no shutdown source is armed.
fn shutdown_channel() -> Result<(Sender<()>, Receiver<()>)> {
    let (tx, rx) = crossbeam_channel::unbounded();

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Cannot install signal handlers")?;
        let signal_tx = tx.clone();
        thread::spawn(move || {
            for signal in signals.forever() {
                info!("Received signal {}, finishing the current pass", signal);
                if signal_tx.send(()).is_err() {
                    break;
                }
            }
        });
    }

    let stdin_tx = tx.clone();
    thread::spawn(move || {
        let mut line = String::new();
        // EOF (no terminal attached) is not a stop request.
        if let Ok(n) = io::stdin().read_line(&mut line) {
            if n > 0 {
                let _ = stdin_tx.send(());
            }
        }
    });

    Ok((tx, rx))
}
