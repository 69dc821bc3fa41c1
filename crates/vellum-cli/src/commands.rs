use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use vellum_crypto::ContentHasher;
use vellum_persistence::Persistence;
use vellum_repository::{CancellationToken, Repository, RepositoryOptions, SweepReport, Sweeper};
use vellum_server::{shutdown_signal, Metrics, VellumServer};
use vellum_store::FileSystem;

use crate::cli::{AddressArgs, Cli, Command, OutputFormat, ServeArgs, SweepArgs};
use crate::settings::Settings;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Address(args) => cmd_address(args, cli.format),
        Command::Serve(args) => {
            let settings = Settings::load(cli.config.as_deref())?.with_flags(&cli.store)?;
            cmd_serve(args, settings).await
        }
        Command::Sweep(args) => {
            let settings = Settings::load(cli.config.as_deref())?.with_flags(&cli.store)?;
            cmd_sweep(args, settings, cli.format).await
        }
    }
}

async fn open_repository(settings: &Settings) -> anyhow::Result<Repository> {
    let filesystem = FileSystem::from_config(&settings.filesystem)
        .await
        .context("opening blob store")?;
    let persistence = Persistence::from_config(&settings.persistence);
    persistence
        .prepare()
        .await
        .context("preparing metadata store")?;
    Ok(Repository::new(Arc::new(filesystem), Arc::new(persistence)).with_options(
        RepositoryOptions {
            verify_references: settings.verify_references,
        },
    ))
}

fn cmd_address(args: &AddressArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = std::fs::read(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let address = ContentHasher::new(args.encoding).address(&data);
    match format {
        OutputFormat::Text => println!("{}  {}", address.as_str().yellow(), args.path.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "path": args.path.display().to_string(),
                "address": address.as_str(),
                "size": data.len(),
            })
        ),
    }
    Ok(())
}

async fn cmd_serve(args: &ServeArgs, settings: Settings) -> anyhow::Result<()> {
    let mut config = settings.server.clone();
    if let Some(api) = &args.api {
        config = config.with_api(api)?;
    }
    let repository = Arc::new(open_repository(&settings).await?);
    println!(
        "{} vellum listening on {} (blobs: {}, metadata: {})",
        "✓".green().bold(),
        config.bind_addr.to_string().bold(),
        settings.filesystem.kind.to_string().cyan(),
        settings.persistence.kind.to_string().cyan(),
    );
    VellumServer::new(config, repository, Arc::new(Metrics::new()))
        .serve(shutdown_signal())
        .await?;
    Ok(())
}

async fn cmd_sweep(args: &SweepArgs, settings: Settings, format: OutputFormat) -> anyhow::Result<()> {
    let repository = open_repository(&settings).await?;
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });
    let report = Sweeper::new(&repository)
        .with_grace(chrono::Duration::seconds(args.grace_secs))
        .run(&cancel)
        .await;
    watcher.abort();
    let report = report?;
    print_report(&report, format)?;
    repository.close().await?;
    Ok(())
}

fn print_report(report: &SweepReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!(
                "{} Sweep: {} removed, {} kept of {} scanned ({} bytes freed)",
                "✓".green(),
                report.removed.to_string().bold(),
                report.kept,
                report.scanned,
                report.bytes_freed,
            );
            if report.errors > 0 {
                println!("  {} {} blobs could not be checked", "!".red().bold(), report.errors);
            }
        }
    }
    Ok(())
}
