mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::Context;
use burrow_shortener::{BatchItem, BatchPolicy, ShortenerConfig, ShortenerService};
use burrow_storage::{Storage, StorageSettings};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    let settings = StorageSettings::builder()
        .database_dsn(config.database_dsn)
        .file_storage_path(config.file_storage_path)
        .max_connections(config.max_connections)
        .span(info_span!("storage"))
        .build();
    info!(
        backend = settings.backend().name(),
        log_format = %config.log_format,
        "opening storage"
    );

    let storage = Arc::new(
        Storage::open(settings)
            .await
            .context("failed to open storage")?,
    );
    let service = ShortenerService::new(
        Arc::clone(&storage),
        ShortenerConfig::builder()
            .code_length(usize::from(config.code_length))
            .build(),
    );

    let result = run(&service, config.command).await;
    let closed = storage.close().await;
    if let Err(err) = &closed {
        warn!(error = %err, "failed to close storage");
    }

    result?;
    closed.context("failed to close storage")
}

async fn run(service: &ShortenerService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten { url } => {
            let shortened = service.shorten(&url).await?;
            info!(created = shortened.created, "shortened url");
            println!("{}", shortened.code);
        }
        Command::Batch {
            require_atomic,
            urls,
        } => {
            let policy = if require_atomic {
                BatchPolicy::RequireAtomic
            } else {
                BatchPolicy::AllowBestEffort
            };
            let items = urls
                .into_iter()
                .enumerate()
                .map(|(i, url)| BatchItem::new((i + 1).to_string(), url))
                .collect();

            let outcome = service.shorten_batch(items, policy).await?;
            info!(
                atomic = outcome.atomicity.is_atomic(),
                size = outcome.entries.len(),
                "batch committed"
            );
            for entry in outcome.entries {
                println!("{}\t{}", entry.correlation_id, entry.code);
            }
        }
        Command::Resolve { code } => {
            println!("{}", service.resolve(&code).await?);
        }
        Command::Lookup { url } => {
            println!("{}", service.lookup(&url).await?);
        }
        Command::Ping => {
            service.ping().await.context("storage is not healthy")?;
            println!("ok");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
