//! CLI entry point for gmailmd.

use anyhow::{Context, Result};
use clap::Parser;
use gmailmd_core::{LinkConfig, LinkPipeline, MarkdownArchiveSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));

    // Logs go to stderr so `--json` output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => LinkConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LinkConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let pipeline = LinkPipeline::from_config(&config).context("failed to initialize pipeline")?;
    info!(
        inputs = args.inputs.len(),
        blocked_domains = config.blocked_domains.len(),
        excluded_texts = config.excluded_link_texts.len(),
        "gmailmd starting"
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight links");
            signal_token.cancel();
        }
    });

    let source = MarkdownArchiveSource::new(args.inputs.clone());
    let summary = pipeline
        .run_source(&source, &cancel)
        .await
        .context("link pipeline failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
        );
    } else if !args.quiet {
        println!("{summary}");
    }

    Ok(())
}
