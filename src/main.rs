mod aggregator;
mod app;
mod cli;
mod config;
mod export;
mod generator;
mod paths;
mod pricing;
mod prompt;
mod provider;
mod render;
mod request;

use aggregator::GenerationResult;
use anyhow::Context;
use clap::Parser;
use generator::Generator;
use pricing::PricingTable;
use render::{RenderMode, Renderer};
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the draft; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    // An explicit --config must exist; the default location is optional.
    let cfg = match &args.config {
        Some(path) => Some(config::Config::load(path)?),
        None => config::Config::load_optional(paths::config_path()?)?,
    };
    tracing::debug!(?cfg, "resolved config");

    let overrides = cfg.as_ref().map(|c| c.pricing.clone()).unwrap_or_default();
    let pricing = PricingTable::with_overrides(&overrides);

    if let Some(cli::Command::Pricing) = args.cmd {
        return app::cmd_pricing(&pricing, &mut std::io::stdout());
    }

    let req = app::load_request(&args, cfg.as_ref())?;

    let model = args
        .model
        .clone()
        .or_else(|| cfg.as_ref().and_then(|c| c.model.clone()))
        .unwrap_or_else(|| app::DEFAULT_MODEL.to_string());

    let provider_name = args
        .provider
        .clone()
        .or_else(|| cfg.as_ref().and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| app::DEFAULT_PROVIDER.to_string());

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let provider = app::build_provider(&http, cfg.as_ref(), &provider_name, &model)?;
    let model_pricing = pricing.lookup(provider.model());
    let generator = Generator::new(provider, model_pricing);

    let mode = if args.progress {
        RenderMode::Progress
    } else {
        RenderMode::Text
    };
    let mut renderer = Renderer::new(mode, std::io::stdout(), std::io::stderr());

    let result = if args.no_stream {
        let started = Instant::now();
        let result = generator.generate(req).await;
        renderer.done(&result, started.elapsed())?;
        result
    } else {
        let session = generator.stream(req).await;
        renderer
            .drive(session)
            .await?
            .context("generation ended without a result")?
    };

    match result {
        GenerationResult::Success { text, metadata } => {
            if let Some(path) = &args.output {
                export::save_draft(path, &text, &metadata)?;
            }
            Ok(())
        }
        GenerationResult::Error { message, .. } => {
            anyhow::bail!("generation failed: {message}")
        }
    }
}
