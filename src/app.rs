use crate::cli::Args;
use crate::config::Config;
use crate::pricing::PricingTable;
use crate::provider::{self, Provider};
use crate::request::{CaseFacts, GenerationRequest, SamplingParams};
use anyhow::Context;
use std::io::Write;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_PROVIDER: &str = "anthropic";

pub fn cmd_pricing(table: &PricingTable, out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(out, "{:<24} {:>12} {:>12}", "model", "input/MTok", "output/MTok")?;
    for (model, p) in table.iter() {
        writeln!(
            out,
            "{:<24} {:>12} {:>12}",
            model,
            format!("${:.2}", p.input_per_mtok),
            format!("${:.2}", p.output_per_mtok)
        )?;
    }
    Ok(())
}

/// CLI flag > config file > built-in default, then clamped.
pub fn sampling(args: &Args, cfg: Option<&Config>) -> SamplingParams {
    let defaults = SamplingParams::default();
    let section = cfg.map(|c| &c.sampling);
    SamplingParams {
        temperature: args
            .temperature
            .or_else(|| section.and_then(|s| s.temperature))
            .unwrap_or(defaults.temperature),
        top_k: args
            .top_k
            .or_else(|| section.and_then(|s| s.top_k))
            .unwrap_or(defaults.top_k),
        max_tokens: args
            .max_tokens
            .or_else(|| section.and_then(|s| s.max_tokens))
            .unwrap_or(defaults.max_tokens),
    }
}

pub fn load_request(args: &Args, cfg: Option<&Config>) -> anyhow::Result<GenerationRequest> {
    let facts = match &args.facts {
        Some(path) => CaseFacts::load(path)?,
        None => anyhow::bail!("No petition facts provided. Try: draft-stream --facts facts.json"),
    };
    let context = match &args.context {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read context: {}", path.display()))?,
        None => String::new(),
    };
    Ok(GenerationRequest::new(facts, context, sampling(args, cfg)))
}

pub fn build_provider(
    http: &reqwest::Client,
    cfg: Option<&Config>,
    provider_name: &str,
    model: &str,
) -> anyhow::Result<Box<dyn Provider + Send + Sync>> {
    match provider_name {
        "anthropic" => {
            #[cfg(feature = "anthropic")]
            {
                let section = cfg.map(|c| &c.anthropic);
                let api_key = std::env::var("ANTHROPIC_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .or_else(|| section.and_then(|s| s.api_key.clone()))
                    .context(
                        "No API key found. Set ANTHROPIC_API_KEY or config.toml anthropic.api_key",
                    )?;

                let mut config = provider::anthropic::AnthropicConfig::new(api_key, model);
                if let Some(url) = section.and_then(|s| s.base_url.clone()) {
                    config.base_url = url;
                }
                if let Some(secs) = section.and_then(|s| s.timeout_secs) {
                    config.timeout = std::time::Duration::from_secs(secs);
                }

                let p = provider::anthropic::AnthropicProvider::new(http.clone(), config)?;
                Ok(Box::new(p))
            }
            #[cfg(not(feature = "anthropic"))]
            {
                let _ = (http, cfg, model);
                anyhow::bail!("anthropic provider is not enabled in this build")
            }
        }
        "stub" => {
            let section = cfg.map(|c| &c.stub);
            let mut p = provider::stub::StubProvider::new();
            if let Some(ms) = section.and_then(|s| s.delay_ms) {
                p = p.with_delay(std::time::Duration::from_millis(ms));
            }
            if let Some(n) = section.and_then(|s| s.fail_after) {
                let message = section
                    .and_then(|s| s.fail_message.clone())
                    .unwrap_or_else(|| "simulated service failure".to_string());
                p = p.failing_after(n, message);
            }
            Ok(Box::new(p))
        }
        other => anyhow::bail!("unknown provider: {other}"),
    }
}
