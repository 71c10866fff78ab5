use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streams a drafted defense from an LLM as it is generated.
#[derive(Debug, Parser)]
#[command(name = "draft-stream")]
#[command(version)]
#[command(about = "Draft a legal defense with live streaming output", long_about = None)]
pub struct Args {
    /// Petition facts as JSON (case_type, confidence, facts, ...)
    #[arg(long = "facts", value_name = "FILE")]
    pub facts: Option<PathBuf>,

    /// Pre-assembled retrieval context (plain text)
    #[arg(long = "context", value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider: "anthropic" or "stub" (default: config/provider or "anthropic")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Sampling temperature (clamped to 0.3..=0.9)
    #[arg(long = "temperature")]
    pub temperature: Option<f64>,

    /// Top-k sampling (clamped to 20..=60)
    #[arg(long = "top-k")]
    pub top_k: Option<u32>,

    /// Maximum output tokens
    #[arg(long = "max-tokens")]
    pub max_tokens: Option<u32>,

    /// Wait for the whole response instead of streaming
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Show a progress bar and print the text once finished
    #[arg(long = "progress")]
    pub progress: bool,

    /// Save the finished draft (.json for text + metadata, otherwise plain text)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the per-model pricing table
    Pricing,
}
