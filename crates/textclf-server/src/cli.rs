use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use textclf_classifiers::DeviceSpec;

use crate::smoke::{DEFAULT_SMOKE_TARGET, SAMPLE_TEXT};

#[derive(Parser, Debug)]
#[command(name = "textclf")]
#[command(
    author,
    version,
    about = "Serve a pretrained text-classification model over HTTP"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path (defaults apply when the file does not exist)
    #[arg(
        short,
        long,
        global = true,
        env = "TEXTCLF_CONFIG",
        default_value = "textclf.yaml"
    )]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the model and start the HTTP server
    Serve(ServeArgs),

    /// Check a running server, or the model itself with --local
    Smoke(SmokeArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listen address
    #[arg(short = 'l', long, env = "TEXTCLF_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "TEXTCLF_PORT")]
    pub port: Option<u16>,

    /// Accept connections while the model loads; /readyz reports 503 until it is ready
    #[arg(long)]
    pub background_load: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Model selection shared by every subcommand that loads a model
#[derive(Args, Debug, Default, Clone)]
pub struct ModelArgs {
    /// Hugging Face repository of the model to serve
    #[arg(short, long, env = "TEXTCLF_MODEL")]
    pub model: Option<String>,

    /// Revision (commit, tag or branch) of the model repository
    #[arg(long, env = "TEXTCLF_REVISION")]
    pub revision: Option<String>,

    /// Inference device: cpu, cuda[:N] or metal[:N]
    #[arg(long, env = "TEXTCLF_DEVICE")]
    pub device: Option<DeviceSpec>,
}

#[derive(Args, Debug)]
pub struct SmokeArgs {
    /// Base URL of the server to check
    #[arg(short, long, default_value = DEFAULT_SMOKE_TARGET)]
    pub target: String,

    /// Text sent to /predict
    #[arg(long, default_value = SAMPLE_TEXT)]
    pub text: String,

    /// Load the model in-process instead of calling a server
    #[arg(long)]
    pub local: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}
