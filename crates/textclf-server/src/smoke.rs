//! End-to-end sanity check against a server or the model itself

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use textclf_classifiers::InferenceService;

use crate::cli::SmokeArgs;
use crate::config::ServerConfig;

pub const DEFAULT_SMOKE_TARGET: &str = "http://127.0.0.1:8000";

pub const SAMPLE_TEXT: &str = "Finally works ✅";

pub async fn run(args: &SmokeArgs, config: &ServerConfig) -> Result<()> {
    if args.local {
        run_local(&args.text, config).await
    } else {
        run_remote(&args.target, &args.text).await
    }
}

/// Hit `/healthz` and `/predict` on a running server
async fn run_remote(target: &str, text: &str) -> Result<()> {
    let target = target.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .get(format!("{}/healthz", target))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", target))?;
    let status = response.status();
    let body: Value = response.json().await?;
    println!("GET  /healthz  {} {}", status.as_u16(), body);
    if !status.is_success() {
        bail!("health check failed with {}", status);
    }

    let response = client
        .post(format!("{}/predict", target))
        .json(&json!({ "text": text }))
        .send()
        .await?;
    let status = response.status();
    let body: Value = response.json().await?;
    println!("POST /predict  {} {}", status.as_u16(), body);
    if !status.is_success() {
        bail!("prediction failed with {}", status);
    }

    Ok(())
}

/// Load the model in-process and classify once
async fn run_local(text: &str, config: &ServerConfig) -> Result<()> {
    config.validate()?;
    let spec = config.model_spec();

    if let Ok(exe) = std::env::current_exe() {
        println!("binary: {}", exe.display());
    }
    println!("textclf: {}", env!("CARGO_PKG_VERSION"));
    println!("model: {}", spec.id());
    println!("device: {}", spec.device);

    let service = InferenceService::new(Arc::new(config.model_loader()), config.service_limits());
    service.initialize(&spec).await?;
    if let Some(labels) = service.labels() {
        println!("labels: {:?}", labels);
    }

    let result = service.classify_text(text).await?;
    println!(
        "{}",
        json!([{ "label": result.label, "score": result.score }])
    );
    Ok(())
}
