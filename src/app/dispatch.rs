use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result, bail};
use guarded_relay::guardrail::{AirsScanner, Scanner, evaluate};
use guarded_relay::pipeline::{EventSink, PipelineOutcome, Request};
use guarded_relay::{Config, build_orchestrator, gateway};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { port, host } => serve(config, host, port).await,
        Commands::Ask { message } => ask(&config, message).await,
        Commands::Scan { text } => scan(&config, &text).await,
    }
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.gateway.port);
    let host = host.unwrap_or_else(|| config.gateway.host.clone());
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    if config.agent.enabled && config.agent.warm_on_startup {
        let warm = Arc::clone(&orchestrator);
        tokio::spawn(async move { gateway::warm_agent(&warm).await });
    }

    if port == 0 {
        info!("Starting guarded-relay gateway on {host} (random port)");
    } else {
        info!("Starting guarded-relay gateway on {host}:{port}");
    }
    gateway::run_gateway(&host, port, &config.gateway.root_path, orchestrator).await
}

/// Run one request, printing each event as a JSON line as it arrives.
async fn ask(config: &Config, message: String) -> Result<()> {
    let request = Request::new(message)?;
    let orchestrator = build_orchestrator(config)?;

    let (sink, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("unprintable event: {e}"),
            }
        }
    });

    let outcome = orchestrator.run(&request, &sink).await;
    drop(sink);
    printer.await.context("event printer task failed")?;

    match outcome {
        PipelineOutcome::Completed { .. } => Ok(()),
        PipelineOutcome::Failed(error) => Err(error.into()),
        PipelineOutcome::Cancelled => bail!("event output closed before the run finished"),
    }
}

async fn scan(config: &Config, text: &str) -> Result<()> {
    let scanner = AirsScanner::new(&config.guardrail)?;
    let verdict = scanner.scan(text).await?;
    let decision = evaluate(&verdict);

    let report = json!({
        "safe": decision.safe,
        "reason": decision.reason,
        "verdict": verdict,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
