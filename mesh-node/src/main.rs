use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use mesh_common::{MeshError, NodeId};
use mesh_node::{
    cli::{secs, Args, Command},
    config::MeshConfig,
    runtime::{build_runtime, build_udp_transport, simulate, NodeRuntime},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log_name = args.id.clone().unwrap_or_else(|| "sim".to_string());

    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::never("logs", format!("consensus-{}.log", log_name));
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let consensus_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "consensus"
        }));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mesh_node=debug".into()),
        )
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "consensus"
        }));

    tracing_subscriber::registry()
        .with(consensus_layer)
        .with(stdout_layer)
        .init();

    let config = MeshConfig::load_from_file(&args.config)?;
    let settings = args.settings(config.settings);
    info!("config: {}", args.config.display());

    if args.command == Command::Simulate {
        let report = simulate(&config, settings).await?;
        for r in &report.reports {
            println!("{} final={:.6} completed={}/{}", r.node_id, r.final_value, r.completed_rounds(), r.rounds.len());
        }
        println!("mean={:.6} initial_mean={:.6}", report.final_mean(), report.initial_mean);
        return Ok(());
    }

    let id = args
        .node_id()
        .ok_or_else(|| MeshError::Config("--id is required for this mode".to_string()))?;
    let transport = Arc::new(build_udp_transport(&config, &id, args.max_frame)?);
    let node = build_runtime(&config, &id, transport, settings)?;
    if let Err(e) = node.start().await {
        error!("failed to start node {}: {}", id, e);
        return Err(e.into());
    }

    match args.command.clone() {
        Command::Listen => {
            info!("[{}] listening. Press Ctrl+C to stop.", id);
            tokio::signal::ctrl_c().await?;
        }
        Command::Consensus { value } => {
            let initial = value.unwrap_or_else(|| config.initial_value(&id));
            let report = node.run_consensus(initial).await;
            println!(
                "{} final={:.6} completed={} partial={}",
                id,
                report.final_value,
                report.completed_rounds(),
                report.partial_rounds()
            );
        }
        Command::Send { dst, message, wait } => {
            let timeout = wait.map(secs).unwrap_or(settings.exchange_timeout);
            let result = node.send_and_wait(&NodeId::from(dst), message.into_bytes(), timeout).await;
            println!(
                "msg_id={} sent={} ack={:?} reply={:?}",
                result.msg_id,
                result.sent,
                result.acknowledged,
                result.reply.as_deref().map(String::from_utf8_lossy)
            );
        }
        Command::Probe {
            dst,
            count,
            payload_size,
            wait,
        } => {
            let timeout = wait.map(secs).unwrap_or(settings.exchange_timeout);
            probe(&node, &NodeId::from(dst), count, payload_size, timeout).await;
        }
        Command::Simulate => {}
    }

    node.stop().await?;
    Ok(())
}

async fn probe(node: &NodeRuntime, dst: &NodeId, count: u32, payload_size: usize, timeout: Duration) {
    let mut ok = 0;
    let mut total_rtt = Duration::ZERO;
    for seq in 0..count {
        let mut payload = format!("PING {}", seq).into_bytes();
        payload.resize(payload_size.max(payload.len()), b'.');

        let result = node.send_and_wait(dst, payload, timeout).await;
        if result.replied() {
            ok += 1;
            total_rtt += result.elapsed;
            info!("seq={} rtt_ms={}", seq, result.elapsed.as_millis());
        } else {
            warn!("seq={} sent={} no reply", seq, result.sent);
        }
    }
    let avg = if ok > 0 { total_rtt.as_millis() / ok as u128 } else { 0 };
    println!("ok={}/{} avg_rtt_ms={}", ok, count, avg);
}

