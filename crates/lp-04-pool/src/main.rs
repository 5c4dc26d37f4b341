//! # Ledger Pool Client
//!
//! Opens a pool from a genesis file, syncs the pool ledger and optionally
//! submits one request.
//!
//! ```text
//! ledger-pool <genesis-file> [request-json] [node1,node2,...]
//! ledger-pool <genesis-file> --frames
//! ```
//!
//! With `--frames`, each stdin line is a command frame
//! `{"event_name","correlation_id","timeout","nodes"}` and each answer is
//! printed as one JSON line. The pool stops on `CLOSE` or end of input.
//!
//! Configuration comes from `LP_*` environment variables, logging from
//! `LP_LOG_LEVEL` / `LP_JSON_LOGS`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lp_02_networker::TcpConnector;
use lp_04_pool::{CommandFrame, PoolConfig, PoolHandle, PoolResponse};
use pool_telemetry::{init_logging, TelemetryConfig};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging(&TelemetryConfig::from_env()).context("failed to initialize logging")?;

    let mut args = std::env::args().skip(1);
    let Some(genesis) = args.next() else {
        bail!("usage: ledger-pool <genesis-file> [request-json] [node1,node2,...]");
    };
    let request = args.next();
    let nodes = args
        .next()
        .map(|list| list.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>());

    let config = PoolConfig::from_env().context("invalid pool configuration")?;
    info!("===========================================");
    info!("  Ledger Pool Client");
    info!("===========================================");
    info!(genesis = %genesis, ?config, "Opening pool");

    let connector = Arc::new(TcpConnector::default());
    let (pool, task) = PoolHandle::open_genesis_file(&genesis, config, connector)
        .with_context(|| format!("failed to open pool from {genesis}"))?;

    if request.as_deref() == Some("--frames") {
        serve_frames(&pool).await?;
        task.await.context("pool task panicked")?;
        info!("Pool closed");
        return Ok(());
    }

    let synced = pool.check_cache().await.context("pool ledger sync failed")?;
    info!(ledger = %synced, "Pool ledger synced");

    if let Some(request) = request {
        let reply = pool
            .send_request_with(request, None, nodes)
            .await
            .context("request failed")?;
        println!("{reply}");
    }

    pool.close().await.context("close failed")?;
    task.await.context("pool task panicked")?;
    info!("Pool closed");
    Ok(())
}

async fn serve_frames(pool: &PoolHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let frame: CommandFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Undecodable command frame skipped");
                continue;
            }
        };
        let closing = frame.event_name == "CLOSE";
        let PoolResponse { correlation_id, result } = pool.submit_frame(frame).await;
        let answer = match result {
            Ok(body) => json!({"correlation_id": correlation_id, "result": body}),
            Err(e) => json!({"correlation_id": correlation_id, "error": e.to_string()}),
        };
        println!("{answer}");
        if closing {
            return Ok(());
        }
    }
    pool.close().await.context("close failed")?;
    Ok(())
}
