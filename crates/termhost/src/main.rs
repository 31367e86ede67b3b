//! # Termhost
//!
//! Model Context Protocol server that hosts console sessions: commands,
//! programs and interactive shells.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Console creation (command, program, interactive terminal)
//! - Ordered input delivery with prompt detection
//! - Output delivery over request/response events or a direct socket
//! - Persistence of console records and transcripts across restarts
//!
//! ## Architecture
//!
//! This is Layer 3 - the server binary that ties together:
//! - termhost-core: Core types and configuration
//! - termhost-pty: Process supervision
//! - termhost-session: Console process lifecycle

use std::sync::Arc;

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use termhost::{EventQueue, TcpChannelRegistry, TermhostServer};
use termhost_core::ServerConfig;
use termhost_pty::PtySupervisor;
use termhost_session::{ConsoleProcessTable, FileStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|index| args.get(index + 1));

    let config = match config_path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => ServerConfig::default(),
    };
    config.validate()?;

    // Initialize logging. stdout carries the MCP transport.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!("Termhost v{} starting...", env!("CARGO_PKG_VERSION"));

    let events = Arc::new(EventQueue::default());
    let channels = Arc::new(TcpChannelRegistry::new(
        config.channel.bind_address.clone(),
        tokio::runtime::Handle::current(),
    ));
    let store: Option<Arc<dyn SessionStore>> = match &config.server.state_dir {
        Some(dir) => Some(Arc::new(FileStore::new(dir)?)),
        None => None,
    };

    let table = Arc::new(ConsoleProcessTable::new(
        &config,
        Arc::new(PtySupervisor::default()),
        channels,
        events.clone(),
        store,
    ));
    match table.restore() {
        Ok(0) => {}
        Ok(count) => tracing::info!("Restored {} console(s)", count),
        Err(e) => tracing::warn!("Failed to restore consoles: {}", e),
    }

    let server = TermhostServer::new(table, events, config.terminal.clone());

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("Termhost running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    tracing::info!("Termhost shutting down");

    Ok(())
}
