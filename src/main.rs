//! # CGI Reactor - Entry Point
//! src/main.rs
//!
//! `cgi_reactor <BIND_ADDRESS> <PORT> [opciones]`
//!
//! SIGINT/SIGTERM levantan la bandera de apagado: el reactor cierra las
//! conexiones, cancela los CGI en curso y espera a los workers.

use anyhow::{Context, Result};
use cgi_reactor::config::Config;
use cgi_reactor::logger::init_logger;
use cgi_reactor::server::Server;
use cgi_reactor::storage::{JsonRecordStore, MemoryRecordStore, RecordStore};
use clap::Parser;
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::Arc;

fn main() {
    if let Err(e) = run() {
        error!("Fatal: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::parse();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    init_logger(&config).context("failed to initialize logger")?;
    config.print_summary();

    let store: Arc<dyn RecordStore> = match &config.credentials {
        Some(path) => {
            let store = JsonRecordStore::load(path)
                .with_context(|| format!("failed to load credentials from {}", path.display()))?;
            Arc::new(store)
        }
        None => {
            warn!("No credentials file: every login will be rejected");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let mut server = Server::bind(config, store)?;

    let handle = server.shutdown_handle();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, handle.flag())
            .with_context(|| format!("failed to register handler for signal {}", signal))?;
    }

    server.run()?;
    info!("Bye");
    Ok(())
}
