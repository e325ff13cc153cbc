//! # Logging
//! src/logger.rs
//!
//! Inicializa el backend de `log`: terminal (stderr) o archivo en modo append.

use crate::config::Config;

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode, WriteLogger};

pub fn init_logger(cfg: &Config) -> io::Result<()> {
    match &cfg.log_file {
        Some(path) => init_file_logger(cfg.log_level, path),
        None => init_term_logger(cfg.log_level),
    }
}

fn prepare_logger_config() -> simplelog::Config {
    let mut builder = simplelog::ConfigBuilder::new();
    builder.set_time_format_rfc3339().set_thread_level(LevelFilter::Debug);
    // Si no se puede leer el offset local queda UTC
    match builder.set_time_offset_to_local() {
        Ok(builder) | Err(builder) => builder.build(),
    }
}

fn init_term_logger(level: LevelFilter) -> io::Result<()> {
    TermLogger::init(
        level,
        prepare_logger_config(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .map_err(io::Error::other)
}

fn init_file_logger(level: LevelFilter, filename: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(filename)?;
    WriteLogger::init(level, prepare_logger_config(), file).map_err(io::Error::other)
}
