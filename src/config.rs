//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración completa vía argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./cgi_reactor 0.0.0.0 8080 \
//!   --root ./html \
//!   --workers 8 \
//!   --queue-capacity 2048 \
//!   --idle-timeout-ms 10000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_ROOT=/srv/www WORKERS=8 ./cgi_reactor 127.0.0.1 8080
//! ```

use clap::Parser;
use log::{info, LevelFilter};
use std::path::PathBuf;

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "cgi_reactor")]
#[command(about = "Servidor HTTP/1.x con reactor epoll, pool de workers y CGI")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Host/IP en el que escucha
    #[arg(value_name = "BIND_ADDRESS")]
    pub host: String,

    /// Puerto en el que escucha el servidor
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Directorio raíz del contenido estático ("/" sirve index.html)
    #[arg(long, default_value = "./html", env = "HTTP_ROOT")]
    pub root: PathBuf,

    /// Prefijo de URL atendido por programas CGI
    #[arg(long = "cgi-prefix", default_value = "/cgi-bin/", env = "CGI_PREFIX")]
    pub cgi_prefix: String,

    /// Ruta del login respaldado por el almacén de credenciales
    #[arg(long = "login-path", default_value = "/login", env = "LOGIN_PATH")]
    pub login_path: String,

    /// Archivo JSON con credenciales (sin él, todo login falla)
    #[arg(long, env = "CREDENTIALS_FILE")]
    pub credentials: Option<PathBuf>,

    // === Workers ===
    /// Número de threads del pool
    #[arg(long, default_value = "4", env = "WORKERS")]
    pub workers: usize,

    /// Tareas encoladas máximas antes de responder 503
    #[arg(long = "queue-capacity", default_value = "1024", env = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    // === Reactor ===
    /// Eventos máximos por llamada a epoll_wait
    #[arg(long = "max-events", default_value = "1024", env = "MAX_EVENTS")]
    pub max_events: usize,

    /// Tamaño máximo de un request bufferizado (413 si se supera)
    #[arg(long = "max-request-bytes", default_value = "1048576", env = "MAX_REQUEST_BYTES")]
    pub max_request_bytes: usize,

    /// Cierre de conexiones ociosas en milisegundos (0 = nunca)
    #[arg(long = "idle-timeout-ms", default_value = "30000", env = "IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    // === Logging ===
    /// Nivel de log (error, warn, info, debug, trace, off)
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: LevelFilter,

    /// Archivo de log; sin él se escribe en stderr
    #[arg(long = "log-file", env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use cgi_reactor::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be >= 1".to_string());
        }
        if self.max_events == 0 {
            return Err("Max events must be >= 1".to_string());
        }
        if self.max_request_bytes == 0 {
            return Err("Max request bytes must be >= 1".to_string());
        }
        if !self.cgi_prefix.starts_with('/') {
            return Err("CGI prefix must start with '/'".to_string());
        }
        if !self.login_path.starts_with('/') {
            return Err("Login path must start with '/'".to_string());
        }
        Ok(())
    }

    /// Loguea un resumen de la configuración efectiva
    pub fn print_summary(&self) {
        info!("Network:   {}", self.address());
        info!("Root:      {}", self.root.display());
        info!("CGI:       {}*", self.cgi_prefix);
        info!(
            "Login:     {} (credentials: {})",
            self.login_path,
            self.credentials
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        info!(
            "Workers:   {} (queue capacity {})",
            self.workers, self.queue_capacity
        );
        info!(
            "Reactor:   max {} events, max request {} bytes",
            self.max_events, self.max_request_bytes
        );
        if self.idle_timeout_ms > 0 {
            info!("Idle:      {} ms", self.idle_timeout_ms);
        } else {
            info!("Idle:      disabled");
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            root: PathBuf::from("./html"),
            cgi_prefix: "/cgi-bin/".to_string(),
            login_path: "/login".to_string(),
            credentials: None,
            workers: 4,
            queue_capacity: 1024,
            max_events: 1024,
            max_request_bytes: 1024 * 1024,
            idle_timeout_ms: 30_000,
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }
}
