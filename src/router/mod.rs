//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Decide qué operación atiende un request y la ejecuta dentro del worker.
//!
//! ```text
//! bytes enmarcados → Router::handle → parse → handler → Response → bytes
//! ```
//!
//! - URLs bajo el prefijo CGI (por defecto `/cgi-bin/`) → `Operation::Cgi`
//! - La ruta de login (por defecto `/login`) → `Operation::Login`
//! - Todo lo demás → `Operation::Static`
//!
//! El reactor elige la operación mirando solo la request line (sin parsear
//! headers) para saber si debe crear un token de cancelación CGI.

use crate::config::Config;
use crate::error::HandlerError;
use crate::handlers::login;
use crate::handlers::{CgiCancel, CgiExecutor, StaticResource};
use crate::http::{Request, Response};
use crate::storage::RecordStore;
use log::debug;
use std::sync::Arc;

/// Valor del header `Server`
pub const SERVER_NAME: &str = "cgi_reactor/0.1";

/// Operación de una tarea
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Static,
    Cgi,
    Login,
}

/// Router compartido (solo lectura) por todos los workers
pub struct Router {
    resources: StaticResource,
    cgi: CgiExecutor,
    store: Arc<dyn RecordStore>,
    cgi_prefix: String,
    login_path: String,
}

impl Router {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>) -> Self {
        Self {
            resources: StaticResource::new(&config.root),
            cgi: CgiExecutor::new(&config.root),
            store,
            cgi_prefix: config.cgi_prefix.clone(),
            login_path: config.login_path.clone(),
        }
    }

    /// Clasifica un path (sin query)
    pub fn classify(&self, path: &str) -> Operation {
        if path == self.login_path {
            Operation::Login
        } else if path.starts_with(&self.cgi_prefix) {
            Operation::Cgi
        } else {
            Operation::Static
        }
    }

    /// Clasifica un request enmarcado mirando solo su request line.
    /// Si la línea no se entiende, `Static`: el parse del worker dará 400.
    pub fn operation_for(&self, raw: &[u8]) -> Operation {
        let line_end = raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(raw.len());
        let line = String::from_utf8_lossy(&raw[..line_end]);
        let target = line.split_whitespace().nth(1).unwrap_or("");
        let path = target.split('?').next().unwrap_or("");
        self.classify(path)
    }

    /// Parsea y atiende un request. Devuelve los bytes de la respuesta y si la
    /// conexión debe seguir abierta.
    pub fn handle(&self, operation: Operation, raw: &[u8], cancel: Option<&CgiCancel>) -> (Vec<u8>, bool) {
        let request = match Request::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                debug!("Parse error: {}", e);
                let response = HandlerError::from(e).into_response();
                return (finish_response(response, "HTTP/1.1", false), false);
            }
        };

        debug!("{} {} ({:?})", request.method(), request.url(), operation);

        let result = match operation {
            Operation::Static => self.resources.serve(request.path()),
            Operation::Cgi => match cancel {
                Some(cancel) => self.cgi.execute(&request, cancel),
                None => self.cgi.execute(&request, &CgiCancel::new()),
            },
            Operation::Login => login::login(&request, self.store.as_ref(), &self.resources),
        };

        let response = result.unwrap_or_else(HandlerError::into_response);
        let keep_alive = request.keep_alive();
        (finish_response(response, request.version(), keep_alive), keep_alive)
    }
}

/// Agrega los headers comunes y serializa
pub fn finish_response(response: Response, version: &str, keep_alive: bool) -> Vec<u8> {
    response
        .with_version(version)
        .with_header("Server", SERVER_NAME)
        .with_header("Connection", if keep_alive { "keep-alive" } else { "close" })
        .to_bytes()
}
