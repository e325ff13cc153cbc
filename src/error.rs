//! # Errores del Servidor
//! src/error.rs
//!
//! Dos familias:
//!
//! - `HandlerError`: fallos de aplicación. El worker los convierte en una
//!   respuesta HTTP bien formada; el cliente siempre recibe algo.
//! - `ServerError`: fallos del proceso (bind, epoll, configuración). Los de
//!   un socket individual no llegan aquí: se loguean y se cierra la conexión.

use crate::http::{ParseError, Response, StatusCode};
use std::io;

/// Fallo al atender un request
#[derive(Debug)]
pub enum HandlerError {
    /// Request line o headers malformados → 400
    Parse(ParseError),

    /// Recurso estático inexistente → 404
    NotFound(String),

    /// Path fuera del root o credenciales inválidas → 403
    Forbidden(String),

    /// Método no admitido en esa ruta → 405
    MethodNotAllowed(String),

    /// Fallo de spawn/exec/pipes del CGI → 500
    Execution(String),

    /// Archivo ilegible, agotamiento de descriptores o procesos → 500
    Resource(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Parse(_) => StatusCode::BadRequest,
            HandlerError::NotFound(_) => StatusCode::NotFound,
            HandlerError::Forbidden(_) => StatusCode::Forbidden,
            HandlerError::MethodNotAllowed(_) => StatusCode::MethodNotAllowed,
            HandlerError::Execution(_) | HandlerError::Resource(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    /// Respuesta de error con el motivo en el body
    pub fn into_response(self) -> Response {
        Response::error(self.status(), &self.to_string())
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Parse(e) => write!(f, "Invalid: {}", e),
            HandlerError::NotFound(what) => write!(f, "Not found: {}", what),
            HandlerError::Forbidden(what) => write!(f, "Forbidden: {}", what),
            HandlerError::MethodNotAllowed(m) => write!(f, "Method not allowed: {}", m),
            HandlerError::Execution(msg) => write!(f, "CGI execution failed: {}", msg),
            HandlerError::Resource(msg) => write!(f, "Resource error: {}", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<ParseError> for HandlerError {
    fn from(err: ParseError) -> Self {
        HandlerError::Parse(err)
    }
}

/// Fallo a nivel de proceso
#[derive(Debug)]
pub enum ServerError {
    Io(io::Error),

    /// No se pudo hacer bind del socket de escucha (no se reintenta)
    Bind(String, io::Error),

    /// epoll falló con algo distinto de EINTR: el loop termina
    Poller(io::Error),

    Config(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
            ServerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ServerError::Poller(e) => write!(f, "Readiness multiplexer failure: {}", e),
            ServerError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(e) | ServerError::Bind(_, e) | ServerError::Poller(e) => Some(e),
            ServerError::Config(_) => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> ServerError {
        ServerError::Io(err)
    }
}
