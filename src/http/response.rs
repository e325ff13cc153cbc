//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas y serializarlas a bytes. El reactor solo ve
//! los bytes; nunca vuelve a mirar la estructura.
//!
//! ## Formato de una respuesta
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 13\r\n
//! Content-Type: text/html\r\n
//! \r\n
//! <p>hola</p>\r\n
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use cgi_reactor::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("Hello");
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.ends_with(b"\r\n\r\nHello"));
//! ```

use super::request::{set_content_length, write_headers, Headers};
use super::StatusCode;

/// Representa una respuesta HTTP completa
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Versión de la status line ("HTTP/1.1" por defecto)
    version: String,

    status: StatusCode,

    /// Headers en orden del mapa; claves únicas
    headers: Headers,

    body: Vec<u8>,
}

impl Response {
    /// Crea una respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Agrega un header (si ya existe, se sobrescribe)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Versión mutable de `with_header`
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Establece el cuerpo desde un string
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el cuerpo desde bytes (archivos binarios, salida de CGI)
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        set_content_length(&mut self.headers, self.body.len());
        self
    }

    /// Respuesta de error con mensaje JSON: `{"error": "mensaje"}`
    ///
    /// # Ejemplo
    /// ```
    /// use cgi_reactor::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, "File not found: /a.txt");
    /// assert_eq!(response.status(), StatusCode::NotFound);
    /// ```
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(&body)
    }

    /// Convierte la respuesta a bytes listos para el socket:
    ///
    /// - Status line: `version código razón\r\n`
    /// - Headers en orden del mapa
    /// - Línea vacía
    /// - Body
    ///
    /// `Content-Length` siempre se recalcula desde el body real, pisando
    /// cualquier valor puesto a mano.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut headers = self.headers.clone();
        set_content_length(&mut headers, self.body.len());

        let mut result = format!("{} {}\r\n", self.version, self.status).into_bytes();
        write_headers(&mut result, &headers);
        result.extend_from_slice(&self.body);
        result
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        super::request::header_value(&self.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
