//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Tabla cerrada de códigos que el servidor produce. Cualquier otro código
//! numérico se representa con `StatusCode::Unknown` y su razón es
//! `"Unknown"`, de modo que la status line sigue siendo válida.
//!
//! - **2xx**: Éxito (200, 204)
//! - **4xx**: Error del cliente (400, 403, 404, 405, 413)
//! - **5xx**: Error del servidor (500, 501, 503)

/// Códigos de estado HTTP que conoce el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,

    /// 204 No Content
    NoContent,

    /// 400 Bad Request - Request line o headers malformados
    BadRequest,

    /// 403 Forbidden - Path fuera del root o login rechazado
    Forbidden,

    /// 404 Not Found - Recurso estático inexistente
    NotFound,

    /// 405 Method Not Allowed
    MethodNotAllowed,

    /// 413 Payload Too Large - Request mayor que el límite configurado
    PayloadTooLarge,

    /// 500 Internal Server Error - Fallo de CGI o de lectura
    InternalServerError,

    /// 501 Not Implemented
    NotImplemented,

    /// 503 Service Unavailable - Cola de workers llena
    ServiceUnavailable,

    /// Código fuera de la tabla
    Unknown(u16),
}

impl StatusCode {
    /// Mapea un código numérico a la tabla; lo desconocido queda en `Unknown`.
    ///
    /// # Ejemplo
    /// ```
    /// use cgi_reactor::http::StatusCode;
    /// assert_eq!(StatusCode::from_u16(404), StatusCode::NotFound);
    /// assert_eq!(StatusCode::from_u16(418).reason_phrase(), "Unknown");
    /// ```
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => StatusCode::Ok,
            204 => StatusCode::NoContent,
            400 => StatusCode::BadRequest,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            413 => StatusCode::PayloadTooLarge,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            503 => StatusCode::ServiceUnavailable,
            other => StatusCode::Unknown(other),
        }
    }

    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use cgi_reactor::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::Unknown(code) => *code,
        }
    }

    /// Texto de razón (reason phrase) asociado al código
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::Unknown(_) => "Unknown",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
