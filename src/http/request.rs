//! # Parsing de Requests HTTP/1.x
//! src/http/request.rs
//!
//! Parser y framer de requests. No hace I/O: el reactor acumula bytes y
//! pregunta a `Request::frame_check` si ya hay un request completo; el worker
//! llama a `Request::parse` sobre los bytes enmarcados.
//!
//! ## Formato de un Request
//!
//! ```text
//! POST /cgi-bin/echo.sh?x=1 HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! Content-Length: 5\r\n
//! \r\n
//! hello
//! ```
//!
//! 1. **Request Line**: `METHOD URL VERSION`
//! 2. **Headers**: Pares `Name: Value` (uno por línea)
//! 3. **Empty Line**: `\r\n` que separa headers del body
//! 4. **Body**: exactamente `Content-Length` bytes, o vacío si no hay header

use std::collections::BTreeMap;

/// Mapa de headers: claves únicas con el case recibido, la última escritura gana.
pub type Headers = BTreeMap<String, String>;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Métodos HTTP soportados (enumeración cerrada)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// POST - Enviar datos a un recurso (el body va al stdin del CGI)
    POST,

    /// PUT - Reemplazar un recurso
    PUT,
}

impl Method {
    /// Parsea un método HTTP desde un string
    ///
    /// # Errores
    ///
    /// Retorna `ParseError::UnsupportedMethod` si el método no está en la tabla.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resultado del framer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Hay un request completo que ocupa los primeros `n` bytes del buffer
    Complete(usize),

    /// Faltan bytes
    Incomplete,
}

/// Progreso del framer sobre un buffer que solo crece. Evita volver a
/// escanear desde el inicio en cada lectura parcial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCursor {
    /// Bytes ya revisados sin encontrar `\r\n\r\n`
    scanned: usize,
    /// Largo total (head + body) una vez leídos los headers
    expected: Option<usize>,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largo total del request, conocido cuando ya llegaron los headers
    pub fn expected_len(&self) -> Option<usize> {
        self.expected
    }
}

/// Errores que pueden ocurrir durante el framing o el parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request incompleto o truncado
    IncompleteRequest,

    /// Formato inválido de la request line
    InvalidRequestLine,

    /// Método HTTP no soportado
    UnsupportedMethod(String),

    /// Versión HTTP distinta de HTTP/1.0 y HTTP/1.1
    InvalidHttpVersion(String),

    /// Header malformado
    InvalidHeader(String),

    /// `Content-Length` que no es un entero no negativo o es demasiado grande
    InvalidContentLength(String),

    /// Varios `Content-Length` con valores distintos
    ConflictingContentLength,

    /// Request vacío
    EmptyRequest,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::IncompleteRequest => write!(f, "Incomplete HTTP request"),
            ParseError::InvalidRequestLine => write!(f, "Invalid request line format"),
            ParseError::UnsupportedMethod(m) => write!(f, "Unsupported HTTP method: {}", m),
            ParseError::InvalidHttpVersion(v) => write!(f, "Invalid HTTP version: {}", v),
            ParseError::InvalidHeader(h) => write!(f, "Invalid header: {}", h),
            ParseError::InvalidContentLength(v) => write!(f, "Invalid Content-Length: {}", v),
            ParseError::ConflictingContentLength => write!(f, "Conflicting Content-Length headers"),
            ParseError::EmptyRequest => write!(f, "Empty request"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Representa un request HTTP parseado
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,

    /// URL tal cual llegó, incluyendo la query (ej: "/cgi-bin/a.sh?x=1")
    url: String,

    /// "HTTP/1.0" o "HTTP/1.1"
    version: String,

    headers: Headers,

    body: Vec<u8>,
}

impl Request {
    /// Construye un request vacío (HTTP/1.1, sin headers ni body)
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Establece el body y su `Content-Length`
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        set_content_length(&mut self.headers, self.body.len());
        self
    }

    /// Decide si el buffer contiene un request completo.
    ///
    /// Un request está completo cuando aparece la línea vacía que cierra los
    /// headers y, si hay `Content-Length`, exactamente esa cantidad de bytes
    /// de body detrás. Los bytes sobrantes pertenecen al siguiente request y
    /// no se cuentan.
    ///
    /// # Ejemplo
    /// ```
    /// use cgi_reactor::http::request::{Frame, Request};
    ///
    /// let raw = b"POST /x HTTP/1.1\r\nContent-Length: 2\r\n\r\nab";
    /// assert_eq!(Request::frame_check(&raw[..raw.len() - 1]).unwrap(), Frame::Incomplete);
    /// assert_eq!(Request::frame_check(raw).unwrap(), Frame::Complete(raw.len()));
    /// ```
    pub fn frame_check(buffer: &[u8]) -> Result<Frame, ParseError> {
        Self::frame_check_from(buffer, &mut FrameCursor::new())
    }

    /// Como `frame_check`, retomando desde `cursor`. El buffer solo puede
    /// haber crecido desde la llamada anterior con el mismo cursor; tras
    /// consumir un request el cursor se reinicia.
    pub fn frame_check_from(buffer: &[u8], cursor: &mut FrameCursor) -> Result<Frame, ParseError> {
        let total = match cursor.expected {
            Some(total) => total,
            None => {
                // El terminador puede haber quedado partido en el borde anterior
                let start = cursor.scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
                let Some(head_end) = find_head_end_from(buffer, start) else {
                    cursor.scanned = buffer.len();
                    return Ok(Frame::Incomplete);
                };

                let head = String::from_utf8_lossy(&buffer[..head_end]);
                let content_length = declared_content_length(head.split("\r\n").skip(1))?;
                let total = head_end
                    .checked_add(content_length.unwrap_or(0))
                    .ok_or_else(|| {
                        ParseError::InvalidContentLength(content_length.unwrap_or(0).to_string())
                    })?;
                cursor.scanned = head_end;
                cursor.expected = Some(total);
                total
            }
        };

        if buffer.len() >= total {
            Ok(Frame::Complete(total))
        } else {
            Ok(Frame::Incomplete)
        }
    }

    /// Parsea un request desde bytes
    ///
    /// # Retorna
    ///
    /// * `Ok(Request)` - Request parseado exitosamente
    /// * `Err(ParseError)` - Error durante el parsing (el worker responde 400)
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use cgi_reactor::http::Request;
    ///
    /// let raw = b"GET /index.html?lang=es HTTP/1.0\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/index.html");
    /// assert_eq!(request.query_string(), "lang=es");
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if buffer.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::EmptyRequest);
        }

        let head_end = find_head_end(buffer).ok_or(ParseError::IncompleteRequest)?;

        // El head debe ser texto; el body se toma tal cual
        let head = std::str::from_utf8(&buffer[..head_end - HEAD_TERMINATOR.len()])
            .map_err(|_| ParseError::InvalidRequestLine)?;

        let lines: Vec<&str> = head.split("\r\n").collect();
        let (method, url, version) = Self::parse_request_line(lines[0])?;
        let headers = Self::parse_headers(lines[1..].iter().copied())?;

        // Se valida sobre las líneas: el mapa ya colapsó los duplicados
        let body = match declared_content_length(lines[1..].iter().copied())? {
            Some(length) => {
                let available = &buffer[head_end..];
                if available.len() < length {
                    return Err(ParseError::IncompleteRequest);
                }
                available[..length].to_vec()
            }
            None => Vec::new(),
        };

        Ok(Request {
            method,
            url,
            version,
            headers,
            body,
        })
    }

    /// Formato: `GET /path?query HTTP/1.1`
    fn parse_request_line(line: &str) -> Result<(Method, String, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD URL VERSION
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::parse(parts[0])?;

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, parts[1].to_string(), version))
    }

    /// Cada header tiene formato "Name: Value", separado en el primer ':'
    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, ParseError> {
        let mut headers = Headers::new();

        for line in lines {
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() && !name.contains(' ') => {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                _ => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    /// Serializa el request: request line, headers en orden del mapa, línea
    /// vacía y body. Con body no vacío el `Content-Length` refleja su largo real.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut headers = self.headers.clone();
        if !self.body.is_empty() {
            set_content_length(&mut headers, self.body.len());
        }

        let mut result = format!("{} {} {}\r\n", self.method, self.url, self.version).into_bytes();
        write_headers(&mut result, &headers);
        result.extend_from_slice(&self.body);
        result
    }

    // === Métodos públicos para acceder a los campos ===

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path sin la query (ej: "/cgi-bin/a.sh")
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    /// Query sin el '?' (vacía si no hay)
    pub fn query_string(&self) -> &str {
        match self.url.split_once('?') {
            Some((_, query)) => query,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Obtiene un header sin distinguir mayúsculas en el nombre
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// HTTP/1.1 mantiene la conexión salvo `Connection: close`;
    /// HTTP/1.0 la cierra salvo `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == "HTTP/1.1",
        }
    }
}

/// Posición justo después de `\r\n\r\n`, si ya llegó
pub(crate) fn find_head_end(buffer: &[u8]) -> Option<usize> {
    find_head_end_from(buffer, 0)
}

fn find_head_end_from(buffer: &[u8], start: usize) -> Option<usize> {
    buffer
        .get(start..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| start + pos + HEAD_TERMINATOR.len())
}

/// `Content-Length` declarado en las líneas de headers. Repetido con el mismo
/// valor se acepta; con valores distintos es un error.
fn declared_content_length<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<Option<usize>, ParseError> {
    let mut declared = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        let length = parse_content_length(value)?;
        match declared {
            Some(previous) if previous != length => {
                return Err(ParseError::ConflictingContentLength)
            }
            _ => declared = Some(length),
        }
    }
    Ok(declared)
}

fn parse_content_length(value: &str) -> Result<usize, ParseError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidContentLength(value.trim().to_string()))
}

pub(crate) fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Fija `Content-Length` conservando el nombre que ya tuviera el mapa
pub(crate) fn set_content_length(headers: &mut Headers, length: usize) {
    let key = headers
        .keys()
        .find(|key| key.eq_ignore_ascii_case("Content-Length"))
        .cloned()
        .unwrap_or_else(|| "Content-Length".to_string());
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case("Content-Length"));
    headers.insert(key, length.to_string());
}

pub(crate) fn write_headers(out: &mut Vec<u8>, headers: &Headers) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}
