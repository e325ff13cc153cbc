//! # Módulo HTTP
//!
//! Codec HTTP/1.0 y HTTP/1.1 sin estado y sin I/O:
//!
//! - Framing incremental de requests (`Request::frame_check`)
//! - Parsing de requests (`Request::parse`)
//! - Serialización de requests y responses (`to_bytes`)
//! - Tabla de status codes
//!
//! Solo bodies delimitados por `Content-Length`; no hay chunked encoding.

pub mod request;
pub mod response;
pub mod status;

pub use request::{Frame, FrameCursor, Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
