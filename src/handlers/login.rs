//! # Login con Almacén de Credenciales
//! src/handlers/login.rs
//!
//! `POST /login` con body `user=<u>&password=<p>` (form-urlencoded).
//! Si el registro de `<u>` existe y su `password_sha256` coincide con el
//! SHA-256 de `<p>`, se sirve `welcome.html` del root; si no, 403.

use crate::error::HandlerError;
use crate::handlers::static_files::StaticResource;
use crate::http::{Method, Request, Response};
use crate::storage::RecordStore;
use log::debug;
use sha2::{Digest, Sha256};

/// Documento servido tras un login correcto
pub const WELCOME_DOCUMENT: &str = "/welcome.html";

/// SHA-256 en hexadecimal minúsculo
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extrae un campo de un body form-urlencoded
fn form_field(body: &str, name: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| form_decode(value))
    })
}

/// Decodifica `+` y secuencias `%XX`; una secuencia inválida queda literal
fn form_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 2;
                    }
                    None => decoded.push(b'%'),
                }
            }
            other => decoded.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Verifica credenciales contra el almacén y responde
pub fn login(
    request: &Request,
    store: &dyn RecordStore,
    resources: &StaticResource,
) -> Result<Response, HandlerError> {
    if request.method() != Method::POST {
        return Err(HandlerError::MethodNotAllowed(request.method().to_string()));
    }

    let body = String::from_utf8_lossy(request.body());
    let user = form_field(&body, "user").unwrap_or_default();
    let password = form_field(&body, "password").unwrap_or_default();

    let accepted = store
        .lookup(&user)
        .map(|record| record.password_sha256.eq_ignore_ascii_case(&hash_password(&password)))
        .unwrap_or(false);

    if !accepted {
        debug!("Login rejected for {:?}", user);
        return Err(HandlerError::Forbidden("invalid credentials".to_string()));
    }

    debug!("Login accepted for {:?}", user);
    resources.serve(WELCOME_DOCUMENT)
}
