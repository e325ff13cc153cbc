//! # Recursos Estáticos
//! src/handlers/static_files.rs
//!
//! Mapea URLs a archivos bajo un directorio raíz fijo:
//!
//! - `/` → `<root>/index.html`
//! - `/css/site.css` → `<root>/css/site.css`
//!
//! Cualquier path que escape del root (segmentos `..`, o symlinks que apunten
//! afuera) se rechaza como "no encontrado".

use crate::error::HandlerError;
use crate::http::{Response, StatusCode};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Documento servido para `/` y para directorios
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Tipo MIME por extensión; lo desconocido es `text/plain`
///
/// # Ejemplo
/// ```
/// use cgi_reactor::handlers::static_files::content_type;
/// assert_eq!(content_type("html"), "text/html");
/// assert_eq!(content_type("exe"), "text/plain");
/// ```
pub fn content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => "text/plain",
    }
}

/// Extensión del último segmento, sin el punto
pub fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

/// Contenido estático bajo un root
#[derive(Debug, Clone)]
pub struct StaticResource {
    root: PathBuf,
}

impl StaticResource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resuelve el path de una URL (sin query) a un archivo dentro del root.
    ///
    /// # Errores
    ///
    /// `HandlerError::NotFound` si la URL no es absoluta o escapa del root.
    pub fn resolve(&self, url_path: &str) -> Result<PathBuf, HandlerError> {
        let relative = url_path
            .strip_prefix('/')
            .ok_or_else(|| HandlerError::NotFound(url_path.to_string()))?;

        if relative.is_empty() {
            return Ok(self.root.join(DEFAULT_DOCUMENT));
        }

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {}
                // `..`, raíces o prefijos: fuera del root
                _ => return Err(HandlerError::NotFound(url_path.to_string())),
            }
        }

        if resolved.is_dir() {
            resolved.push(DEFAULT_DOCUMENT);
        }

        self.ensure_inside_root(&resolved, url_path)?;
        Ok(resolved)
    }

    /// Canonicaliza y verifica el prefijo para atrapar symlinks hacia afuera.
    /// Un archivo inexistente pasa: `read` lo reporta como 404.
    fn ensure_inside_root(&self, path: &Path, url_path: &str) -> Result<(), HandlerError> {
        let (Ok(root), Ok(target)) = (self.root.canonicalize(), path.canonicalize()) else {
            return Ok(());
        };
        if target.starts_with(&root) {
            Ok(())
        } else {
            Err(HandlerError::NotFound(url_path.to_string()))
        }
    }

    /// Lee el archivo completo
    ///
    /// # Errores
    ///
    /// - `NotFound` si no existe
    /// - `Resource` si existe pero no se puede leer
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, HandlerError> {
        fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => HandlerError::NotFound(self.display_path(path)),
            _ => HandlerError::Resource(format!("{}: {}", self.display_path(path), e)),
        })
    }

    /// Resuelve, lee y arma la respuesta 200 con su Content-Type
    pub fn serve(&self, url_path: &str) -> Result<Response, HandlerError> {
        let path = self.resolve(url_path)?;
        let body = self.read(&path)?;
        Ok(Response::new(StatusCode::Ok)
            .with_header("Content-Type", content_type(extension_of(&path)))
            .with_body_bytes(body))
    }

    /// Path relativo al root para mensajes de error (no filtra el root real)
    fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => format!("/{}", relative.display()),
            Err(_) => path.display().to_string(),
        }
    }
}
