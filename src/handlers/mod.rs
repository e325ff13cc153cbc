//! # Handlers
//!
//! Lo que un worker ejecuta para producir una respuesta:
//!
//! - **static_files**: archivos bajo el root con su tipo MIME
//! - **cgi**: programas externos con stdin/stdout en pipes
//! - **login**: verificación de credenciales contra el almacén de registros
//!
//! Todos devuelven `Result<Response, HandlerError>`; el error se convierte en
//! respuesta HTTP en el router.

pub mod cgi;
pub mod login;
pub mod static_files;

pub use cgi::{CgiCancel, CgiExecutor};
pub use static_files::StaticResource;
