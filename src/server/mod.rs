//! # Servidor
//! src/server/mod.rs
//!
//! Capa de red basada en readiness:
//!
//! - **poller**: epoll (registro de fds y espera de eventos)
//! - **waker**: eventfd con el que los workers despiertan al reactor
//! - **connection**: estado por cliente (buffers, generación, tarea en vuelo)
//! - **reactor**: el loop de eventos y el `Server` público

pub mod connection;
pub mod poller;
pub mod reactor;
pub mod waker;

// Re-exportar para facilitar el uso
pub use reactor::{Server, ShutdownHandle};
