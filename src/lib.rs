//! # CGI Reactor
//! src/lib.rs
//!
//! Servidor HTTP/1.x con un reactor epoll de un solo thread y un pool de
//! workers. El reactor hace todo el I/O de sockets sin bloquear; los workers
//! sirven archivos, ejecutan programas CGI y verifican logins.
//!
//! ## Arquitectura
//!
//! - `http`: parsing, framing y serialización de mensajes
//! - `server`: poller, waker, conexiones y el loop del reactor
//! - `workers`: cola acotada y pool de threads
//! - `router`: elige y ejecuta la operación de cada request
//! - `handlers`: archivos estáticos, CGI y login
//! - `storage`: almacén de credenciales
//! - `config`, `logger`, `error`: configuración CLI, logging y errores
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use cgi_reactor::config::Config;
//! use cgi_reactor::server::Server;
//! use cgi_reactor::storage::MemoryRecordStore;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let mut server = Server::bind(config, Arc::new(MemoryRecordStore::new())).unwrap();
//! server.run().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logger;
pub mod router;
pub mod server;
pub mod storage;
pub mod workers;
