//! # Reactor
//! src/server/reactor.rs
//!
//! Un solo thread es dueño del listener, de todas las conexiones y del
//! poller. Nunca bloquea en I/O de un cliente: lo que puede bloquear
//! (archivos, CGI, login) va al pool como `Task` y vuelve como `Completion`
//! por un canal, con el eventfd como aviso.
//!
//! ```text
//!            ┌───────────── epoll_wait (tick) ─────────────┐
//!            │                                             │
//!   LISTENER ▼   WAKER ▼              conexión ▼           │
//!   accept loop  drain eventfd   HUP/ERR → close           │
//!                                RDHUP con tarea → close   │
//!                                IN  → fill → dispatch ──▶ pool
//!                                OUT → flush → recycle     │
//!            │                                             │
//!            └── completions → WRITABLE ── idle sweep ─────┘
//! ```
//!
//! Cada conexión tiene un id `u64` que nunca se reutiliza y una generación
//! que sube en cada reuso keep-alive: un resultado cuyo id ya no existe o
//! cuya generación no coincide se descarta.
//!
//! Mientras una tarea está en vuelo el socket queda registrado solo con
//! `PEER_CLOSED`: los bytes nuevos esperan en el kernel, pero un FIN del
//! cliente cierra la conexión y mata el CGI.

use crate::config::Config;
use crate::error::ServerError;
use crate::handlers::CgiCancel;
use crate::http::{Response, StatusCode};
use crate::router::{finish_response, Operation, Router};
use crate::server::connection::Connection;
use crate::server::poller::{
    Event, Events, Interest, Poller, NONE, PEER_CLOSED, READABLE, WRITABLE,
};
use crate::server::waker::Waker;
use crate::storage::RecordStore;
use crate::workers::{Completion, CompletionSender, PushError, Task, WorkerPool};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Token del socket de escucha
pub const LISTENER: u64 = 0;
/// Token del eventfd de los workers
pub const WAKER: u64 = 1;
const FIRST_CONNECTION: u64 = 2;

/// Espera máxima de epoll_wait; acota la latencia del barrido de ociosas y
/// de la bandera de apagado
const TICK_MS: i32 = 250;

/// Pide al reactor que termine desde otro thread
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!("Failed to wake reactor for shutdown: {}", e);
        }
    }

    /// Bandera compartida, para registrarla en un handler de señales
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Servidor HTTP con reactor epoll
pub struct Server {
    config: Config,
    listener: TcpListener,
    poller: Poller,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    router: Arc<Router>,
    pool: WorkerPool,
    completions: Receiver<Completion>,
    connections: HashMap<u64, Connection>,
    next_token: u64,
}

impl Server {
    /// Hace bind, registra listener y waker y arranca el pool
    pub fn bind(config: Config, store: Arc<dyn RecordStore>) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let address = config.address();
        let listener =
            TcpListener::bind(&address).map_err(|e| ServerError::Bind(address.clone(), e))?;
        listener.set_nonblocking(true)?;

        let poller = Poller::new()?;
        let waker = Arc::new(Waker::new()?);
        poller.add(listener.as_raw_fd(), LISTENER, READABLE)?;
        poller.add(waker.as_raw_fd(), WAKER, READABLE)?;

        let router = Arc::new(Router::new(&config, store));
        let (tx, rx) = mpsc::channel();
        let pool = WorkerPool::new(
            config.workers,
            config.queue_capacity,
            Arc::clone(&router),
            CompletionSender::new(tx, Arc::clone(&waker)),
        )?;

        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            poller,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
            router,
            pool,
            completions: rx,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Loop principal. Vuelve con `Ok` tras un apagado pedido, o con
    /// `ServerError::Poller` si epoll falla. En ambos casos cierra todas las
    /// conexiones y detiene el pool antes de volver.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(self.config.max_events);
        let idle_timeout = (self.config.idle_timeout_ms > 0)
            .then(|| Duration::from_millis(self.config.idle_timeout_ms));

        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break Ok(());
            }

            match self.poller.wait(&mut events, TICK_MS) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("epoll_wait failed: {}", e);
                    break Err(ServerError::Poller(e));
                }
            }

            for event in events.iter() {
                match event.token {
                    LISTENER => self.accept_connections(),
                    WAKER => {
                        self.waker.drain();
                    }
                    token => self.on_event(token, event),
                }
            }

            self.drain_completions();

            if let Some(timeout) = idle_timeout {
                self.sweep_idle(timeout);
            }
        };

        self.stop();
        result
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("Failed to configure {}: {}", peer, e);
                        continue;
                    }

                    let token = self.next_token;
                    self.next_token += 1;

                    let conn = Connection::new(stream, peer);
                    if let Err(e) = self.poller.add(conn.stream.as_raw_fd(), token, conn.interest) {
                        warn!("Failed to register {}: {}", peer, e);
                        continue;
                    }

                    debug!("Accepted {} as connection {}", peer, token);
                    self.connections.insert(token, conn);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn on_event(&mut self, token: u64, event: Event) {
        if event.is_hangup() {
            self.on_hangup(token);
            return;
        }
        if event.is_peer_closed() && !self.on_peer_closed(token) {
            return;
        }
        if event.is_readable() {
            self.on_readable(token);
        }
        if event.is_writable() {
            self.on_writable(token);
        }
    }

    fn on_hangup(&mut self, token: u64) {
        debug!("Hangup on connection {}", token);
        self.close(token);
    }

    /// FIN del cliente. Con una tarea en vuelo nadie va a leer la respuesta:
    /// se cierra y el CGI muere. Con una respuesta a medio escribir se
    /// termina de enviar y luego se cierra. Devuelve si la conexión sigue.
    fn on_peer_closed(&mut self, token: u64) -> bool {
        let Some(conn) = self.connections.get_mut(&token) else {
            return false;
        };

        if conn.task_in_flight() {
            debug!("Peer {} closed with a task in flight", conn.peer);
            self.on_hangup(token);
            return false;
        }

        if conn.busy {
            conn.peer_closed = true;
            conn.keep_alive = false;
            if set_interest(&self.poller, token, conn, WRITABLE).is_err() {
                self.close(token);
                return false;
            }
            return true;
        }

        // Leyendo: el EOF lo detecta `fill` y lo pendiente se responde
        self.on_readable(token);
        false
    }

    fn on_readable(&mut self, token: u64) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if let Err(e) = conn.fill() {
            debug!("Read error on {}: {}", conn.peer, e);
            self.close(token);
            return;
        }

        self.dispatch(token);

        // Cliente cerró y no queda nada en vuelo que responder
        if let Some(conn) = self.connections.get(&token) {
            if conn.peer_closed && !conn.busy {
                debug!("Peer {} closed", conn.peer);
                self.close(token);
            }
        }
    }

    /// Si la conexión está libre y hay un request completo, lo envía al pool
    fn dispatch(&mut self, token: u64) {
        let max_request_bytes = self.config.max_request_bytes;
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.busy {
            return;
        }

        let bytes = match conn.take_request() {
            Ok(Some(bytes)) if bytes.len() <= max_request_bytes => bytes,
            Ok(Some(_)) => {
                self.reject(token, StatusCode::PayloadTooLarge, "request too large");
                return;
            }
            Ok(None) => {
                let declared = conn.expected_len().unwrap_or(0);
                if declared > max_request_bytes || conn.inbound.len() > max_request_bytes {
                    self.reject(token, StatusCode::PayloadTooLarge, "request too large");
                }
                return;
            }
            Err(e) => {
                debug!("Malformed request from {}: {}", conn.peer, e);
                self.reject(token, StatusCode::BadRequest, &e.to_string());
                return;
            }
        };

        let operation = self.router.operation_for(&bytes);
        let cancel = (operation == Operation::Cgi).then(CgiCancel::new);
        let task = Task {
            conn_id: token,
            generation: conn.generation,
            operation,
            bytes,
            cancel: cancel.clone(),
        };

        match self.pool.submit(task) {
            Ok(()) => {
                conn.busy = true;
                conn.cgi = cancel;
                if set_interest(&self.poller, token, conn, NONE).is_err() {
                    self.close(token);
                }
            }
            Err(PushError::Full(_)) => {
                warn!("Task queue full, rejecting {}", conn.peer);
                self.reject(token, StatusCode::ServiceUnavailable, "server busy, retry later");
            }
            Err(PushError::Closed(_)) => self.close(token),
        }
    }

    /// Respuesta generada por el reactor (400/413/503); cierra tras enviarla
    fn reject(&mut self, token: u64, status: StatusCode, message: &str) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let response = Response::error(status, message);
        conn.discard_inbound();
        conn.queue_response(finish_response(response, "HTTP/1.1", false), false);

        if set_interest(&self.poller, token, conn, WRITABLE).is_err() {
            self.close(token);
        }
    }

    fn on_writable(&mut self, token: u64) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if !conn.busy {
            return;
        }

        match conn.flush() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!("Write error on {}: {}", conn.peer, e);
                self.close(token);
                return;
            }
        }

        if !conn.keep_alive {
            self.close(token);
            return;
        }

        conn.recycle();
        if set_interest(&self.poller, token, conn, READABLE).is_err() {
            self.close(token);
            return;
        }

        // Un request encadenado puede estar ya en el buffer
        self.dispatch(token);
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions.try_recv() {
            self.on_task_complete(completion);
        }
    }

    fn on_task_complete(&mut self, completion: Completion) {
        let Some(conn) = self.connections.get_mut(&completion.conn_id) else {
            warn!("Discarding result for closed connection {}", completion.conn_id);
            return;
        };
        if completion.generation != conn.generation {
            warn!(
                "Discarding stale result for connection {} (generation {} != {})",
                completion.conn_id, completion.generation, conn.generation
            );
            return;
        }

        conn.queue_response(completion.bytes, completion.keep_alive);
        if set_interest(&self.poller, completion.conn_id, conn, WRITABLE).is_err() {
            self.close(completion.conn_id);
        }
    }

    fn sweep_idle(&mut self, timeout: Duration) {
        let now = Instant::now();
        let idle: Vec<u64> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_idle(now, timeout))
            .map(|(token, _)| *token)
            .collect();

        for token in idle {
            debug!("Closing idle connection {}", token);
            self.close(token);
        }
    }

    fn close(&mut self, token: u64) {
        if let Some(mut conn) = self.connections.remove(&token) {
            conn.cancel_cgi();
            if let Err(e) = self.poller.delete(conn.stream.as_raw_fd()) {
                debug!("Deregister of connection {} failed: {}", token, e);
            }
            debug!("Closed connection {} ({})", token, conn.peer);
        }
    }

    fn stop(&mut self) {
        let tokens: Vec<u64> = self.connections.keys().copied().collect();
        let open = tokens.len();
        for token in tokens {
            self.close(token);
        }
        info!("Closed {} open connections", open);

        self.pool.shutdown();
        while self.completions.try_recv().is_ok() {}
        info!("Server stopped");
    }
}

/// Cambia la máscara de la conexión. `PEER_CLOSED` se agrega siempre hasta
/// que el FIN ya se vio; level-triggered lo repetiría en cada vuelta.
fn set_interest(
    poller: &Poller,
    token: u64,
    conn: &mut Connection,
    interest: Interest,
) -> io::Result<()> {
    let interest = if conn.peer_closed {
        interest
    } else {
        interest | PEER_CLOSED
    };
    if conn.interest == interest {
        return Ok(());
    }
    poller
        .modify(conn.stream.as_raw_fd(), token, interest)
        .inspect_err(|e| debug!("Interest change on connection {} failed: {}", token, e))?;
    conn.interest = interest;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;

    fn config() -> Config {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.workers = 1;
        config
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let mut config = config();
        config.workers = 0;
        let result = Server::bind(config, Arc::new(MemoryRecordStore::new()));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_bind_reports_address_in_use() {
        let first = Server::bind(config(), Arc::new(MemoryRecordStore::new())).unwrap();
        let mut second = config();
        second.port = first.local_addr().unwrap().port();

        let result = Server::bind(second, Arc::new(MemoryRecordStore::new()));
        assert!(matches!(result, Err(ServerError::Bind(_, _))));
    }

    #[test]
    fn test_shutdown_before_run_returns() {
        let mut server = Server::bind(config(), Arc::new(MemoryRecordStore::new())).unwrap();
        let handle = server.shutdown_handle();
        handle.shutdown();
        assert!(handle.is_shutdown());
        assert!(server.run().is_ok());
        assert_eq!(server.connection_count(), 0);
    }
}
