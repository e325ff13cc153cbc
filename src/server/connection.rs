//! # Estado de Conexión
//! src/server/connection.rs
//!
//! Todo lo que el reactor sabe de un cliente: buffers de entrada y salida,
//! generación, si hay una tarea en vuelo y el token CGI de esa tarea.
//!
//! ```text
//!  Reading ──request completo──▶ Busy ──Completion──▶ Writing ──flush──▶ Reading
//!     │                                                              (keep-alive)
//!     └── EOF / error / timeout / HUP ──▶ cerrada
//! ```
//!
//! Solo el thread del reactor toca esta estructura.

use crate::handlers::CgiCancel;
use crate::http::{Frame, FrameCursor, ParseError, Request};
use crate::server::poller::{Interest, PEER_CLOSED, READABLE};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 4096;

/// Resultado de drenar el socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Se leyó todo lo disponible (WouldBlock)
    Open,
    /// El cliente cerró su lado de escritura
    PeerClosed,
}

pub struct Connection {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    /// Bytes recibidos aún no enmarcados
    pub(crate) inbound: Vec<u8>,
    /// Hasta dónde llegó el framer dentro de `inbound`
    frame: FrameCursor,
    /// Respuesta pendiente de escribir
    pub(crate) outbound: Vec<u8>,
    pub(crate) written: usize,
    /// Se incrementa en cada reuso keep-alive; un resultado con otra
    /// generación se descarta
    pub(crate) generation: u64,
    /// Hay una tarea en vuelo o una respuesta pendiente
    pub(crate) busy: bool,
    pub(crate) keep_alive: bool,
    pub(crate) peer_closed: bool,
    pub(crate) cgi: Option<CgiCancel>,
    /// Máscara registrada en el poller
    pub(crate) interest: Interest,
    pub(crate) last_activity: Instant,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            inbound: Vec::with_capacity(READ_CHUNK),
            frame: FrameCursor::new(),
            outbound: Vec::new(),
            written: 0,
            generation: 0,
            busy: false,
            keep_alive: true,
            peer_closed: false,
            cgi: None,
            interest: READABLE | PEER_CLOSED,
            last_activity: Instant::now(),
        }
    }

    /// Lee hasta WouldBlock o EOF, acumulando en `inbound`
    pub fn fill(&mut self) -> io::Result<ReadStatus> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(ReadStatus::PeerClosed);
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    self.last_activity = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadStatus::Open),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Separa el primer request completo del buffer. Lo que sigue (pipelining)
    /// queda en `inbound`.
    pub fn take_request(&mut self) -> Result<Option<Vec<u8>>, ParseError> {
        match Request::frame_check_from(&self.inbound, &mut self.frame)? {
            Frame::Complete(len) => {
                self.frame = FrameCursor::new();
                Ok(Some(self.inbound.drain(..len).collect()))
            }
            Frame::Incomplete => Ok(None),
        }
    }

    /// Largo total del request en curso según sus headers, si ya llegaron
    pub fn expected_len(&self) -> Option<usize> {
        self.frame.expected_len()
    }

    /// Descarta lo recibido y no enmarcado
    pub fn discard_inbound(&mut self) {
        self.inbound.clear();
        self.frame = FrameCursor::new();
    }

    /// Hay una tarea en el pool y todavía no hay respuesta
    pub fn task_in_flight(&self) -> bool {
        self.busy && self.outbound.is_empty()
    }

    /// Instala una respuesta para escribir
    pub fn queue_response(&mut self, bytes: Vec<u8>, keep_alive: bool) {
        self.outbound = bytes;
        self.written = 0;
        self.keep_alive = keep_alive && !self.peer_closed;
        self.busy = true;
        self.cgi = None;
    }

    /// Escribe hasta WouldBlock. `Ok(true)` cuando la respuesta salió completa.
    pub fn flush(&mut self) -> io::Result<bool> {
        while self.written < self.outbound.len() {
            match self.stream.write(&self.outbound[self.written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    self.written += n;
                    self.last_activity = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Deja la conexión lista para el siguiente request keep-alive
    pub fn recycle(&mut self) {
        self.outbound.clear();
        self.written = 0;
        self.busy = false;
        self.generation += 1;
        self.last_activity = Instant::now();
    }

    /// Cancela el CGI en vuelo, si lo hay
    pub fn cancel_cgi(&mut self) {
        if let Some(cancel) = self.cgi.take() {
            cancel.cancel();
        }
    }

    /// Ociosa: sin tarea en vuelo ni respuesta pendiente, y sin actividad
    /// durante `timeout`
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        !self.busy && now.duration_since(self.last_activity) >= timeout
    }
}
