//! # Poller epoll
//! src/server/poller.rs
//!
//! Envoltorio mínimo sobre epoll en modo level-triggered. Cada fd se
//! registra con un token `u64` que vuelve en los eventos.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Máscara de interés
pub type Interest = u32;

pub const READABLE: Interest = libc::EPOLLIN as u32;
pub const WRITABLE: Interest = libc::EPOLLOUT as u32;
/// Registrado pero sin eventos de lectura/escritura (ERR/HUP siguen llegando)
pub const NONE: Interest = 0;
/// El cliente cerró su lado de escritura (FIN); se combina con las anteriores
pub const PEER_CLOSED: Interest = libc::EPOLLRDHUP as u32;

const HANGUP: u32 = (libc::EPOLLERR | libc::EPOLLHUP) as u32;

/// Un evento listo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: u64,
    pub flags: u32,
}

impl Event {
    pub fn is_readable(&self) -> bool {
        self.flags & READABLE != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & WRITABLE != 0
    }

    pub fn is_hangup(&self) -> bool {
        self.flags & HANGUP != 0
    }

    pub fn is_peer_closed(&self) -> bool {
        self.flags & PEER_CLOSED != 0
    }
}

/// Buffer reutilizable para `epoll_wait`
pub struct Events {
    inner: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner[..self.len].iter().map(|e| Event {
            token: e.u64,
            flags: e.events,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Instancia epoll; el fd se cierra al soltarla
pub struct Poller {
    fd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 no recibe punteros
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd recién creado y sin otro dueño
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn add(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
    }

    pub fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: con EPOLL_CTL_DEL el evento se ignora (puntero nulo válido desde 2.6.9)
        let ret = unsafe {
            libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Espera eventos. `timeout_ms` negativo bloquea indefinidamente.
    /// EINTR se devuelve como `ErrorKind::Interrupted`.
    pub fn wait(&self, events: &mut Events, timeout_ms: i32) -> io::Result<usize> {
        let capacity = events.inner.len() as libc::c_int;
        // SAFETY: el buffer tiene `capacity` entradas válidas
        let n = unsafe {
            libc::epoll_wait(
                self.fd.as_raw_fd(),
                events.inner.as_mut_ptr(),
                capacity,
                timeout_ms,
            )
        };
        if n < 0 {
            events.len = 0;
            return Err(io::Error::last_os_error());
        }
        events.len = n as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest,
            u64: token,
        };
        // SAFETY: `event` vive durante la llamada
        let ret = unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
