//! # Waker eventfd
//! src/server/waker.rs
//!
//! Los workers escriben en un eventfd registrado en el poller para sacar al
//! reactor de `epoll_wait` cuando hay resultados. Varias escrituras antes
//! de leer se acumulan en el contador y producen un solo evento.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub struct Waker {
    fd: OwnedFd,
}

impl Waker {
    pub fn new() -> io::Result<Self> {
        // SAFETY: eventfd no recibe punteros
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd recién creado y sin otro dueño
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Suma 1 al contador. EAGAIN significa que ya hay un aviso pendiente.
    pub fn wake(&self) -> io::Result<()> {
        let value: u64 = 1;
        // SAFETY: se escriben exactamente 8 bytes desde una variable local
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &value as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Resetea el contador. Devuelve cuántos avisos se acumularon.
    pub fn drain(&self) -> u64 {
        let mut value: u64 = 0;
        // SAFETY: se leen exactamente 8 bytes en una variable local
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            0
        } else {
            value
        }
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::poller::{Events, Poller, READABLE};

    #[test]
    fn test_wakes_coalesce() {
        let waker = Waker::new().unwrap();
        assert_eq!(waker.drain(), 0);

        waker.wake().unwrap();
        waker.wake().unwrap();
        waker.wake().unwrap();
        assert_eq!(waker.drain(), 3);
        assert_eq!(waker.drain(), 0);
    }

    #[test]
    fn test_wake_interrupts_poller() {
        let poller = Poller::new().unwrap();
        let waker = Waker::new().unwrap();
        poller.add(waker.as_raw_fd(), 1, READABLE).unwrap();

        let mut events = Events::with_capacity(2);
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 0);

        waker.wake().unwrap();
        assert_eq!(poller.wait(&mut events, 1000).unwrap(), 1);
        assert_eq!(events.iter().next().unwrap().token, 1);

        waker.drain();
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 0);
    }
}
