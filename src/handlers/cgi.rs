//! # Ejecución CGI
//! src/handlers/cgi.rs
//!
//! Un proceso hijo por request dinámico:
//!
//! ```text
//!   worker ──stdin pipe──▶ hijo ──stdout pipe──▶ worker ──▶ body HTTP
//! ```
//!
//! El hijo recibe exactamente dos variables de entorno, `QUERY_STRING` y
//! `CONTENT_LENGTH`. Con POST el body se escribe en su stdin desde un thread
//! auxiliar mientras este thread drena su stdout, así un pipe lleno de un lado
//! no bloquea al otro. La salida se reenvía tal cual: no se interpretan
//! headers CGI.
//!
//! El hijo vive dentro de un `CgiCancel` compartido con el reactor. Si la
//! conexión se cae, el reactor llama a `cancel()` (SIGKILL al grupo del hijo,
//! sin esperar) y el worker, al ver EOF, lo cosecha. `CgiProcess` hace kill +
//! wait en `Drop`, así que ningún camino de error deja zombies ni pipes.

use crate::error::HandlerError;
use crate::handlers::static_files::{content_type, extension_of, StaticResource};
use crate::http::{Method, Request, Response, StatusCode};
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

const RELAY_CHUNK: usize = 8192;

/// Token de cancelación compartido entre el reactor y el worker que corre el CGI
#[derive(Debug, Clone, Default)]
pub struct CgiCancel {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    /// Hijo vivo (sin cosechar). Mientras esté aquí su pid no se reutiliza.
    child: Mutex<Option<Child>>,
}

impl CgiCancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Termina el hijo si existe. No bloquea: el wait lo hace el worker.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.lock().as_ref() {
            warn!("Cancelling CGI child {}", child.id());
            kill_group(child);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Guarda el hijo recién creado; si ya se canceló, lo mata en el acto
    fn register(&self, child: Child) {
        let mut slot = self.lock();
        if self.is_cancelled() {
            kill_group(&child);
        }
        *slot = Some(child);
    }

    fn take(&self) -> Option<Child> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        // Un panic con el lock tomado no deja el Option inconsistente
        self.inner
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// SIGKILL al grupo de procesos del hijo (el hijo es líder de su grupo)
fn kill_group(child: &Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) no toca memoria; el pid sigue reservado porque el hijo no fue cosechado
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

/// Un hijo CGI en ejecución y sus extremos de pipe
pub struct CgiProcess {
    cancel: CgiCancel,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl CgiProcess {
    /// Lanza el programa con stdin/stdout en pipes y el entorno mínimo
    pub fn spawn(
        script: &Path,
        query_string: &str,
        content_length: usize,
        cancel: &CgiCancel,
    ) -> Result<Self, HandlerError> {
        let mut child = Command::new(script)
            .env_clear()
            .env("QUERY_STRING", query_string)
            .env("CONTENT_LENGTH", content_length.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| spawn_error(script, e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        cancel.register(child);

        Ok(Self {
            cancel: cancel.clone(),
            stdin,
            stdout,
        })
    }

    /// Escribe `input` en el stdin del hijo (si hay) mientras drena su stdout.
    /// Devuelve todo lo que el hijo escribió y lo cosecha antes de retornar.
    pub fn run(mut self, input: Option<&[u8]>) -> Result<Vec<u8>, HandlerError> {
        let stdin = self.stdin.take();
        let mut stdout = self
            .stdout
            .take()
            .ok_or_else(|| HandlerError::Execution("child stdout not captured".to_string()))?;

        let output = thread::scope(|scope| {
            let feeder = scope.spawn(move || feed_stdin(stdin, input));
            let output = relay_stdout(&mut stdout);
            // El feeder nunca hace panic; si lo hiciera, ya no importa su resultado
            let _ = feeder.join();
            output
        });
        drop(stdout);

        let status = self.reap();
        if self.cancel.is_cancelled() {
            return Err(HandlerError::Execution("cancelled".to_string()));
        }

        let output = output.map_err(|e| HandlerError::Execution(format!("pipe read: {}", e)))?;
        match status {
            Ok(status) if !status.success() => debug!("CGI exited with {}", status),
            Ok(_) => {}
            Err(e) => warn!("CGI wait failed: {}", e),
        }
        Ok(output)
    }

    /// Espera al hijo; si fue cancelado se asegura de matarlo antes
    fn reap(&mut self) -> io::Result<std::process::ExitStatus> {
        match self.cancel.take() {
            Some(mut child) => {
                if self.cancel.is_cancelled() {
                    kill_group(&child);
                }
                child.wait()
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "child already reaped")),
        }
    }
}

impl Drop for CgiProcess {
    fn drop(&mut self) {
        self.stdin.take();
        self.stdout.take();
        if let Some(mut child) = self.cancel.take() {
            kill_group(&child);
            let _ = child.wait();
        }
    }
}

fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&[u8]>) {
    // Soltar stdin (EOF para el hijo) ocurre al salir de esta función
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return;
    };
    if let Err(e) = stdin.write_all(input) {
        // EPIPE: el hijo terminó sin leer todo el body
        debug!("CGI stdin closed early: {}", e);
    }
}

fn relay_stdout(stdout: &mut ChildStdout) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut buffer = [0u8; RELAY_CHUNK];
    loop {
        match stdout.read(&mut buffer) {
            Ok(0) => return Ok(output),
            Ok(n) => output.extend_from_slice(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Agotamiento de fds/procesos es `Resource`; lo demás, fallo de exec
fn spawn_error(script: &Path, e: io::Error) -> HandlerError {
    match e.raw_os_error() {
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::EAGAIN) | Some(libc::ENOMEM) => {
            HandlerError::Resource(format!("spawn {}: {}", script.display(), e))
        }
        _ => HandlerError::Execution(format!("spawn {}: {}", script.display(), e)),
    }
}

/// Ejecutor de programas CGI bajo el root de contenido
#[derive(Debug, Clone)]
pub struct CgiExecutor {
    resources: StaticResource,
}

impl CgiExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            resources: StaticResource::new(root),
        }
    }

    /// Ejecuta el programa de la URL y arma la respuesta 200 con su salida.
    ///
    /// # Errores
    ///
    /// - `NotFound` si la URL escapa del root
    /// - `Execution` si el programa no existe, no es ejecutable o falla el exec
    /// - `Resource` si no hay descriptores o procesos disponibles
    pub fn execute(&self, request: &Request, cancel: &CgiCancel) -> Result<Response, HandlerError> {
        let script = self.resources.resolve(request.path())?;
        ensure_executable(&script, request.path())?;

        let content_length = request.body().len();
        let input = match request.method() {
            Method::POST => Some(request.body()),
            Method::GET | Method::PUT => None,
        };

        debug!(
            "CGI {} {} (QUERY_STRING={:?}, CONTENT_LENGTH={})",
            request.method(),
            request.path(),
            request.query_string(),
            content_length
        );

        let process = CgiProcess::spawn(&script, request.query_string(), content_length, cancel)?;
        let output = process.run(input)?;

        Ok(Response::new(StatusCode::Ok)
            .with_header("Content-Type", content_type(extension_of(&script)))
            .with_body_bytes(output))
    }
}

fn ensure_executable(script: &Path, url_path: &str) -> Result<(), HandlerError> {
    let metadata = script
        .metadata()
        .map_err(|_| HandlerError::Execution(format!("{} does not exist", url_path)))?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(HandlerError::Execution(format!("{} is not executable", url_path)));
    }
    Ok(())
}
