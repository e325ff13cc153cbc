//! # Pool de Workers
//! src/workers/pool.rs
//!
//! N threads consumen tareas de una `TaskQueue` compartida, ejecutan el
//! router y publican el resultado como `Completion` en un canal mpsc. Tras
//! cada envío se despierta al reactor escribiendo en su eventfd.
//!
//! Una tarea es una copia de valores (id, generación, operación, bytes): el
//! worker nunca toca la conexión ni su socket.

use crate::handlers::CgiCancel;
use crate::router::{finish_response, Operation, Router};
use crate::server::waker::Waker;
use crate::workers::queue::{PushError, TaskQueue};
use crate::error::HandlerError;
use log::{debug, error, info, warn};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{SendError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Unidad de trabajo enviada por el reactor
#[derive(Debug)]
pub struct Task {
    pub conn_id: u64,
    pub generation: u64,
    pub operation: Operation,
    pub bytes: Vec<u8>,
    pub cancel: Option<CgiCancel>,
}

/// Resultado de una tarea
#[derive(Debug)]
pub struct Completion {
    pub conn_id: u64,
    pub generation: u64,
    pub bytes: Vec<u8>,
    pub keep_alive: bool,
}

/// Lado emisor del canal de resultados; cada envío despierta al reactor
#[derive(Clone)]
pub struct CompletionSender {
    tx: Sender<Completion>,
    waker: Arc<Waker>,
}

impl CompletionSender {
    pub fn new(tx: Sender<Completion>, waker: Arc<Waker>) -> Self {
        Self { tx, waker }
    }

    pub fn send(&self, completion: Completion) -> Result<(), SendError<Completion>> {
        self.tx.send(completion)?;
        if let Err(e) = self.waker.wake() {
            warn!("Failed to wake reactor: {}", e);
        }
        Ok(())
    }
}

/// Pool de threads de tamaño fijo
pub struct WorkerPool {
    queue: TaskQueue<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        size: usize,
        capacity: usize,
        router: Arc<Router>,
        completions: CompletionSender,
    ) -> io::Result<Self> {
        let queue = TaskQueue::new(capacity);
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let queue = queue.clone();
            let router = Arc::clone(&router);
            let completions = completions.clone();

            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, queue, router, completions))?;
            workers.push(handle);
        }

        info!("Worker pool started: {} threads, queue capacity {}", size, capacity);
        Ok(Self { queue, workers })
    }

    /// Encola una tarea sin bloquear; la devuelve si la cola está llena o cerrada
    pub fn submit(&self, task: Task) -> Result<(), PushError<Task>> {
        self.queue.push(task)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Descarta las tareas pendientes y espera a que terminen las que están
    /// en curso. Idempotente.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        let dropped = self.queue.close();
        if dropped > 0 {
            info!("Dropped {} queued tasks", dropped);
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, queue: TaskQueue<Task>, router: Arc<Router>, completions: CompletionSender) {
    debug!("Worker {} ready", id);

    while let Some(task) = queue.pop() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            router.handle(task.operation, &task.bytes, task.cancel.as_ref())
        }));

        let (bytes, keep_alive) = outcome.unwrap_or_else(|_| {
            error!("Worker {} panicked handling connection {}", id, task.conn_id);
            let response = HandlerError::Execution("internal error".to_string()).into_response();
            (finish_response(response, "HTTP/1.1", false), false)
        });

        let completion = Completion {
            conn_id: task.conn_id,
            generation: task.generation,
            bytes,
            keep_alive,
        };

        if completions.send(completion).is_err() {
            debug!("Worker {}: reactor gone, exiting", id);
            break;
        }
    }

    debug!("Worker {} exiting", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryRecordStore;
    use std::sync::mpsc;
    use std::time::Duration;

    fn pool(size: usize, capacity: usize) -> (WorkerPool, mpsc::Receiver<Completion>, Arc<Waker>) {
        let mut config = Config::default();
        config.root = "/nonexistent-root".into();
        let router = Arc::new(Router::new(&config, Arc::new(MemoryRecordStore::new())));
        let waker = Arc::new(Waker::new().unwrap());
        let (tx, rx) = mpsc::channel();
        let sender = CompletionSender::new(tx, Arc::clone(&waker));
        (WorkerPool::new(size, capacity, router, sender).unwrap(), rx, waker)
    }

    fn task(conn_id: u64, generation: u64) -> Task {
        Task {
            conn_id,
            generation,
            operation: Operation::Static,
            bytes: b"GET /missing.html HTTP/1.1\r\n\r\n".to_vec(),
            cancel: None,
        }
    }

    #[test]
    fn test_completion_carries_identity() {
        let (mut pool, rx, _waker) = pool(2, 8);
        pool.submit(task(42, 3)).unwrap();

        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.conn_id, 42);
        assert_eq!(completion.generation, 3);
        assert!(completion.keep_alive);
        assert!(completion.bytes.starts_with(b"HTTP/1.1 404 Not Found\r\n"));

        pool.shutdown();
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let (mut pool, _rx, _waker) = pool(1, 8);
        pool.shutdown();
        assert!(matches!(pool.submit(task(1, 0)), Err(PushError::Closed(_))));
    }

    #[test]
    fn test_all_tasks_complete() {
        let (mut pool, rx, _waker) = pool(4, 64);
        for id in 0..32 {
            pool.submit(task(id, 0)).unwrap();
        }

        let mut seen: Vec<u64> = (0..32)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().conn_id)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());

        pool.shutdown();
    }
}
