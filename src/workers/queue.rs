//! # Cola de Tareas
//! src/workers/queue.rs
//!
//! Cola FIFO thread-safe (Mutex + Condvar) con capacidad máxima. `push` nunca
//! bloquea: si la cola está llena devuelve la tarea para que el reactor
//! responda 503. Al cerrarla, las tareas no iniciadas se descartan y los
//! workers en espera despiertan con `None`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Motivo por el que no se encoló; devuelve el item
#[derive(Debug)]
pub enum PushError<T> {
    /// Se alcanzó la capacidad máxima (backpressure)
    Full(T),

    /// La cola está cerrada (apagado en curso)
    Closed(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Cola FIFO acotada
pub struct TaskQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,
    condvar: Arc<Condvar>,
    max_capacity: usize,
}

impl<T> TaskQueue<T> {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            })),
            condvar: Arc::new(Condvar::new()),
            max_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Encola sin bloquear
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();

        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.max_capacity {
            return Err(PushError::Full(item));
        }

        state.items.push_back(item);

        // Notificar a un worker esperando
        self.condvar.notify_one();
        Ok(())
    }

    /// Desencola en orden FIFO. Bloquea hasta que haya un item; `None` si
    /// la cola se cerró.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();

        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Cierra la cola y descarta lo pendiente. Devuelve cuántos se descartaron.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.items.len();
        state.items.clear();
        self.condvar.notify_all();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            condvar: Arc::clone(&self.condvar),
            max_capacity: self.max_capacity,
        }
    }
}
