//! # Workers
//!
//! - **queue**: cola FIFO acotada (Mutex + Condvar)
//! - **pool**: threads que ejecutan tareas y publican resultados al reactor

pub mod pool;
pub mod queue;

pub use pool::{Completion, CompletionSender, Task, WorkerPool};
pub use queue::{PushError, TaskQueue};
