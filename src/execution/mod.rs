//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventBus, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{ActionScope, StageExecutor};
pub use scheduler::ExecutionScheduler;
