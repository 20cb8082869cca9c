//! # rbot-dispatch
//!
//! Routes each update to the first matching handler. Filters decide the match, middleware gates
//! the call, and the [`ExecutionBridge`] runs cooperative and blocking handlers side by side.

mod bridge;
mod context;
mod dispatcher;
pub mod filter;
mod handler;
mod job;

pub use bridge::{BlockingBot, ExecutionBridge};
pub use context::Context;
pub use dispatcher::{ButtonMatcher, DispatchKind, Dispatcher, DispatcherBuilder};
pub use filter::Filter;
pub use handler::{BlockingHandler, Callable, Handler};
pub use job::Job;

// Integration tests live in tests/dispatcher_test.rs
