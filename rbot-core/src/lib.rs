//! # rbot-core
//!
//! Core types and traits for the Rubika bot runtime: [`Update`], [`Offset`], [`Bot`],
//! [`UpdateSource`], [`Middleware`], error types and tracing initialization.
//! Transport-agnostic; used by rbot-dispatch, middleware, storage and rbot-rubika.

pub mod bot;
pub mod error;
pub mod logger;
pub mod types;

pub use bot::{Bot, UpdateSource};
pub use error::{HandlerError, RbotError, Result, TransportError};
pub use logger::init_tracing;
pub use types::{
    compare_ids, AuxData, ChatType, DispatchOutcome, FileRef, MediaKind, MessagePayload,
    Middleware, Offset, Update, UpdateBatch, UpdateKind,
};
