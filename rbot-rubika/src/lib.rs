//! # rbot-rubika
//!
//! Rubika transport: update adapters, the HTTP [`RubikaClient`] (implements
//! [`rbot_core::Bot`] and [`rbot_core::UpdateSource`]), env config, and the [`Poller`] that
//! ties fetch, dispatch and offset commits together.

pub mod adapters;
mod client;
mod config;
mod poller;

pub use adapters::{parse_batch, parse_update};
pub use client::{RubikaClient, DEFAULT_API_URL};
pub use config::RubikaConfig;
pub use poller::{
    Backoff, BatchReport, ExecutionMode, ParseExecutionModeError, Poller, PollerConfig,
    PollerHandle, PollerState,
};
