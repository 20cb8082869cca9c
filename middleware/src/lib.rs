//! # middleware
//!
//! Gates that run between handler selection and invocation: anti-spam throttling and update logging.

pub mod antispam;
mod antispam_middleware;
mod logging;

#[cfg(test)]
mod test;

pub use antispam::{
    AntiSpamConfig, AntiSpamConfigError, AntiSpamManager, SpamRecord, SpamVerdict, PRUNE_EVERY,
};
pub use antispam_middleware::AntiSpamMiddleware;
pub use logging::LoggingMiddleware;
