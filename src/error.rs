//! Error taxonomy for the pool daemon.
//!
//! The router and background tasks never propagate these past their own
//! call site: every variant maps to "drop the message" or
//! "log and retry next tick", except [`DaemonError::SigningKeyUnavailable`]
//! which is fatal at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("transport read error: {0}")]
    TransportRead(String),

    #[error("content store fetch miss for cid {0}")]
    FetchMiss(String),

    #[error("signature invalid for identity {0}")]
    InvalidSignature(String),

    #[error("structural invalidity: {0}")]
    Structural(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("signing key unavailable")]
    SigningKeyUnavailable,

    #[error("duplicate announcement for cid {0}")]
    DuplicateAnnouncement(String),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
