//! Error types for the engine.

use thiserror::Error;

/// Errors surfaced by board and shape operations.
///
/// Most anomalies (dangling anchors, unknown records, malformed property text)
/// degrade silently; only document failures and caller contract violations
/// end up here.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("CRDT operation failed: {0}")]
    Crdt(#[from] loro::LoroError),
    #[error("Point {index} is not an endpoint and cannot be snapped to an anchor")]
    NotAnEndpoint { index: usize },
    #[error("Shape is not on this board")]
    UnknownShape,
}

/// Result type for board operations.
pub type Result<T> = std::result::Result<T, BoardError>;
