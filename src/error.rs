//! Core error kinds shared by the overlays, the network fabric and the API.

use crate::ident::Ident;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the core. Soft outcomes (delete/update of a missing
/// key) are reported as `Ok(false)` by the API instead of an error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("node {0} is already part of the overlay")]
    DuplicateId(Ident),

    #[error("node {0} is not part of the overlay")]
    UnknownNode(Ident),

    #[error("no endpoint registered for node {0}")]
    UnknownPeer(Ident),

    #[error("routing from node {0} exhausted without converging")]
    UnreachableOwner(Ident),

    #[error("leave would remove the last node of the overlay")]
    EmptyOverlayForbidden,

    #[error("invalid overlay configuration: {0}")]
    InvalidConfig(String),

    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}
