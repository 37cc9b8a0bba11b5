// ABOUTME: Crate-wide error types for the mapping and skeleton-detection transport
// ABOUTME: Mirrors smpp::client::error in shape: one thiserror enum, one Result alias

use std::io;
use thiserror::Error;

/// Error type for `smg-comms` operations.
///
/// Covers connection setup, wire-protocol failures and caller misuse of the
/// message types. I/O errors encountered mid-connection are not represented
/// here: per the protocol design, a failed read or write demotes the
/// connection to "not ok" and is surfaced as `false`/`None` from the next
/// call that inspects connection state, rather than propagated as an `Err`.
#[derive(Debug, Error)]
pub enum Error {
    /// Dialing the server/service endpoint failed.
    #[error("could not connect to {0}")]
    ConnectRefused(std::net::SocketAddr),

    /// A required write or the ack/response that follows it failed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `BinaryMaskMessage::set_mask` was given a mask of the wrong shape.
    #[error("mask has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// `SimpleMessage` was asked to hold a type the wire format doesn't know.
    #[error("unsupported SimpleMessage type")]
    UnsupportedSimpleType,

    /// Ambient I/O failure not tied to a specific connection's state machine
    /// (e.g. binding the listening socket).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for `smg-comms` operations.
pub type Result<T> = std::result::Result<T, Error>;
