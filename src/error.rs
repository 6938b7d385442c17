//! Error handling for miner discovery, telemetry and control.
//!
//! Transport and parse failures are absorbed close to where they happen so
//! that one unreachable device never blocks reporting on the rest of a
//! fleet; the variants here surface the cases a caller can actually act on.

use std::net::IpAddr;

use thiserror::Error;

/// Result type alias for fleet operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Digest authentication errors
    #[error("digest auth failed: {0}")]
    Digest(#[from] diqwest::error::Error),

    /// Login or token errors on web control surfaces
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors from the socket channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A network operation ran past its deadline
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// The device answered but reported the command failed
    #[error("device at {ip} rejected command {command}: {message}")]
    Command {
        ip: IpAddr,
        command: String,
        message: String,
    },

    /// The driver has no way to perform the requested operation
    #[error("{driver} does not support {operation}")]
    NotSupported { driver: String, operation: String },

    /// Power balancing target below the group's combined minimum draw
    #[error("power target {target}W is below the group minimum of {minimum}W")]
    PowerTargetTooLow { target: f64, minimum: f64 },

    /// Power balancing target above the group's combined maximum draw
    #[error("power target {target}W is above the group maximum of {maximum}W")]
    PowerTargetTooHigh { target: f64, maximum: f64 },
}

impl Error {
    /// Create a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a device-rejected-command error
    pub fn command(ip: IpAddr, command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            ip,
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn not_supported(driver: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            driver: driver.into(),
            operation: operation.into(),
        }
    }
}
