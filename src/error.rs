//! Error types for the Canopy gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway core
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown path segment (provider, service, resource or attribute)
    #[error("not found: {0}")]
    NotFound(String),

    /// Access level insufficient for the requested method
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Write to an attribute whose policy forbids modification
    #[error("not modifiable: {0}")]
    NotModifiable(String),

    /// Write to a locked attribute (a trigger owns the value)
    #[error("locked: {0}")]
    Locked(String),

    /// Value rejected by type check or registered constraint
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Method invoked on a resource kind that does not support it
    #[error("method {method} not applicable to {uri}")]
    UnknownMethod {
        /// Method that was invoked
        method: String,
        /// Target resource URI
        uri: String,
    },

    /// No federation peer registered under the namespace
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Duplicate model-instance registration
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Unregistration of an unknown model instance
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// Malformed entity path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Operation on a closed or unknown session token
    #[error("session closed or unknown")]
    SessionClosed,

    /// Notification delivery failure reported by a sink
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// HTTP-style status code used by the northbound response envelope.
    ///
    /// `UnknownNamespace` maps to 404 so responses never reveal whether a
    /// namespace exists; listing APIs likewise fold `NotAuthorized` into
    /// silent omission.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_)
            | Self::InvalidPath(_)
            | Self::UnknownNamespace(_)
            | Self::NotRegistered(_) => 404,
            Self::NotAuthorized(_) | Self::SessionClosed => 403,
            Self::NotModifiable(_)
            | Self::Locked(_)
            | Self::InvalidValue(_)
            | Self::AlreadyRegistered(_) => 400,
            Self::UnknownMethod { .. } => 420,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::NotAuthorized("x".into()).status_code(), 403);
        assert_eq!(Error::NotModifiable("x".into()).status_code(), 400);
        assert_eq!(Error::Locked("x".into()).status_code(), 400);
        assert_eq!(Error::InvalidValue("x".into()).status_code(), 400);
        assert_eq!(
            Error::UnknownMethod {
                method: "GET".into(),
                uri: "/p/s/r".into()
            }
            .status_code(),
            420
        );
        assert_eq!(Error::UnknownNamespace("ns".into()).status_code(), 404);
    }
}
