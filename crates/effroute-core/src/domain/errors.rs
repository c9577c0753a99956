//! Errors - エラー型と分類
//!
//! リクエスト処理中に発生する失敗はすべて `EffrouteError` に集約され、
//! Error Pipeline に届く直前に `ErrorEnvelope` で包まれる。

use std::net::SocketAddr;

use thiserror::Error;

use super::context::AmbientContext;

/// Boxed error used as the `source` of a handler failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T, E = EffrouteError> = std::result::Result<T, E>;

/// Every failure the adapter can produce.
#[derive(Debug, Error)]
pub enum EffrouteError {
    /// Registry lookup miss.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The synthesis pathway was entered without a body.
    #[error("`body` cannot be undefined. Are you using the `send()` function?")]
    MissingResponseBody,

    /// Raised by a script, a plain handler or a resolver.
    #[error(transparent)]
    Handler(#[from] HandlerFailure),

    #[error("json decode: {0}")]
    Decode(#[from] serde_json::Error),

    /// An `Effects` handle was used after its interpreter went away.
    #[error("effect script is not running under an interpreter")]
    Detached,

    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

impl EffrouteError {
    /// Shorthand for `HandlerFailure::new(message).into()`.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(HandlerFailure::new(message))
    }

    /// HTTP status the failure asked for, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Handler(failure) => failure.status(),
            _ => None,
        }
    }
}

/// A failure raised by user code, optionally carrying an HTTP status.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerFailure {
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<BoxError>,
}

impl HandlerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Wrap an arbitrary error, keeping its message.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            status: None,
            source: Some(Box::new(error)),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Listener bind/serve/close failures surfaced from `start` and `stop`.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    Join(String),

    #[error("server is already listening on {0}")]
    AlreadyListening(SocketAddr),

    #[error("server has been stopped")]
    Stopped,
}

/// A failure caught at the request boundary.
///
/// The ambient context is attached when the failure was raised inside effect
/// interpretation; plain handlers produce envelopes without it.
#[derive(Debug)]
pub struct ErrorEnvelope {
    error: EffrouteError,
    ambient: Option<AmbientContext>,
}

impl ErrorEnvelope {
    pub fn new(error: EffrouteError) -> Self {
        Self {
            error,
            ambient: None,
        }
    }

    pub fn with_ambient(mut self, ambient: AmbientContext) -> Self {
        self.ambient = Some(ambient);
        self
    }

    pub fn error(&self) -> &EffrouteError {
        &self.error
    }

    pub fn ambient(&self) -> Option<&AmbientContext> {
        self.ambient.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.error.status()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn into_error(self) -> EffrouteError {
        self.error
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ErrorEnvelope {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<EffrouteError> for ErrorEnvelope {
    fn from(error: EffrouteError) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handler_failure_displays_its_message_only() {
        let err = EffrouteError::handler("oops");
        assert_eq!(err.to_string(), "oops");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn status_is_carried_through_the_envelope() {
        let err: EffrouteError = HandlerFailure::new("gone").with_status(410).into();
        let envelope = ErrorEnvelope::new(err);
        assert_eq!(envelope.status(), Some(410));
        assert_eq!(envelope.message(), "gone");
        assert!(envelope.ambient().is_none());
    }

    #[test]
    fn envelope_keeps_attached_context() {
        let envelope = ErrorEnvelope::new(EffrouteError::UnknownCommand("nope".into()))
            .with_ambient(AmbientContext::new(json!({ "value": "foobar" })));
        assert_eq!(envelope.ambient().unwrap().get("value"), Some(&json!("foobar")));
        assert_eq!(envelope.message(), "unknown command: nope");
    }

    #[test]
    fn from_error_keeps_source() {
        let io = std::io::Error::other("disk on fire");
        let failure = HandlerFailure::from_error(io);
        assert_eq!(failure.message(), "disk on fire");
        assert!(std::error::Error::source(&failure).is_some());
    }
}
