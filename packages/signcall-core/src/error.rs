//! # Error Handling
//!
//! Error types for the SignCall client library.
//!
//! ```text
//! Error
//! ├── Call Errors       (100-199)  collisions, wrong state, not registered
//! ├── Media Errors      (200-299)  camera / microphone acquisition
//! ├── Peer Errors       (300-399)  peer engine creation and signal application
//! ├── Channel Errors    (400-499)  WebSocket connection to the relay
//! ├── Gesture Errors    (500-599)  recognition service requests
//! └── Internal          (900-999)  serialization
//! ```
//!
//! Relay-side chat validation failures are not part of this enum. They
//! arrive as [`crate::protocol::MessageErrorKind`] inside a `messageError`
//! event and never end a call.

use thiserror::Error;

/// Result type alias for SignCall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client library
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Call Errors (100-199)
    // ========================================================================

    /// A call is already ongoing; a second one cannot be started
    #[error("Already in another call")]
    AlreadyInCall,

    /// The operation needs an ongoing call
    #[error("No active call")]
    NoActiveCall,

    /// The local user is not in the relay's presence listing yet
    #[error("Local user is not registered with the relay")]
    NotRegistered,

    /// The call target is the local user
    #[error("Cannot call yourself")]
    CannotCallSelf,

    /// The operation does not apply to the current call state
    #[error("Cannot {action} while {state}")]
    InvalidState {
        /// What was attempted
        action: &'static str,
        /// State name at the time
        state: &'static str,
    },

    // ========================================================================
    // Media Errors (200-299)
    // ========================================================================

    /// Camera or microphone could not be acquired
    #[error("Media devices unavailable: {0}")]
    MediaUnavailable(String),

    // ========================================================================
    // Peer Errors (300-399)
    // ========================================================================

    /// The peer engine refused to create a connection
    #[error("Failed to create peer connection: {0}")]
    PeerCreationFailed(String),

    /// The peer engine rejected remote signal data
    #[error("Failed to apply signal: {0}")]
    SignalRejected(String),

    // ========================================================================
    // Channel Errors (400-499)
    // ========================================================================

    /// The signaling channel is gone
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// WebSocket connect or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // ========================================================================
    // Gesture Errors (500-599)
    // ========================================================================

    /// Feature vector has the wrong length
    #[error("Expected {expected} gesture features, got {actual}")]
    InvalidFeatures {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Recognition service request failed
    #[error("Gesture service error: {0}")]
    GestureService(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Numeric code, grouped by category as in the module docs.
    pub fn code(&self) -> i32 {
        match self {
            // Call (100-199)
            Error::AlreadyInCall => 100,
            Error::NoActiveCall => 101,
            Error::NotRegistered => 102,
            Error::InvalidState { .. } => 103,
            Error::CannotCallSelf => 104,

            // Media (200-299)
            Error::MediaUnavailable(_) => 200,

            // Peer (300-399)
            Error::PeerCreationFailed(_) => 300,
            Error::SignalRejected(_) => 301,

            // Channel (400-499)
            Error::ChannelClosed => 400,
            Error::WebSocket(_) => 401,

            // Gesture (500-599)
            Error::InvalidFeatures { .. } => 500,
            Error::GestureService(_) => 501,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
        }
    }

    /// Errors the user should see as a notification rather than a log line.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::AlreadyInCall
                | Error::CannotCallSelf
                | Error::MediaUnavailable(_)
                | Error::NotRegistered
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::GestureService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::AlreadyInCall.code(), 100);
        assert_eq!(Error::CannotCallSelf.code(), 104);
        assert_eq!(Error::MediaUnavailable("no camera".into()).code(), 200);
        assert_eq!(Error::SignalRejected("bad sdp".into()).code(), 301);
        assert_eq!(Error::ChannelClosed.code(), 400);
        assert_eq!(
            Error::InvalidFeatures {
                expected: 63,
                actual: 2
            }
            .code(),
            500
        );
        assert_eq!(Error::SerializationError("x".into()).code(), 900);
    }

    #[test]
    fn test_user_facing_errors() {
        assert!(Error::AlreadyInCall.is_user_facing());
        assert!(Error::CannotCallSelf.is_user_facing());
        assert!(Error::MediaUnavailable("denied".into()).is_user_facing());
        assert!(!Error::ChannelClosed.is_user_facing());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            action: "accept a call",
            state: "idle",
        };
        assert_eq!(err.to_string(), "Cannot accept a call while idle");
    }
}
