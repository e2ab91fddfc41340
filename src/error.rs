//! Error types for peripheral sessions.
//!
//! Most failure conditions in a peripheral session are absorbed locally: a
//! send that cannot go out is simply dropped and reported as a
//! [`crate::session::SendOutcome`]. The types here exist for the cases that do
//! surface (link loss, configuration, transport setup) and for the codecs,
//! which report malformed frames with a [`DecodeError`] the session logs and
//! discards.
//!
//! ## Error Categories
//!
//! - **Link Errors**: No transport, link loss, stalled acknowledgments
//! - **Local Rejections**: Busy gate and rate limiter refusals
//! - **Codec Errors**: Malformed inbound frames, unencodable commands
//! - **Setup Errors**: Scan failures and invalid configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use junklink::LinkError;
//! use std::time::Duration;
//!
//! let error = LinkError::LinkLoss { silent_for: Duration::from_millis(4500) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for peripheral sessions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("No transport connection to the peripheral")]
    TransportUnavailable,

    #[error("Peripheral is busy with an in-flight command")]
    Busy,

    #[error("Send rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Peripheral stopped sending data for {silent_for:?}")]
    LinkLoss { silent_for: Duration },

    #[error("Write acknowledgment not received after {waited:?}")]
    StalledAck { waited: Duration },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Scan failed: {reason}")]
    ScanFailed { reason: String },

    #[error("Invalid session configuration: {details}")]
    Config { details: String },

    #[error("Session task has shut down")]
    SessionClosed,
}

/// Inbound frame could not be decoded.
///
/// The session discards the frame and leaves the telemetry snapshot untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Empty frame")]
    Empty,

    #[error("Frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:#06x}, found {found:#06x}")]
    Checksum { expected: u16, found: u16 },

    #[error("Malformed frame: {details}")]
    Malformed { details: String },
}

/// A command could not be serialized into a wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("Payload value {value} at index {index} outside {min}..={max}")]
    ValueOutOfRange { index: usize, value: i64, min: i64, max: i64 },

    #[error("Payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLong { len: usize, max: usize },
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::TransportUnavailable => true,
            LinkError::Busy => true,
            LinkError::RateLimited => true,
            LinkError::Decode(_) => true,
            LinkError::Encode(_) => false,
            LinkError::LinkLoss { .. } => true,
            LinkError::StalledAck { .. } => true,
            LinkError::Transport { .. } => true,
            LinkError::ScanFailed { .. } => true,
            LinkError::Config { .. } => false,
            LinkError::SessionClosed => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::TransportUnavailable => vec![
                "Scan for the peripheral and connect before sending",
                "Check that the peripheral is powered on",
            ],
            LinkError::Busy => vec![
                "Wait for the in-flight command to complete",
                "Space out successive block executions",
            ],
            LinkError::RateLimited => vec![
                "Reduce the command rate",
                "Retry on a later tick",
            ],
            LinkError::Decode(_) => vec![
                "Check that the codec matches the device family",
                "Verify the peripheral firmware version",
            ],
            LinkError::Encode(_) => vec![
                "Clamp command arguments to the device's legal range",
                "Shorten text payloads",
            ],
            LinkError::LinkLoss { .. } => vec![
                "Move the peripheral closer to the host",
                "Check the peripheral's battery",
                "Reconnect the peripheral",
            ],
            LinkError::StalledAck { .. } => vec![
                "Check that the peripheral is still powered",
                "Reconnect if acknowledgments keep stalling",
            ],
            LinkError::Transport { .. } => vec![
                "Check that the Bluetooth or bridge service is running",
                "Restart the transport and scan again",
            ],
            LinkError::ScanFailed { .. } => vec![
                "Make sure the peripheral is advertising",
                "Check Bluetooth permissions",
                "Scan again",
            ],
            LinkError::Config { .. } => vec![
                "Use non-zero timeouts and rate limits",
                "Compare the configuration against a device preset",
            ],
            LinkError::SessionClosed => vec!["Create a new session"],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for scan failures.
    pub fn scan_failed(reason: impl Into<String>) -> Self {
        LinkError::ScanFailed { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        LinkError::Config { details: details.into() }
    }
}

impl DecodeError {
    /// Fails with [`DecodeError::Truncated`] unless `data` holds at least `needed` bytes.
    pub fn require_len(data: &[u8], needed: usize) -> Result<(), DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        if data.len() < needed {
            return Err(DecodeError::Truncated { needed, actual: data.len() });
        }
        Ok(())
    }

    /// Helper constructor for malformed frames.
    pub fn malformed(details: impl Into<String>) -> Self {
        DecodeError::Malformed { details: details.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            needed in 1usize..64usize,
            actual in 1usize..64usize,
            expected in any::<u16>(),
            found in any::<u16>(),
          ) {
            let transport = LinkError::transport(reason.clone());
            prop_assert!(transport.to_string().contains(&reason));

            let truncated = DecodeError::Truncated { needed, actual };
            let msg = truncated.to_string();
            prop_assert!(msg.contains(&needed.to_string()));
            prop_assert!(msg.contains(&actual.to_string()));

            let checksum = DecodeError::Checksum { expected, found };
            let want = format!("{:#06x}", expected);
            prop_assert!(checksum.to_string().contains(&want));
          }

          #[test]
          fn require_len_never_accepts_short_buffers(
            data in prop::collection::vec(any::<u8>(), 0..32),
            needed in 1usize..48usize,
          ) {
            let result = DecodeError::require_len(&data, needed);
            prop_assert_eq!(result.is_ok(), data.len() >= needed);
          }
        }
    }

    #[test]
    fn empty_buffer_is_distinguished_from_truncated() {
        assert_eq!(DecodeError::require_len(&[], 4), Err(DecodeError::Empty));
        assert_eq!(
            DecodeError::require_len(&[1, 2], 4),
            Err(DecodeError::Truncated { needed: 4, actual: 2 })
        );
    }

    #[test]
    fn codec_errors_convert_into_link_errors() {
        let err: LinkError = DecodeError::Empty.into();
        assert!(matches!(err, LinkError::Decode(DecodeError::Empty)));

        let err: LinkError = EncodeError::PayloadTooLong { len: 30, max: 19 }.into();
        assert!(matches!(err, LinkError::Encode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LinkError>();

        let error = LinkError::transport("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let link_loss = LinkError::LinkLoss { silent_for: Duration::from_millis(4500) };
        let config = LinkError::config("zero timeout");

        assert!(link_loss.is_retryable());
        assert!(!config.is_retryable());

        for suggestion in link_loss.recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
        assert!(!config.recovery_suggestions().is_empty());
    }

    #[test]
    fn transport_source_is_preserved() {
        let io = std::io::Error::other("socket closed");
        let err = LinkError::transport_with_source("write failed", Box::new(io));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("socket closed"));
    }
}
