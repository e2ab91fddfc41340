//! Session configuration and per-family presets.
//!
//! Configuration is plain data: every timing constant a session uses lives
//! here rather than in module-level globals, so independent sessions can run
//! side by side with different settings. Durations serialize as integer
//! milliseconds.
//!
//! ```rust
//! use junklink::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::from_yaml_str(
//!     "pending_write_timeout: 2000\nmax_sends_per_second: 20\n",
//! ).unwrap();
//! assert_eq!(config.pending_write_timeout, Duration::from_secs(2));
//! assert_eq!(config.max_sends_per_second, Some(20));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::{ScanFilter, WriteEncoding, WriteTarget};
use crate::{LinkError, Result};

/// Default bound on how long the busy gate waits for a write acknowledgment.
pub const DEFAULT_PENDING_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default silence after which an inbound-telemetry link is declared lost.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_millis(4500);

/// Timing and addressing for one [`crate::PeripheralSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pending-write watchdog: busy is forced clear after this long without an ack
    #[serde(with = "millis")]
    pub pending_write_timeout: Duration,

    /// Link-liveness watchdog; `None` disables link-loss detection
    #[serde(with = "opt_millis")]
    pub liveness_timeout: Option<Duration>,

    /// Give up on a scan that has not connected within this long
    #[serde(with = "opt_millis")]
    pub scan_timeout: Option<Duration>,

    /// Rolling one-second send cap; `None` disables rate limiting
    pub max_sends_per_second: Option<u32>,

    /// PIN offered when connecting to peripherals that require pairing
    pub pairing_secret: Option<String>,

    pub scan_filter: ScanFilter,

    /// Where frames are written and notifications are read
    pub write_target: WriteTarget,

    pub write_encoding: WriteEncoding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_write_timeout: DEFAULT_PENDING_WRITE_TIMEOUT,
            liveness_timeout: Some(DEFAULT_LIVENESS_TIMEOUT),
            scan_timeout: None,
            max_sends_per_second: None,
            pairing_secret: None,
            scan_filter: ScanFilter::Any,
            write_target: WriteTarget::stream(),
            write_encoding: WriteEncoding::Base64,
        }
    }
}

impl SessionConfig {
    /// Junkbot over BLE: semicolon-delimited text on characteristic 0xFFE1.
    ///
    /// The board does not stream telemetry unprompted, so link-loss detection
    /// is off.
    pub fn junkbot_ble() -> Self {
        Self {
            liveness_timeout: None,
            scan_filter: ScanFilter::BleServices { services: vec![0xFFE0] },
            write_target: WriteTarget::gatt(0xFFE0, 0xFFE1),
            write_encoding: WriteEncoding::Utf8,
            ..Self::default()
        }
    }

    /// micro:bit-style board streaming sensor frames over BLE.
    pub fn microbit() -> Self {
        Self {
            scan_filter: ScanFilter::BleServices { services: vec![0xF005] },
            write_target: WriteTarget::gatt(0xF005, 0x0001),
            ..Self::default()
        }
    }

    /// JB brick over classic Bluetooth (major class 8, minor class 1, PIN 1234).
    pub fn jb_bluetooth() -> Self {
        Self {
            liveness_timeout: None,
            max_sends_per_second: Some(40),
            pairing_secret: Some("1234".to_string()),
            scan_filter: ScanFilter::BluetoothClass { major: 8, minor: 1 },
            ..Self::default()
        }
    }

    /// Junkbot USB through the local WebSocket bridge.
    ///
    /// The bridge accepts a frame at most every 5 ms.
    pub fn junkbot_usb() -> Self {
        Self {
            liveness_timeout: None,
            max_sends_per_second: Some(200),
            write_encoding: WriteEncoding::Binary,
            ..Self::default()
        }
    }

    /// Parse and validate a YAML configuration.
    ///
    /// Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config(format!("YAML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero timeouts and a zero send rate.
    pub fn validate(&self) -> Result<()> {
        if self.pending_write_timeout.is_zero() {
            return Err(LinkError::config("pending_write_timeout must be non-zero"));
        }
        if self.liveness_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LinkError::config("liveness_timeout must be non-zero when set"));
        }
        if self.scan_timeout.is_some_and(|t| t.is_zero()) {
            return Err(LinkError::config("scan_timeout must be non-zero when set"));
        }
        if self.max_sends_per_second == Some(0) {
            return Err(LinkError::config("max_sends_per_second must be non-zero when set"));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
