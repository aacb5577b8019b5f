//! Wire format serialization abstraction
//!
//! # TCP Protocol Specification
//!
//! gati-odom uses a length-prefixed framing protocol for all TCP communication:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! ## Framing
//!
//! - **Length field**: 4-byte big-endian unsigned integer
//! - **Payload**: Serialized message in configured wire format
//! - **Maximum message size**: 1MB (1,048,576 bytes)
//! - **Byte order**: Network byte order (big-endian) for length prefix
//!
//! Outbound frames additionally carry a NUL-terminated topic string between
//! the length prefix and the payload (see `tcp_publisher`); inbound encoder
//! event frames are payload-only.
//!
//! ## Wire Formats
//!
//! Two wire formats are supported:
//!
//! ### JSON (Default)
//! - **Pros**: Human-readable, easy to debug, widely supported
//! - **Cons**: Larger message size, slower serialization
//! - **Use case**: Development, debugging, cross-language clients
//!
//! ### Postcard (Binary)
//! - **Pros**: Compact, fast serialization, type-safe
//! - **Cons**: Binary format, requires schema knowledge
//! - **Use case**: Production, high-frequency sensor streaming
//!
//! ## Error Handling
//!
//! - **Malformed length**: Connection closed
//! - **Oversized message**: Connection closed (security)
//! - **Deserialization failure**: Frame logged and discarded, connection remains open
//! - **Serialization failure**: Message skipped, error logged

use crate::error::{Error, Result};
use crate::streaming::messages::EncoderEvent;
use serde::Serialize;
use std::str::FromStr;

/// Maximum frame payload size accepted on any channel
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

impl FromStr for WireFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "postcard" => Ok(WireFormat::Postcard),
            other => Err(Error::InvalidConfig(format!(
                "unknown wire format '{}' (expected \"json\" or \"postcard\")",
                other
            ))),
        }
    }
}

/// Serializer that can handle both formats
#[derive(Clone)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Serialize an outbound message to bytes
    pub fn serialize<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize an inbound encoder event payload
    pub fn deserialize_event(&self, bytes: &[u8]) -> Result<EncoderEvent> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::messages::VelocityEstimate;

    fn sample_event() -> EncoderEvent {
        EncoderEvent {
            ticks: 310,
            duration_us: 1_000_000,
        }
    }

    #[test]
    fn test_event_round_trip_json() {
        let serializer = Serializer::new(WireFormat::Json);
        let bytes = serializer.serialize(&sample_event()).unwrap();
        let decoded = serializer.deserialize_event(&bytes).unwrap();
        assert_eq!(decoded, sample_event());
    }

    #[test]
    fn test_event_round_trip_postcard() {
        let serializer = Serializer::new(WireFormat::Postcard);
        let bytes = serializer.serialize(&sample_event()).unwrap();
        let decoded = serializer.deserialize_event(&bytes).unwrap();
        assert_eq!(decoded, sample_event());
    }

    #[test]
    fn test_estimate_covariance_survives_json() {
        let mut covariance = [[0.0; 6]; 6];
        for (i, row) in covariance.iter_mut().enumerate() {
            row[i] = 999.0;
        }
        covariance[0][0] = 1e-3;

        let estimate = VelocityEstimate {
            timestamp: 1_234_567,
            seq: 7,
            frame_id: "base_link".to_string(),
            linear: [0.5, 0.0, 0.0],
            angular: [0.0; 3],
            covariance,
        };

        let serializer = Serializer::new(WireFormat::Json);
        let bytes = serializer.serialize(&estimate).unwrap();
        let decoded: VelocityEstimate = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, estimate);
        assert_eq!(decoded.covariance[0][0], 1e-3);
        assert_eq!(decoded.covariance[5][5], 999.0);
        assert_eq!(decoded.covariance[0][1], 0.0);
    }

    #[test]
    fn test_wire_format_from_config_string() {
        assert_eq!("json".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!("JSON".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!(
            "postcard".parse::<WireFormat>().unwrap(),
            WireFormat::Postcard
        );
        assert!("msgpack".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let serializer = Serializer::new(WireFormat::Json);
        assert!(serializer.deserialize_event(b"not json at all").is_err());
    }
}
