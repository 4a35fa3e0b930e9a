//! Wire protocol definitions for the Zehnder ComfoConnect LAN C bridge.
//!
//! This crate defines the binary envelope used between a client and the
//! bridge, the typed payload records it carries, and the discovery datagram
//! format. It performs no I/O.
//!
//! # Frame Format
//!
//! ```text
//! +--------+--------+--------+--------+------------+-------------+
//! | Length | Src    | Dst    | HdrLen | Header     | Payload     |
//! | u32 BE | 16 B   | 16 B   | u16 BE | (HdrLen B) | (variable)  |
//! +--------+--------+--------+--------+------------+-------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use comfoconnect_protocol::{decode_envelope, encode_envelope, DeviceId, Envelope};
//! use comfoconnect_protocol::schema::VersionRequest;
//!
//! let local: DeviceId = "00000000000000000000000000001337".parse().unwrap();
//! let bridge = DeviceId::new([0xAB; 16]);
//!
//! let msg = Envelope::request(local, bridge, 1, VersionRequest {});
//! let encoded = encode_envelope(&msg).unwrap();
//! let decoded = decode_envelope(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

pub mod codec;
pub mod discovery;
pub mod error;
pub mod registry;
pub mod schema;
pub mod types;

pub use codec::{
    decode_envelope, decode_length, encode_envelope, Envelope, Header, FRAME_LENGTH_SIZE,
};
pub use error::ProtocolError;
pub use registry::{confirm_type, Payload};
pub use types::{
    BridgeDescriptor, DeviceId, OperationType, ResultCode, BRIDGE_PORT, DEVICE_ID_LEN,
    DISCOVERY_PROBE, ENVELOPE_FIXED_LEN, MAX_FRAME_SIZE,
};
