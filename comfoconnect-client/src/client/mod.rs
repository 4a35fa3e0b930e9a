//! Connection to a bridge: framed transport, reference numbering and the
//! session built on them.

pub mod reference;
pub mod session;
pub mod transport;

pub use reference::{ReferenceCounter, ReferenceWidth};
pub use session::{
    ComfoConnect, DeviceTime, EventCallback, Notification, RegisteredApp, SensorCallback,
    SessionState, VersionInfo, DEFAULT_ZONE,
};
pub use transport::{Connector, TcpConnector, Transport};
