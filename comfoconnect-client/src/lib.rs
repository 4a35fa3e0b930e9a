//! Client for the Zehnder ComfoConnect LAN C bridge.
//!
//! The bridge exposes a ComfoAir Q ventilation unit over TCP. This crate
//! discovers bridges, opens a session (registering the client identity when
//! needed), issues commands, delivers pushed sensor values to a callback and
//! keeps the session alive across connection failures.
//!
//! # Example
//!
//! ```no_run
//! use comfoconnect::{discover, ComfoConnect, SessionConfig, DEFAULT_DISCOVERY_TIMEOUT};
//!
//! # async fn run() -> comfoconnect::Result<()> {
//! let bridges = discover(None, DEFAULT_DISCOVERY_TIMEOUT).await?;
//! let Some(bridge) = bridges.first() else { return Ok(()) };
//!
//! let mut client = ComfoConnect::new(bridge, SessionConfig::default());
//! client.set_notification_callback(|sensor, value| println!("{sensor}: {value:?}"));
//!
//! let version = client.connect(false).await?;
//! println!("Bridge serial {}", version.serial_number);
//!
//! client.subscribe(121, None).await?;
//! # client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod sensors;

pub use client::{
    ComfoConnect, Connector, DeviceTime, Notification, ReferenceWidth, RegisteredApp,
    SessionState, TcpConnector, VersionInfo, DEFAULT_ZONE,
};
pub use config::{load_config, load_config_or_env, load_from_env, BridgeConfig, ClientConfig, SessionConfig};
pub use discovery::{discover, DEFAULT_DISCOVERY_TIMEOUT};
pub use error::{ClientError, Result};
pub use sensors::{sensor_width, SensorSubscription, SensorValue};

pub use comfoconnect_protocol::{BridgeDescriptor, DeviceId};
