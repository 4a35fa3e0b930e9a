//! Client-side errors.

use std::io;

use thiserror::Error;

use comfoconnect_protocol::{OperationType, ProtocolError, ResultCode};

/// Errors returned by session, transport and discovery operations.
#[derive(Error, Debug)]
pub enum ClientError {
    // Result codes reported by the bridge
    #[error("Bridge rejected the request as malformed")]
    BadRequest,

    #[error("Bridge reported an internal error")]
    InternalError,

    #[error("Bridge cannot reach the ventilation unit")]
    NotReachable,

    /// Another client holds the session; retry with takeover to evict it.
    #[error("Another session is active on device {device_name:?}")]
    OtherSession { device_name: String },

    /// Identity is not registered, or the PIN was wrong.
    #[error("Not allowed: identity not registered or PIN rejected")]
    NotAllowed,

    #[error("Bridge has no resources left for this request")]
    NoResources,

    #[error("Requested object does not exist")]
    NotExists,

    #[error("Remote method invocation failed (code {0})")]
    RmiError(u32),

    // Transport
    #[error("Not connected")]
    NotConnected,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Request timed out")]
    Timeout,

    // Local validation
    #[error("Unknown sensor {0}: no value width known")]
    UnknownSensor(u32),

    #[error("Unexpected reply {actual:?}, expected {expected:?}")]
    UnexpectedReply {
        expected: OperationType,
        actual: OperationType,
    },

    #[error("Refusing to deregister the session's own identity")]
    SelfDeregistration,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Map a non-OK result code to its error. Returns None for OK.
    pub fn from_result(code: ResultCode, device_name: Option<String>) -> Option<Self> {
        Some(match code {
            ResultCode::Ok => return None,
            ResultCode::BadRequest => ClientError::BadRequest,
            ResultCode::InternalError => ClientError::InternalError,
            ResultCode::NotReachable => ClientError::NotReachable,
            ResultCode::OtherSession => ClientError::OtherSession {
                device_name: device_name.unwrap_or_default(),
            },
            ResultCode::NotAllowed => ClientError::NotAllowed,
            ResultCode::NoResources => ClientError::NoResources,
            ResultCode::NotExist => ClientError::NotExists,
            ResultCode::RmiError => ClientError::RmiError(0),
        })
    }

    /// True when the error means the socket can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected | ClientError::ConnectionLost(_) | ClientError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        assert!(ClientError::from_result(ResultCode::Ok, None).is_none());
        assert!(matches!(
            ClientError::from_result(ResultCode::NotAllowed, None),
            Some(ClientError::NotAllowed)
        ));
        match ClientError::from_result(ResultCode::OtherSession, Some("phone".into())) {
            Some(ClientError::OtherSession { device_name }) => assert_eq!(device_name, "phone"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_is_transport() {
        assert!(ClientError::ConnectionLost("eof".into()).is_transport());
        assert!(ClientError::NotConnected.is_transport());
        assert!(!ClientError::Timeout.is_transport());
        assert!(!ClientError::BadRequest.is_transport());
    }
}
