//! Operation tag ↔ payload schema registry.
//!
//! The registry is built once on first use and never mutated afterwards.
//! Tag → schema lookups go through [`lookup`]; schema → tag through
//! [`Payload::operation_type`].

use std::collections::HashMap;

use bytes::BytesMut;
use once_cell::sync::Lazy;
use prost::Message;

use crate::schema;
use crate::types::OperationType;

/// Decoder for one payload schema.
pub type DecodeFn = fn(&[u8]) -> Result<Payload, prost::DecodeError>;

/// Registry entry for a single operation tag.
#[derive(Clone, Copy)]
pub struct SchemaEntry {
    /// Schema name, for logs.
    pub name: &'static str,
    pub decode: DecodeFn,
}

fn decode_as<M>(buf: &[u8]) -> Result<Payload, prost::DecodeError>
where
    M: Message + Default + Into<Payload>,
{
    M::decode(buf).map(Into::into)
}

macro_rules! payloads {
    ($($name:ident),* $(,)?) => {
        /// A decoded payload, one variant per registered schema.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Payload {
            $($name(schema::$name),)*
        }

        impl Payload {
            /// Operation tag this payload travels under.
            pub fn operation_type(&self) -> OperationType {
                match self {
                    $(Payload::$name(_) => OperationType::$name,)*
                }
            }

            /// Serialize the payload record.
            pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), prost::EncodeError> {
                match self {
                    $(Payload::$name(m) => m.encode(buf),)*
                }
            }

            /// Encoded size of the payload record.
            pub fn encoded_len(&self) -> usize {
                match self {
                    $(Payload::$name(m) => m.encoded_len(),)*
                }
            }
        }

        $(
            impl From<schema::$name> for Payload {
                fn from(m: schema::$name) -> Self {
                    Payload::$name(m)
                }
            }
        )*

        fn schema_entries() -> Vec<(OperationType, SchemaEntry)> {
            vec![
                $((
                    OperationType::$name,
                    SchemaEntry {
                        name: stringify!($name),
                        decode: decode_as::<schema::$name>,
                    },
                ),)*
            ]
        }
    };
}

payloads! {
    RegisterAppRequest,
    RegisterAppConfirm,
    StartSessionRequest,
    StartSessionConfirm,
    CloseSessionRequest,
    CloseSessionConfirm,
    ListRegisteredAppsRequest,
    ListRegisteredAppsConfirm,
    DeregisterAppRequest,
    DeregisterAppConfirm,
    VersionRequest,
    VersionConfirm,
    KeepAlive,
    GatewayNotification,
    CnTimeRequest,
    CnTimeConfirm,
    CnNodeRequest,
    CnNodeNotification,
    CnRmiRequest,
    CnRmiResponse,
    CnRmiAsyncRequest,
    CnRmiAsyncConfirm,
    CnRmiAsyncResponse,
    CnRpdoRequest,
    CnRpdoConfirm,
    CnRpdoNotification,
    CnAlarmNotification,
}

static SCHEMAS: Lazy<HashMap<OperationType, SchemaEntry>> =
    Lazy::new(|| schema_entries().into_iter().collect());

static CONFIRMS: Lazy<HashMap<OperationType, OperationType>> = Lazy::new(|| {
    use OperationType::*;
    [
        (RegisterAppRequest, RegisterAppConfirm),
        (StartSessionRequest, StartSessionConfirm),
        (CloseSessionRequest, CloseSessionConfirm),
        (ListRegisteredAppsRequest, ListRegisteredAppsConfirm),
        (DeregisterAppRequest, DeregisterAppConfirm),
        (VersionRequest, VersionConfirm),
        (CnTimeRequest, CnTimeConfirm),
        (CnRmiRequest, CnRmiResponse),
        (CnRmiAsyncRequest, CnRmiAsyncConfirm),
        (CnRpdoRequest, CnRpdoConfirm),
    ]
    .into_iter()
    .collect()
});

/// Look up the schema registered for an operation tag.
pub fn lookup(op: OperationType) -> Option<&'static SchemaEntry> {
    SCHEMAS.get(&op)
}

/// The reply type the bridge answers a request with, if it answers at all.
pub fn confirm_type(request: OperationType) -> Option<OperationType> {
    CONFIRMS.get(&request).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_bidirectional() {
        for (op, entry) in SCHEMAS.iter() {
            let payload = (entry.decode)(&[]).unwrap();
            assert_eq!(payload.operation_type(), *op, "schema {}", entry.name);
        }
    }

    #[test]
    fn test_unregistered_tags() {
        assert!(lookup(OperationType::CnFupReadRequest).is_none());
        assert!(lookup(OperationType::NoOperation).is_none());
        assert!(lookup(OperationType::FactoryReset).is_none());
    }

    #[test]
    fn test_confirm_types() {
        assert_eq!(
            confirm_type(OperationType::VersionRequest),
            Some(OperationType::VersionConfirm)
        );
        assert_eq!(
            confirm_type(OperationType::CnRmiRequest),
            Some(OperationType::CnRmiResponse)
        );
        assert_eq!(confirm_type(OperationType::KeepAlive), None);
        for confirm in CONFIRMS.values() {
            assert!(lookup(*confirm).is_some());
        }
    }
}
