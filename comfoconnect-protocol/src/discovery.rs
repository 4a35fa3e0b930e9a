//! Discovery datagram format.
//!
//! The probe is a `DiscoveryOperation` carrying an empty search request;
//! bridges answer with a `DiscoveryOperation` carrying a search response.

use std::net::IpAddr;

use bytes::Bytes;
use prost::Message;

use crate::error::ProtocolError;
use crate::schema::{DiscoveryOperation, SearchGatewayRequest, SearchGatewayResponse};
use crate::types::{BridgeDescriptor, DeviceId};

/// Encode the discovery probe datagram.
pub fn encode_probe() -> Bytes {
    DiscoveryOperation {
        search_gateway_request: Some(SearchGatewayRequest {}),
        search_gateway_response: None,
    }
    .encode_to_vec()
    .into()
}

/// Encode the reply a bridge sends for a probe.
pub fn encode_search_response(bridge: &BridgeDescriptor) -> Bytes {
    DiscoveryOperation {
        search_gateway_request: None,
        search_gateway_response: Some(SearchGatewayResponse {
            ipaddress: bridge.address.to_string(),
            uuid: bridge.id.as_bytes().to_vec(),
            version: bridge.version,
            r#type: None,
        }),
    }
    .encode_to_vec()
    .into()
}

/// Parse a discovery reply into a bridge descriptor.
pub fn decode_search_response(datagram: &[u8]) -> Result<BridgeDescriptor, ProtocolError> {
    let op = DiscoveryOperation::decode(datagram)?;
    let response = op
        .search_gateway_response
        .ok_or_else(|| ProtocolError::DecodeError("not a search response".to_string()))?;

    let address: IpAddr = response.ipaddress.parse().map_err(|_| {
        ProtocolError::DecodeError(format!("invalid bridge address {:?}", response.ipaddress))
    })?;
    let id = DeviceId::from_slice(&response.uuid)?;

    Ok(BridgeDescriptor {
        address,
        id,
        version: response.version,
    })
}
