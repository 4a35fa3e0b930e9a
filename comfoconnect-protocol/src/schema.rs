//! Payload records exchanged with the bridge.
//!
//! These mirror the bridge's protobuf schema (proto2). Field tags are part of
//! the wire format and must not change. Only the records the client sends or
//! receives are defined here; see [`crate::registry`] for the tag mapping.

// Header

/// Frame header: operation tag, result code and correlation reference.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayOperation {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub result: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub result_description: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub reference: Option<u32>,
}

// Discovery

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryOperation {
    #[prost(message, optional, tag = "1")]
    pub search_gateway_request: Option<SearchGatewayRequest>,
    #[prost(message, optional, tag = "2")]
    pub search_gateway_response: Option<SearchGatewayResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchGatewayRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchGatewayResponse {
    #[prost(string, required, tag = "1")]
    pub ipaddress: String,
    #[prost(bytes = "vec", required, tag = "2")]
    pub uuid: Vec<u8>,
    #[prost(uint32, required, tag = "3")]
    pub version: u32,
    #[prost(int32, optional, tag = "4")]
    pub r#type: Option<i32>,
}

// Registration and session

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterAppRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(uint32, required, tag = "2")]
    pub pin: u32,
    #[prost(string, required, tag = "3")]
    pub devicename: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterAppConfirm {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartSessionRequest {
    #[prost(bool, optional, tag = "1")]
    pub takeover: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartSessionConfirm {
    /// Name of the device holding the session when the result is OTHER_SESSION.
    #[prost(string, optional, tag = "1")]
    pub devicename: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub resumed: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CloseSessionRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CloseSessionConfirm {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListRegisteredAppsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListRegisteredAppsConfirm {
    #[prost(message, repeated, tag = "1")]
    pub apps: Vec<RegisteredApp>,
}

/// One entry of [`ListRegisteredAppsConfirm`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisteredApp {
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(string, required, tag = "2")]
    pub devicename: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeregisterAppRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeregisterAppConfirm {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionConfirm {
    #[prost(uint32, required, tag = "1")]
    pub gateway_version: u32,
    #[prost(string, required, tag = "2")]
    pub serial_number: String,
    #[prost(uint32, required, tag = "3")]
    pub comfo_net_version: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeepAlive {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayNotification {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub push_uuids: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub alarm: Option<CnAlarmNotification>,
}

// ComfoNet

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnTimeRequest {
    #[prost(uint32, optional, tag = "1")]
    pub set_time: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnTimeConfirm {
    /// Seconds since 2000-01-01 00:00:00.
    #[prost(uint32, required, tag = "1")]
    pub current_time: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnNodeRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnNodeNotification {
    #[prost(uint32, required, tag = "1")]
    pub node_id: u32,
    #[prost(uint32, optional, tag = "2")]
    pub product_id: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub zone_id: Option<u32>,
    /// 0 legacy, 1 offline, 2 normal, 3 update.
    #[prost(int32, optional, tag = "4")]
    pub mode: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiRequest {
    #[prost(uint32, required, tag = "1")]
    pub node_id: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub message: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiResponse {
    #[prost(uint32, optional, tag = "1")]
    pub result: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiAsyncRequest {
    #[prost(uint32, required, tag = "1")]
    pub node_id: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub message: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiAsyncConfirm {
    #[prost(uint32, optional, tag = "1")]
    pub result: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiAsyncResponse {
    #[prost(uint32, optional, tag = "1")]
    pub result: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRpdoRequest {
    #[prost(uint32, required, tag = "1")]
    pub pdid: u32,
    #[prost(uint32, optional, tag = "2")]
    pub zone: Option<u32>,
    /// Value width in bytes.
    #[prost(uint32, optional, tag = "3")]
    pub r#type: Option<u32>,
    /// Zero cancels delivery.
    #[prost(uint32, optional, tag = "4")]
    pub timeout: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub interval: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRpdoConfirm {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRpdoNotification {
    #[prost(uint32, required, tag = "1")]
    pub pdid: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub data: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub zone: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnAlarmNotification {
    #[prost(uint32, optional, tag = "1")]
    pub zone: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub product_id: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub product_variant: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub serial_number: Option<String>,
    #[prost(uint32, optional, tag = "5")]
    pub sw_program_version: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub errors: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "7")]
    pub error_id: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub node_id: Option<u32>,
}
