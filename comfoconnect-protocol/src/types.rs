//! Core type definitions for the ComfoConnect wire protocol.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// TCP and UDP port the bridge listens on.
pub const BRIDGE_PORT: u16 = 56747;

/// Discovery probe: a `DiscoveryOperation` with an empty search request.
pub const DISCOVERY_PROBE: [u8; 2] = [0x0a, 0x00];

/// Size of a device identity on the wire.
pub const DEVICE_ID_LEN: usize = 16;

/// Fixed part of the envelope counted by the length field:
/// src (16) + dst (16) + header length (2).
pub const ENVELOPE_FIXED_LEN: usize = 2 * DEVICE_ID_LEN + 2;

/// Maximum accepted total length (1 MB). Real frames are a few hundred bytes.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// A 16-byte device identity, used both for the bridge and for registered apps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceId(pub [u8; DEVICE_ID_LEN]);

impl DeviceId {
    pub const fn new(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an identity from a byte slice that must be exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let arr: [u8; DEVICE_ID_LEN] = bytes.try_into().map_err(|_| {
            ProtocolError::InvalidDeviceId(format!("expected 16 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl FromStr for DeviceId {
    type Err = ProtocolError;

    /// Parse 32 hex digits. Dashes are ignored so UUID notation is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
        if digits.len() != DEVICE_ID_LEN * 2 {
            return Err(ProtocolError::InvalidDeviceId(s.to_string()));
        }
        let mut out = [0u8; DEVICE_ID_LEN];
        for (i, pair) in digits.chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair)
                .map_err(|_| ProtocolError::InvalidDeviceId(s.to_string()))?;
            out[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| ProtocolError::InvalidDeviceId(s.to_string()))?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.to_hex())
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A bridge found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeDescriptor {
    /// Address the bridge reported for itself.
    pub address: IpAddr,
    /// Bridge identity, used as `dst` of every outbound frame.
    pub id: DeviceId,
    /// Protocol version reported by the bridge.
    pub version: u32,
}

/// Operation tags carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum OperationType {
    NoOperation = 0,

    // Gateway requests (1..18)
    SetAddressRequest = 1,
    RegisterAppRequest = 2,
    StartSessionRequest = 3,
    CloseSessionRequest = 4,
    ListRegisteredAppsRequest = 5,
    DeregisterAppRequest = 6,
    ChangePinRequest = 7,
    GetRemoteAccessIdRequest = 8,
    SetRemoteAccessIdRequest = 9,
    GetSupportIdRequest = 10,
    SetSupportIdRequest = 11,
    GetWebIdRequest = 12,
    SetWebIdRequest = 13,
    SetPushIdRequest = 14,
    DebugRequest = 15,
    UpgradeRequest = 16,
    SetDeviceSettingsRequest = 17,
    VersionRequest = 18,

    // ComfoNet (30..42)
    CnTimeRequest = 30,
    CnTimeConfirm = 31,
    CnNodeNotification = 32,
    CnRmiRequest = 33,
    CnRmiResponse = 34,
    CnRmiAsyncRequest = 35,
    CnRmiAsyncConfirm = 36,
    CnRmiAsyncResponse = 37,
    CnRpdoRequest = 38,
    CnRpdoConfirm = 39,
    CnRpdoNotification = 40,
    CnAlarmNotification = 41,
    CnNodeRequest = 42,

    // Gateway confirms (request + 50)
    SetAddressConfirm = 51,
    RegisterAppConfirm = 52,
    StartSessionConfirm = 53,
    CloseSessionConfirm = 54,
    ListRegisteredAppsConfirm = 55,
    DeregisterAppConfirm = 56,
    ChangePinConfirm = 57,
    GetRemoteAccessIdConfirm = 58,
    SetRemoteAccessIdConfirm = 59,
    GetSupportIdConfirm = 60,
    SetSupportIdConfirm = 61,
    GetWebIdConfirm = 62,
    SetWebIdConfirm = 63,
    SetPushIdConfirm = 64,
    DebugConfirm = 65,
    UpgradeConfirm = 66,
    SetDeviceSettingsConfirm = 67,
    VersionConfirm = 68,

    // Firmware update (70..81)
    CnFupReadRegisterRequest = 70,
    CnFupReadRegisterConfirm = 71,
    CnFupProgramBeginRequest = 72,
    CnFupProgramBeginConfirm = 73,
    CnFupProgramRequest = 74,
    CnFupProgramConfirm = 75,
    CnFupProgramEndRequest = 76,
    CnFupProgramEndConfirm = 77,
    CnFupReadRequest = 78,
    CnFupReadConfirm = 79,
    CnFupResetRequest = 80,
    CnFupResetConfirm = 81,

    // Gateway misc (100..102)
    GatewayNotification = 100,
    KeepAlive = 101,
    FactoryReset = 102,
}

impl TryFrom<i32> for OperationType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        use OperationType::*;
        Ok(match value {
            0 => NoOperation,
            1 => SetAddressRequest,
            2 => RegisterAppRequest,
            3 => StartSessionRequest,
            4 => CloseSessionRequest,
            5 => ListRegisteredAppsRequest,
            6 => DeregisterAppRequest,
            7 => ChangePinRequest,
            8 => GetRemoteAccessIdRequest,
            9 => SetRemoteAccessIdRequest,
            10 => GetSupportIdRequest,
            11 => SetSupportIdRequest,
            12 => GetWebIdRequest,
            13 => SetWebIdRequest,
            14 => SetPushIdRequest,
            15 => DebugRequest,
            16 => UpgradeRequest,
            17 => SetDeviceSettingsRequest,
            18 => VersionRequest,
            30 => CnTimeRequest,
            31 => CnTimeConfirm,
            32 => CnNodeNotification,
            33 => CnRmiRequest,
            34 => CnRmiResponse,
            35 => CnRmiAsyncRequest,
            36 => CnRmiAsyncConfirm,
            37 => CnRmiAsyncResponse,
            38 => CnRpdoRequest,
            39 => CnRpdoConfirm,
            40 => CnRpdoNotification,
            41 => CnAlarmNotification,
            42 => CnNodeRequest,
            51 => SetAddressConfirm,
            52 => RegisterAppConfirm,
            53 => StartSessionConfirm,
            54 => CloseSessionConfirm,
            55 => ListRegisteredAppsConfirm,
            56 => DeregisterAppConfirm,
            57 => ChangePinConfirm,
            58 => GetRemoteAccessIdConfirm,
            59 => SetRemoteAccessIdConfirm,
            60 => GetSupportIdConfirm,
            61 => SetSupportIdConfirm,
            62 => GetWebIdConfirm,
            63 => SetWebIdConfirm,
            64 => SetPushIdConfirm,
            65 => DebugConfirm,
            66 => UpgradeConfirm,
            67 => SetDeviceSettingsConfirm,
            68 => VersionConfirm,
            70 => CnFupReadRegisterRequest,
            71 => CnFupReadRegisterConfirm,
            72 => CnFupProgramBeginRequest,
            73 => CnFupProgramBeginConfirm,
            74 => CnFupProgramRequest,
            75 => CnFupProgramConfirm,
            76 => CnFupProgramEndRequest,
            77 => CnFupProgramEndConfirm,
            78 => CnFupReadRequest,
            79 => CnFupReadConfirm,
            80 => CnFupResetRequest,
            81 => CnFupResetConfirm,
            100 => GatewayNotification,
            101 => KeepAlive,
            102 => FactoryReset,
            _ => return Err(value),
        })
    }
}

impl From<OperationType> for i32 {
    fn from(value: OperationType) -> Self {
        value as i32
    }
}

impl OperationType {
    /// Pushes the bridge sends without being asked.
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            OperationType::CnNodeNotification
                | OperationType::CnRpdoNotification
                | OperationType::CnAlarmNotification
                | OperationType::GatewayNotification
        )
    }
}

/// Result code carried in every reply header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ResultCode {
    #[default]
    Ok = 0,
    BadRequest = 1,
    InternalError = 2,
    NotReachable = 3,
    OtherSession = 4,
    NotAllowed = 5,
    NoResources = 6,
    NotExist = 7,
    RmiError = 8,
}

impl TryFrom<i32> for ResultCode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(ResultCode::Ok),
            1 => Ok(ResultCode::BadRequest),
            2 => Ok(ResultCode::InternalError),
            3 => Ok(ResultCode::NotReachable),
            4 => Ok(ResultCode::OtherSession),
            5 => Ok(ResultCode::NotAllowed),
            6 => Ok(ResultCode::NoResources),
            7 => Ok(ResultCode::NotExist),
            8 => Ok(ResultCode::RmiError),
            _ => Err(value),
        }
    }
}

impl From<ResultCode> for i32 {
    fn from(value: ResultCode) -> Self {
        value as i32
    }
}

impl ResultCode {
    /// Returns true if this result code indicates success.
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}
