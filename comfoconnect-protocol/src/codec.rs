//! Codec for encoding and decoding envelopes.
//!
//! Frame format:
//! ```text
//! +-----------+--------+--------+-----------+----------+----------+
//! | Length    | Src    | Dst    | HdrLen    | Header   | Payload  |
//! | u32 BE    | 16 B   | 16 B   | u16 BE    | HdrLen B | rest     |
//! +-----------+--------+--------+-----------+----------+----------+
//! ```
//!
//! `Length` counts everything after itself: `34 + HdrLen + len(Payload)`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;

use crate::error::ProtocolError;
use crate::registry::{self, Payload};
use crate::schema::GatewayOperation;
use crate::types::*;

/// Size of the big-endian length prefix.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub operation: OperationType,
    /// Correlation number chosen by the client. Pushes carry none.
    pub reference: Option<u32>,
    pub result: ResultCode,
    /// Extra result context, e.g. the device holding a conflicting session.
    pub result_description: Option<String>,
}

impl Header {
    /// Header for an outbound request.
    pub fn request(operation: OperationType, reference: u32) -> Self {
        Self {
            operation,
            reference: Some(reference),
            result: ResultCode::Ok,
            result_description: None,
        }
    }

    /// Header for a reply with the given result.
    pub fn reply(operation: OperationType, reference: Option<u32>, result: ResultCode) -> Self {
        Self {
            operation,
            reference,
            result,
            result_description: None,
        }
    }

    fn to_wire(&self) -> GatewayOperation {
        GatewayOperation {
            r#type: Some(self.operation.into()),
            result: (!self.result.is_ok()).then(|| self.result.into()),
            result_description: self.result_description.clone(),
            reference: self.reference,
        }
    }

    fn from_wire(raw: GatewayOperation) -> Result<Self, ProtocolError> {
        let tag = raw.r#type.unwrap_or(0);
        let operation =
            OperationType::try_from(tag).map_err(ProtocolError::UnknownMessageType)?;
        let result = match raw.result {
            Some(code) => ResultCode::try_from(code)
                .map_err(|c| ProtocolError::DecodeError(format!("unknown result code {}", c)))?,
            None => ResultCode::Ok,
        };
        Ok(Self {
            operation,
            reference: raw.reference,
            result,
            result_description: raw.result_description,
        })
    }
}

/// One framed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub src: DeviceId,
    pub dst: DeviceId,
    pub header: Header,
    pub payload: Payload,
}

impl Envelope {
    /// Build an outbound request; the header tag is taken from the payload.
    pub fn request(src: DeviceId, dst: DeviceId, reference: u32, payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            src,
            dst,
            header: Header::request(payload.operation_type(), reference),
            payload,
        }
    }

    pub fn operation(&self) -> OperationType {
        self.header.operation
    }

    /// Reject frames addressed to anyone but `local`.
    pub fn ensure_destination(&self, local: &DeviceId) -> Result<(), ProtocolError> {
        if self.dst != *local {
            return Err(ProtocolError::ForeignDestination {
                expected: *local,
                actual: self.dst,
            });
        }
        Ok(())
    }
}

/// Encode an envelope into a complete frame, length prefix included.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let header = envelope.header.to_wire().encode_to_vec();
    if header.len() > u16::MAX as usize {
        return Err(ProtocolError::EncodeError(format!(
            "header too large: {} bytes",
            header.len()
        )));
    }

    let total_len = ENVELOPE_FIXED_LEN + header.len() + envelope.payload.encoded_len();
    if total_len > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge(total_len as u32, MAX_FRAME_SIZE));
    }

    let mut frame = BytesMut::with_capacity(FRAME_LENGTH_SIZE + total_len);
    frame.put_u32(total_len as u32);
    frame.put_slice(envelope.src.as_bytes());
    frame.put_slice(envelope.dst.as_bytes());
    frame.put_u16(header.len() as u16);
    frame.put_slice(&header);
    envelope.payload.encode_to(&mut frame)?;

    debug_assert_eq!(frame.len(), FRAME_LENGTH_SIZE + total_len);
    Ok(frame.freeze())
}

/// Read the length prefix from the start of a buffer.
/// Returns None if there's not enough data yet.
pub fn decode_length(buf: &[u8]) -> Result<Option<u32>, ProtocolError> {
    if buf.len() < FRAME_LENGTH_SIZE {
        return Ok(None);
    }

    let total_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if total_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(total_len, MAX_FRAME_SIZE));
    }
    if (total_len as usize) < ENVELOPE_FIXED_LEN {
        return Err(ProtocolError::FrameTooShort(total_len));
    }
    Ok(Some(total_len))
}

/// Decode a complete frame, length prefix included.
///
/// The frame must hold exactly `4 + length` bytes; a shorter or longer
/// buffer is a framing error.
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let total_len = match decode_length(frame)? {
        Some(len) => len as usize,
        None => {
            return Err(ProtocolError::IncompleteFrame {
                expected: FRAME_LENGTH_SIZE,
                actual: frame.len(),
            })
        }
    };

    let mut body = &frame[FRAME_LENGTH_SIZE..];
    if body.len() < total_len {
        return Err(ProtocolError::IncompleteFrame {
            expected: total_len,
            actual: body.len(),
        });
    }
    if body.len() > total_len {
        return Err(ProtocolError::TrailingBytes {
            expected: total_len,
            actual: body.len(),
        });
    }

    let src = DeviceId::from_slice(&body[..DEVICE_ID_LEN])?;
    body.advance(DEVICE_ID_LEN);
    let dst = DeviceId::from_slice(&body[..DEVICE_ID_LEN])?;
    body.advance(DEVICE_ID_LEN);
    let header_len = body.get_u16() as usize;
    if header_len > body.len() {
        return Err(ProtocolError::HeaderOverflow {
            header_len,
            body_len: body.len(),
        });
    }

    let header = Header::from_wire(GatewayOperation::decode(&body[..header_len])?)?;
    let payload_bytes = &body[header_len..];

    let entry = registry::lookup(header.operation)
        .ok_or(ProtocolError::UnknownMessageType(header.operation.into()))?;
    let payload = (entry.decode)(payload_bytes)?;

    Ok(Envelope {
        src,
        dst,
        header,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn ids() -> (DeviceId, DeviceId) {
        let mut local = [0u8; 16];
        local[15] = 0x37;
        local[14] = 0x13;
        (DeviceId(local), DeviceId([0xAB; 16]))
    }

    #[test]
    fn test_encode_layout() {
        let (local, bridge) = ids();
        let env = Envelope::request(local, bridge, 7, VersionRequest {});
        let encoded = encode_envelope(&env).unwrap();

        let total = decode_length(&encoded).unwrap().unwrap() as usize;
        assert_eq!(encoded.len(), FRAME_LENGTH_SIZE + total);
        assert_eq!(&encoded[4..20], local.as_bytes());
        assert_eq!(&encoded[20..36], bridge.as_bytes());

        let header_len = u16::from_be_bytes([encoded[36], encoded[37]]) as usize;
        // VersionRequest has an empty payload, so the header fills the rest.
        assert_eq!(total, ENVELOPE_FIXED_LEN + header_len);
        // type = 18 (field 1, varint), reference = 7 (field 4, varint)
        assert_eq!(&encoded[38..], &[0x08, 18, 0x20, 7]);
    }

    #[test]
    fn test_encode_decode_rpdo_request() {
        let (local, bridge) = ids();
        let env = Envelope::request(
            local,
            bridge,
            42,
            CnRpdoRequest {
                pdid: 117,
                zone: Some(1),
                r#type: Some(1),
                timeout: None,
                interval: None,
            },
        );
        let encoded = encode_envelope(&env).unwrap();
        let decoded = decode_envelope(&encoded).unwrap();
        assert_eq!(decoded, env);
    }

    fn alarm() -> CnAlarmNotification {
        CnAlarmNotification {
            zone: Some(1),
            product_id: Some(1),
            product_variant: Some(2),
            serial_number: Some("BEA004185031910".to_string()),
            sw_program_version: Some(3_222_278_144),
            errors: Some(vec![0, 0, 0, 0, 0x10, 0, 0, 0]),
            error_id: Some(52),
            node_id: Some(1),
        }
    }

    fn every_payload() -> Vec<Payload> {
        let uuid = vec![0x5A; 16];
        vec![
            RegisterAppRequest {
                uuid: uuid.clone(),
                pin: 4210,
                devicename: "panel".to_string(),
            }
            .into(),
            RegisterAppConfirm {}.into(),
            StartSessionRequest {
                takeover: Some(true),
            }
            .into(),
            StartSessionConfirm {
                devicename: Some("phone".to_string()),
                resumed: Some(true),
            }
            .into(),
            CloseSessionRequest {}.into(),
            CloseSessionConfirm {}.into(),
            ListRegisteredAppsRequest {}.into(),
            ListRegisteredAppsConfirm {
                apps: vec![
                    RegisteredApp {
                        uuid: uuid.clone(),
                        devicename: "panel".to_string(),
                    },
                    RegisteredApp {
                        uuid: vec![0x13; 16],
                        devicename: "phone".to_string(),
                    },
                ],
            }
            .into(),
            DeregisterAppRequest { uuid: uuid.clone() }.into(),
            DeregisterAppConfirm {}.into(),
            VersionRequest {}.into(),
            VersionConfirm {
                gateway_version: 1_051_206,
                serial_number: "DEM0116371".to_string(),
                comfo_net_version: 3_221_225_472,
            }
            .into(),
            KeepAlive {}.into(),
            GatewayNotification {
                push_uuids: vec![uuid.clone(), vec![0x01; 16]],
                alarm: Some(alarm()),
            }
            .into(),
            CnTimeRequest {
                set_time: Some(600_000_000),
            }
            .into(),
            CnTimeConfirm {
                current_time: 600_000_123,
            }
            .into(),
            CnNodeRequest {}.into(),
            CnNodeNotification {
                node_id: 48,
                product_id: Some(5),
                zone_id: Some(255),
                mode: Some(2),
            }
            .into(),
            CnRmiRequest {
                node_id: 1,
                message: vec![0x87, 0x15, 0x01],
            }
            .into(),
            CnRmiResponse {
                result: Some(11),
                message: Some(vec![0x01, 0x02]),
            }
            .into(),
            CnRmiAsyncRequest {
                node_id: 1,
                message: vec![0x84, 0x15, 0x01, 0x01],
            }
            .into(),
            CnRmiAsyncConfirm { result: Some(1) }.into(),
            CnRmiAsyncResponse {
                result: Some(2),
                message: Some(vec![0xFF]),
            }
            .into(),
            CnRpdoRequest {
                pdid: 274,
                zone: Some(1),
                r#type: Some(6),
                timeout: Some(0),
                interval: Some(5),
            }
            .into(),
            CnRpdoConfirm {}.into(),
            CnRpdoNotification {
                pdid: 121,
                data: vec![0xCE, 0x00],
                zone: Some(1),
            }
            .into(),
            alarm().into(),
        ]
    }

    #[test]
    fn test_every_payload_survives_the_wire() {
        let (local, bridge) = ids();
        let payloads = every_payload();
        let tags: std::collections::HashSet<_> =
            payloads.iter().map(Payload::operation_type).collect();
        assert_eq!(tags.len(), payloads.len());
        assert!(tags.iter().all(|op| registry::lookup(*op).is_some()));

        for (i, payload) in payloads.into_iter().enumerate() {
            let op = payload.operation_type();
            let mut header = Header::reply(op, Some(1000 + i as u32), ResultCode::NotExist);
            header.result_description = Some(format!("context {}", i));
            let env = Envelope {
                src: bridge,
                dst: local,
                header,
                payload,
            };

            let decoded = decode_envelope(&encode_envelope(&env).unwrap())
                .unwrap_or_else(|e| panic!("{:?} failed to decode: {}", op, e));
            assert_eq!(decoded, env, "{:?} changed on the wire", op);
        }
    }

    #[test]
    fn test_decode_other_session_reply() {
        let (local, bridge) = ids();
        let mut header = Header::reply(OperationType::StartSessionConfirm, Some(1), ResultCode::OtherSession);
        header.result_description = Some("phone".to_string());
        let env = Envelope {
            src: bridge,
            dst: local,
            header,
            payload: StartSessionConfirm {
                devicename: Some("phone".to_string()),
                resumed: None,
            }
            .into(),
        };

        let decoded = decode_envelope(&encode_envelope(&env).unwrap()).unwrap();
        assert_eq!(decoded.header.result, ResultCode::OtherSession);
        assert_eq!(decoded.header.result_description.as_deref(), Some("phone"));
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_decode_truncated_frame() {
        let (local, bridge) = ids();
        let env = Envelope::request(
            local,
            bridge,
            3,
            RegisterAppRequest {
                uuid: local.as_bytes().to_vec(),
                pin: 1234,
                devicename: "test".to_string(),
            },
        );
        let encoded = encode_envelope(&env).unwrap();

        let result = decode_envelope(&encoded[..encoded.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::IncompleteFrame { .. })));

        let result = decode_envelope(&encoded[..2]);
        assert!(matches!(result, Err(ProtocolError::IncompleteFrame { .. })));

        let mut longer = encoded.to_vec();
        longer.push(0);
        let result = decode_envelope(&longer);
        assert!(matches!(result, Err(ProtocolError::TrailingBytes { .. })));
    }

    #[test]
    fn test_decode_unknown_message_type() {
        let (local, bridge) = ids();
        let header = GatewayOperation {
            r#type: Some(78), // CnFupReadRequest, no schema
            result: None,
            result_description: None,
            reference: Some(1),
        }
        .encode_to_vec();

        let mut frame = BytesMut::new();
        frame.put_u32((ENVELOPE_FIXED_LEN + header.len()) as u32);
        frame.put_slice(bridge.as_bytes());
        frame.put_slice(local.as_bytes());
        frame.put_u16(header.len() as u16);
        frame.put_slice(&header);

        let result = decode_envelope(&frame);
        assert_eq!(result, Err(ProtocolError::UnknownMessageType(78)));

        // A tag outside the enum entirely
        let header = GatewayOperation {
            r#type: Some(250),
            ..Default::default()
        }
        .encode_to_vec();
        let mut frame = BytesMut::new();
        frame.put_u32((ENVELOPE_FIXED_LEN + header.len()) as u32);
        frame.put_slice(bridge.as_bytes());
        frame.put_slice(local.as_bytes());
        frame.put_u16(header.len() as u16);
        frame.put_slice(&header);
        assert_eq!(decode_envelope(&frame), Err(ProtocolError::UnknownMessageType(250)));
    }

    #[test]
    fn test_header_overflow() {
        let (local, bridge) = ids();
        let mut frame = BytesMut::new();
        frame.put_u32(ENVELOPE_FIXED_LEN as u32 + 2);
        frame.put_slice(bridge.as_bytes());
        frame.put_slice(local.as_bytes());
        frame.put_u16(10);
        frame.put_slice(&[0x08, 0x28]);

        let result = decode_envelope(&frame);
        assert!(matches!(result, Err(ProtocolError::HeaderOverflow { .. })));
    }

    #[test]
    fn test_decode_length_bounds() {
        assert_eq!(decode_length(&[0, 0, 0]).unwrap(), None);
        assert!(matches!(
            decode_length(&[0, 0, 0, 10]),
            Err(ProtocolError::FrameTooShort(10))
        ));
        assert!(matches!(
            decode_length(&[0xFF, 0, 0, 0]),
            Err(ProtocolError::FrameTooLarge(..))
        ));
    }

    #[test]
    fn test_foreign_destination() {
        let (local, bridge) = ids();
        let env = Envelope::request(bridge, DeviceId([9; 16]), 1, KeepAlive {});
        assert!(matches!(
            env.ensure_destination(&local),
            Err(ProtocolError::ForeignDestination { .. })
        ));
        let env = Envelope::request(bridge, local, 1, KeepAlive {});
        assert!(env.ensure_destination(&local).is_ok());
    }
}
