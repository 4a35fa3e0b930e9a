//! Sensor metadata and notification value decoding.

use bytes::Bytes;

/// Value width in bytes for each known sensor (RPDO) id.
const SENSOR_WIDTHS: &[(u32, u8)] = &[
    (16, 1),
    (33, 1),
    (37, 1),
    (49, 1),
    (53, 1),
    (56, 1),
    (65, 1),
    (66, 1),
    (67, 1),
    (70, 1),
    (71, 1),
    (81, 3),
    (82, 3),
    (85, 3),
    (86, 3),
    (87, 3),
    (117, 1),
    (118, 1),
    (119, 2),
    (120, 2),
    (121, 2),
    (122, 2),
    (128, 2),
    (129, 2),
    (130, 2),
    (144, 2),
    (145, 2),
    (146, 2),
    (176, 1),
    (192, 2),
    (208, 1),
    (209, 6),
    (210, 0),
    (211, 0),
    (212, 6),
    (213, 2),
    (214, 2),
    (215, 2),
    (216, 2),
    (217, 2),
    (218, 2),
    (219, 2),
    (221, 6),
    (224, 1),
    (225, 1),
    (226, 2),
    (227, 1),
    (228, 1),
    (274, 6),
    (275, 6),
    (276, 6),
    (277, 6),
    (290, 1),
    (291, 1),
    (292, 1),
    (293, 1),
    (294, 1),
    (321, 2),
    (325, 2),
    (337, 3),
    (338, 3),
    (341, 3),
    (369, 1),
    (370, 1),
    (371, 1),
    (372, 1),
    (384, 6),
    (386, 0),
    (400, 6),
    (401, 1),
    (402, 0),
    (416, 6),
    (417, 6),
    (418, 1),
    (419, 0),
];

/// Look up the value width of a sensor. The table is sorted by id.
pub fn sensor_width(sensor_id: u32) -> Option<u8> {
    SENSOR_WIDTHS
        .binary_search_by_key(&sensor_id, |(id, _)| *id)
        .ok()
        .map(|idx| SENSOR_WIDTHS[idx].1)
}

/// Display name for a ComfoNet product id.
pub fn product_name(product_id: u32) -> Option<&'static str> {
    Some(match product_id {
        1 => "ComfoAirQ",
        2 => "ComfoSense",
        3 => "ComfoSwitch",
        4 => "OptionBox",
        5 => "ZehnderGateway",
        6 => "ComfoCool",
        7 => "KNXGateway",
        8 => "Service Tool",
        9 => "Production test tool",
        10 => "Design verification test tool",
        _ => return None,
    })
}

/// Display name for a node mode reported in node notifications.
pub fn node_mode_name(mode: i32) -> &'static str {
    match mode {
        0 => "NODE_LEGACY",
        1 => "NODE_OFFLINE",
        2 => "NODE_NORMAL",
        3 => "NODE_UPDATE",
        _ => "UNKNOWN",
    }
}

/// A decoded sensor value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorValue {
    Int8(i8),
    Int16(i16),
    /// Widths without a documented scalar form are passed through untouched.
    Raw(Bytes),
}

impl SensorValue {
    /// Decode pushed sensor data of the given width.
    ///
    /// Data whose length does not match the width is passed through raw.
    pub fn decode(width: u8, data: &[u8]) -> Self {
        match (width, data) {
            (1, [b]) => SensorValue::Int8(*b as i8),
            (2, [lo, hi]) => SensorValue::Int16(i16::from_le_bytes([*lo, *hi])),
            _ => SensorValue::Raw(Bytes::copy_from_slice(data)),
        }
    }

    /// Integer form of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SensorValue::Int8(v) => Some(*v as i64),
            SensorValue::Int16(v) => Some(*v as i64),
            SensorValue::Raw(_) => None,
        }
    }
}

/// An active periodic-variable subscription, replayed after reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSubscription {
    pub sensor_id: u32,
    /// Value width in bytes.
    pub width: u8,
    pub zone: u32,
}
