//! Sensor packet decoding.
//!
//! Packets are protobuf-encoded `SensorPacket` messages:
//!
//! | Field | No. | Wire type | Meaning |
//! |-------|-----|-----------|---------|
//! | `type` | 1 | varint | ACC=0, GYRO=1, SWITCH=2, BATTERY=3, FUSED=4 |
//! | `timestamp` | 2 | varint | sensor time in milliseconds |
//! | `w`, `x`, `y`, `z` | 3-6 | fixed32 | float payload |
//! | `acc`, `gyro` | 7, 8 | length-delimited | `Vec3 { x=1, y=2, z=3 }` of fixed32 floats |
//! | `extra` | 9 | varint | packet counter |
//!
//! Per variant:
//! - switch: `w` = 1.0 if pressed, 0.0 if released
//! - battery: `w` = percent, `x` = millivolts
//! - fused: `acc.{x,y,z}`, `gyro.{x,y,z}`, `extra` = counter
//!
//! ACC and GYRO are legacy firmware variants and are rejected.

use serde::{Deserialize, Serialize};

/// Sensor milliseconds per second.
pub const TIMESTAMP_DIVISOR: f64 = 1000.0;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Packet type discriminant on the wire.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Acc = 0,
    Gyro = 1,
    Switch = 2,
    Battery = 3,
    Fused = 4,
}

impl WireType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(WireType::Acc),
            1 => Some(WireType::Gyro),
            2 => Some(WireType::Switch),
            3 => Some(WireType::Battery),
            4 => Some(WireType::Fused),
            _ => None,
        }
    }
}

/// Dispatchable packet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    Switch,
    Battery,
    Fused,
}

impl PacketKind {
    pub const ALL: [PacketKind; 3] = [PacketKind::Switch, PacketKind::Battery, PacketKind::Fused];

    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Switch => "switch",
            PacketKind::Battery => "battery",
            PacketKind::Fused => "fused",
        }
    }

    /// Parse a comma-separated list such as `switch,fused`. `all` selects every kind.
    pub fn parse_list(s: &str) -> Result<Vec<PacketKind>, DecodeError> {
        let mut kinds = Vec::new();
        for part in s.split(',').map(|p| p.trim().to_lowercase()) {
            let parsed: &[PacketKind] = match part.as_str() {
                "" => continue,
                "all" => &Self::ALL,
                "switch" => &[PacketKind::Switch],
                "battery" => &[PacketKind::Battery],
                "fused" => &[PacketKind::Fused],
                other => return Err(DecodeError::UnknownKind(other.to_string())),
            };
            for kind in parsed {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
        }
        Ok(kinds)
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PacketData {
    Switch {
        switch_pressed: bool,
    },
    Battery {
        battery_percent: f32,
        battery_millivolts: f32,
    },
    Fused {
        acc_x: f32,
        acc_y: f32,
        acc_z: f32,
        gyro_x: f32,
        gyro_y: f32,
        gyro_z: f32,
        counter: u32,
    },
}

/// A decoded sensor packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Packet {
    /// Sensor time in seconds
    pub timestamp_sensor: f64,
    /// Local receive time in seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(flatten)]
    pub data: PacketData,
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self.data {
            PacketData::Switch { .. } => PacketKind::Switch,
            PacketData::Battery { .. } => PacketKind::Battery,
            PacketData::Fused { .. } => PacketKind::Fused,
        }
    }
}

/// Three floats as carried in `acc` and `gyro`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Field-level view of a `SensorPacket` message.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawPacket {
    pub packet_type: i64,
    pub timestamp: u64,
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub acc: WireVec3,
    pub gyro: WireVec3,
    pub extra: u64,
}

/// Errors that can occur while decoding a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Accelerometer- or gyroscope-only packet from old firmware
    Legacy(WireType),
    UnknownType(i64),
    Malformed(String),
    UnknownKind(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Legacy(t) => write!(
                f,
                "Receiving packets of type {t:?}. Is your sensor running the latest firmware?"
            ),
            DecodeError::UnknownType(t) => write!(f, "Packet type {t} not implemented"),
            DecodeError::Malformed(e) => write!(f, "Malformed packet: {e}"),
            DecodeError::UnknownKind(k) => write!(f, "Unknown packet kind '{k}'"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a message into a dispatchable packet.
pub fn decode(bytes: &[u8], received_at: f64) -> Result<Packet, DecodeError> {
    let raw = RawPacket::parse(bytes)?;
    let wire_type =
        WireType::from_i64(raw.packet_type).ok_or(DecodeError::UnknownType(raw.packet_type))?;

    let data = match wire_type {
        WireType::Switch => PacketData::Switch {
            switch_pressed: raw.w != 0.0,
        },
        WireType::Battery => PacketData::Battery {
            battery_percent: raw.w,
            battery_millivolts: raw.x,
        },
        WireType::Fused => PacketData::Fused {
            acc_x: raw.acc.x,
            acc_y: raw.acc.y,
            acc_z: raw.acc.z,
            gyro_x: raw.gyro.x,
            gyro_y: raw.gyro.y,
            gyro_z: raw.gyro.z,
            counter: u32::try_from(raw.extra).map_err(|_| {
                DecodeError::Malformed(format!("fused counter {} out of range", raw.extra))
            })?,
        },
        legacy @ (WireType::Acc | WireType::Gyro) => return Err(DecodeError::Legacy(legacy)),
    };

    Ok(Packet {
        timestamp_sensor: raw.timestamp as f64 / TIMESTAMP_DIVISOR,
        timestamp: received_at,
        data,
    })
}

impl RawPacket {
    /// Parse protobuf fields. Unknown fields are skipped.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut raw = RawPacket::default();
        let mut reader = WireReader::new(bytes);
        while !reader.is_empty() {
            let (field, wire) = reader.read_key()?;
            match (field, wire) {
                (1, WIRE_VARINT) => raw.packet_type = reader.read_varint()? as i64,
                (2, WIRE_VARINT) => raw.timestamp = reader.read_varint()?,
                (3, WIRE_FIXED32) => raw.w = reader.read_f32()?,
                (4, WIRE_FIXED32) => raw.x = reader.read_f32()?,
                (5, WIRE_FIXED32) => raw.y = reader.read_f32()?,
                (6, WIRE_FIXED32) => raw.z = reader.read_f32()?,
                (7, WIRE_LEN) => raw.acc = parse_vec3(reader.read_len_delimited()?)?,
                (8, WIRE_LEN) => raw.gyro = parse_vec3(reader.read_len_delimited()?)?,
                (9, WIRE_VARINT) => raw.extra = reader.read_varint()?,
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(raw)
    }

    /// Encode as a protobuf message; zero-valued scalars are omitted.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        if self.packet_type != 0 {
            put_key(&mut out, 1, WIRE_VARINT);
            put_varint(&mut out, self.packet_type as u64);
        }
        if self.timestamp != 0 {
            put_key(&mut out, 2, WIRE_VARINT);
            put_varint(&mut out, self.timestamp);
        }
        for (field, value) in [(3, self.w), (4, self.x), (5, self.y), (6, self.z)] {
            if value != 0.0 {
                put_key(&mut out, field, WIRE_FIXED32);
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        for (field, v) in [(7, self.acc), (8, self.gyro)] {
            if v != WireVec3::default() {
                let mut inner = Vec::with_capacity(15);
                for (f, value) in [(1, v.x), (2, v.y), (3, v.z)] {
                    put_key(&mut inner, f, WIRE_FIXED32);
                    inner.extend_from_slice(&value.to_le_bytes());
                }
                put_key(&mut out, field, WIRE_LEN);
                put_varint(&mut out, inner.len() as u64);
                out.extend_from_slice(&inner);
            }
        }
        if self.extra != 0 {
            put_key(&mut out, 9, WIRE_VARINT);
            put_varint(&mut out, self.extra);
        }
        out
    }
}

fn parse_vec3(bytes: &[u8]) -> Result<WireVec3, DecodeError> {
    let mut v = WireVec3::default();
    let mut reader = WireReader::new(bytes);
    while !reader.is_empty() {
        let (field, wire) = reader.read_key()?;
        match (field, wire) {
            (1, WIRE_FIXED32) => v.x = reader.read_f32()?,
            (2, WIRE_FIXED32) => v.y = reader.read_f32()?,
            (3, WIRE_FIXED32) => v.z = reader.read_f32()?,
            (_, wire) => reader.skip(wire)?,
        }
    }
    Ok(v)
}

fn put_key(out: &mut Vec<u8>, field: u32, wire: u8) {
    put_varint(out, (u64::from(field) << 3) | u64::from(wire));
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Cursor over a protobuf-encoded buffer.
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| DecodeError::Malformed(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.take(1)?[0];
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::Malformed("varint longer than 10 bytes".to_string()))
    }

    fn read_key(&mut self) -> Result<(u32, u8), DecodeError> {
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        if field == 0 {
            return Err(DecodeError::Malformed("field number 0".to_string()));
        }
        Ok((field, (key & 0x7) as u8))
    }

    fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| DecodeError::Malformed(format!("length {len} out of range")))?;
        self.take(len)
    }

    fn skip(&mut self, wire: u8) -> Result<(), DecodeError> {
        match wire {
            WIRE_VARINT => self.read_varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.read_len_delimited().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(DecodeError::Malformed(format!("unsupported wire type {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fused(counter: u64) -> RawPacket {
        RawPacket {
            packet_type: WireType::Fused as i64,
            timestamp: 12_345,
            acc: WireVec3 {
                x: 0.1,
                y: 0.2,
                z: 0.3,
            },
            extra: counter,
            ..RawPacket::default()
        }
    }

    #[test]
    fn test_decode_fused() {
        let packet = decode(&fused(7).encode(), 100.0).unwrap();
        assert_eq!(packet.kind(), PacketKind::Fused);
        assert_eq!(packet.timestamp_sensor, 12.345);
        assert_eq!(packet.timestamp, 100.0);
        match packet.data {
            PacketData::Fused {
                acc_x,
                acc_y,
                acc_z,
                gyro_x,
                gyro_y,
                gyro_z,
                counter,
            } => {
                assert_eq!((acc_x, acc_y, acc_z), (0.1, 0.2, 0.3));
                assert_eq!((gyro_x, gyro_y, gyro_z), (0.0, 0.0, 0.0));
                assert_eq!(counter, 7);
            }
            other => panic!("expected fused, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_switch_and_battery() {
        let switch = RawPacket {
            packet_type: WireType::Switch as i64,
            w: 1.0,
            ..RawPacket::default()
        };
        let packet = decode(&switch.encode(), 0.0).unwrap();
        assert_eq!(packet.data, PacketData::Switch { switch_pressed: true });

        let battery = RawPacket {
            packet_type: WireType::Battery as i64,
            w: 87.0,
            x: 3900.0,
            ..RawPacket::default()
        };
        let packet = decode(&battery.encode(), 0.0).unwrap();
        assert_eq!(
            packet.data,
            PacketData::Battery {
                battery_percent: 87.0,
                battery_millivolts: 3900.0
            }
        );
    }

    #[test]
    fn test_legacy_and_unknown_types_are_rejected() {
        let acc = RawPacket {
            packet_type: WireType::Acc as i64,
            x: 1.0,
            ..RawPacket::default()
        };
        assert_eq!(
            decode(&acc.encode(), 0.0),
            Err(DecodeError::Legacy(WireType::Acc))
        );

        let unknown = RawPacket {
            packet_type: 42,
            ..RawPacket::default()
        };
        assert_eq!(decode(&unknown.encode(), 0.0), Err(DecodeError::UnknownType(42)));
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut bytes = fused(3).encode();
        // field 15, varint
        put_key(&mut bytes, 15, WIRE_VARINT);
        put_varint(&mut bytes, 300);
        // field 16, length-delimited
        put_key(&mut bytes, 16, WIRE_LEN);
        put_varint(&mut bytes, 2);
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let packet = decode(&bytes, 0.0).unwrap();
        assert_eq!(packet.kind(), PacketKind::Fused);
    }

    #[test]
    fn test_truncated_message_is_malformed() {
        let bytes = fused(3).encode();
        let err = decode(&bytes[..bytes.len() - 1], 0.0).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_counter_beyond_u32_is_malformed() {
        let packet = decode(&fused(u64::from(u32::MAX)).encode(), 0.0).unwrap();
        assert!(matches!(packet.data, PacketData::Fused { counter: u32::MAX, .. }));

        let err = decode(&fused(u64::from(u32::MAX) + 1).encode(), 0.0).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_packet_json_shape() {
        let packet = decode(&fused(7).encode(), 1.5).unwrap();
        let json = serde_json::to_value(packet).unwrap();
        assert_eq!(json["type"], "fused");
        assert_eq!(json["counter"], 7);
        assert_eq!(json["timestamp"], 1.5);
    }

    #[test]
    fn test_parse_kind_list() {
        assert_eq!(
            PacketKind::parse_list("fused, switch").unwrap(),
            vec![PacketKind::Fused, PacketKind::Switch]
        );
        assert_eq!(PacketKind::parse_list("all").unwrap(), PacketKind::ALL.to_vec());
        assert!(PacketKind::parse_list("acc").is_err());
    }
}
