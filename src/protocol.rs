// FaceCube — Wire Protocol Codec
//
// Fixed-size binary packets exchanged with the client:
//   event packet (device → client), 6 bytes:
//     [0]    event_type
//     [1..5] delta_seconds, u32 little-endian
//     [5]    face_id (1–6, 0 unused)
//   face color config (client → device), 4 bytes:
//     [0] face_id (1–6)  [1] r  [2] g  [3] b
//
// Event types are an open enumeration: receivers must tolerate values they
// do not know, never reject them.

use thiserror::Error;

pub const PACKET_SIZE: usize = 6;
pub const FACE_CONFIG_SIZE: usize = 4;
pub const FACE_COUNT: u8 = 6;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------
pub const EVENT_FACE_SWITCH: u8 = 0x01;
pub const EVENT_ONGOING_LOG: u8 = 0x02;
pub const EVENT_STATE_SYNC: u8 = 0x03;
pub const EVENT_BATTERY_STATUS: u8 = 0x04; // voltage + % + charging flag (periodic)
pub const EVENT_VERSION: u8 = 0x05;        // firmware version (sent once after boot)

pub const EVENT_BOOT: u8 = 0x10;
pub const EVENT_SHUTDOWN: u8 = 0x11;
pub const EVENT_LOW_BATTERY: u8 = 0x12; // first dip below the low threshold
pub const EVENT_CHARGING_STARTED: u8 = 0x13;
pub const EVENT_FULLY_CHARGED: u8 = 0x14;
pub const EVENT_CHARGING_STOPPED: u8 = 0x15; // USB removed before full OR after full

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },
    #[error("face id {0} outside 1..=6")]
    InvalidFace(u8),
}

// ---------------------------------------------------------------------------
// Event packet
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPacket {
    pub event_type: u8,
    pub delta_s: u32,
    pub face_id: u8,
}

impl EventPacket {
    pub fn new(event_type: u8, delta_s: u32, face_id: u8) -> Self {
        Self {
            event_type,
            delta_s,
            face_id,
        }
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let d = self.delta_s.to_le_bytes();
        [self.event_type, d[0], d[1], d[2], d[3], self.face_id]
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != PACKET_SIZE {
            return Err(ProtocolError::MalformedPacket {
                expected: PACKET_SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            event_type: buf[0],
            delta_s: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
            face_id: buf[5],
        })
    }
}

// ---------------------------------------------------------------------------
// Face color config packet
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceConfig {
    pub face_id: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Parse a client color-config write.  Length and face range are both
/// validated here so the handler can apply the result unconditionally.
pub fn decode_face_config(buf: &[u8]) -> Result<FaceConfig, ProtocolError> {
    if buf.len() != FACE_CONFIG_SIZE {
        return Err(ProtocolError::MalformedPacket {
            expected: FACE_CONFIG_SIZE,
            actual: buf.len(),
        });
    }
    let face_id = buf[0];
    if face_id < 1 || face_id > FACE_COUNT {
        return Err(ProtocolError::InvalidFace(face_id));
    }
    Ok(FaceConfig {
        face_id,
        r: buf[1],
        g: buf[2],
        b: buf[3],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout_is_type_delta_le_face() {
        let pkt = EventPacket::new(EVENT_ONGOING_LOG, 0x0102_0304, 5);
        assert_eq!(pkt.encode(), [0x02, 0x04, 0x03, 0x02, 0x01, 0x05]);
    }

    #[test]
    fn decode_is_the_inverse_of_encode() {
        let cases = [
            EventPacket::new(EVENT_FACE_SWITCH, 0, 1),
            EventPacket::new(EVENT_STATE_SYNC, 42, 3),
            EventPacket::new(EVENT_LOW_BATTERY, 0, 0),
            EventPacket::new(0x7f, u32::MAX, 6), // unknown type survives too
        ];
        for pkt in cases {
            assert_eq!(EventPacket::decode(&pkt.encode()).unwrap(), pkt);
        }
    }

    #[test]
    fn decode_rejects_wrong_lengths() {
        for len in [0usize, 5, 7, 12] {
            let buf = vec![0u8; len];
            assert_eq!(
                EventPacket::decode(&buf),
                Err(ProtocolError::MalformedPacket {
                    expected: PACKET_SIZE,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn face_config_roundtrip() {
        let cfg = decode_face_config(&[3, 10, 20, 30]).unwrap();
        assert_eq!(
            cfg,
            FaceConfig {
                face_id: 3,
                r: 10,
                g: 20,
                b: 30
            }
        );
    }

    #[test]
    fn face_config_rejects_wrong_length() {
        assert_eq!(
            decode_face_config(&[1, 2, 3]),
            Err(ProtocolError::MalformedPacket {
                expected: FACE_CONFIG_SIZE,
                actual: 3
            })
        );
    }

    #[test]
    fn face_config_rejects_out_of_range_faces() {
        assert_eq!(
            decode_face_config(&[0, 1, 2, 3]),
            Err(ProtocolError::InvalidFace(0))
        );
        assert_eq!(
            decode_face_config(&[7, 1, 2, 3]),
            Err(ProtocolError::InvalidFace(7))
        );
    }
}
