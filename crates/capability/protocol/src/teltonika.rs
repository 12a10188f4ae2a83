//! Teltonika 协议编解码器（最小形态）
//!
//! 二进制大端布局：
//!
//! ```text
//! lat(f64) | lon(f64) | [alt(f32)] | [speed(u16, 0.1 km/h)] | [course(u16)]
//! ```
//!
//! 最小 16 字节。完整的 Codec8 长度前缀与 CRC 成帧未实现：
//! `next_frame` 把已缓冲的整段字节当作一个帧消费，因此该
//! 编解码器不具备分块无关性，属于已确认的功能缺口。

use crate::codec::{Decoded, Frame, ProtocolCodec};
use crate::error::CodecError;
use domain::{Fix, Protocol};

const MIN_FRAME_LEN: usize = 16;

/// Teltonika 编解码器（无状态，可共享）。
#[derive(Debug, Default)]
pub struct TeltonikaCodec;

impl TeltonikaCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolCodec for TeltonikaCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Teltonika
    }

    /// 探测顺序中的兜底协议：不做签名匹配，恒为真。
    fn detect(&self, _prefix: &[u8]) -> bool {
        true
    }

    fn next_frame(&self, buf: &[u8]) -> Result<Option<Frame>, CodecError> {
        if buf.len() < MIN_FRAME_LEN {
            return Ok(None);
        }
        Ok(Some(Frame {
            consumed: buf.len(),
        }))
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(CodecError::PacketTooShort {
                got: frame.len(),
                need: MIN_FRAME_LEN,
            });
        }

        let latitude = read_f64(&frame[0..8]);
        let longitude = read_f64(&frame[8..16]);
        if latitude.is_nan() || longitude.is_nan() {
            return Err(CodecError::InvalidCoordinate("NaN coordinate".to_string()));
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CodecError::InvalidCoordinate(format!(
                "lat={latitude}, lon={longitude}"
            )));
        }

        let mut fix = Fix::new(Protocol::Teltonika, latitude, longitude);
        // 协议无定位有效位，坐标通过范围校验即视为有效
        fix.valid = true;

        let mut rest = &frame[16..];
        if rest.len() >= 4 {
            let altitude = read_f32(&rest[0..4]);
            fix.altitude = Some(f64::from(altitude));
            rest = &rest[4..];
        }
        if rest.len() >= 2 {
            let speed = u16::from_be_bytes([rest[0], rest[1]]);
            fix.speed = f64::from(speed) / 10.0;
            rest = &rest[2..];
        }
        if rest.len() >= 2 {
            let course = u16::from_be_bytes([rest[0], rest[1]]);
            if course > 360 {
                return Err(CodecError::InvalidValue(format!(
                    "course {course} exceeds 360"
                )));
            }
            fix.course = f64::from(course);
        }

        Ok(Decoded::Location(fix))
    }

    fn ack(&self, decoded: &Decoded, _serial: u16) -> Option<Vec<u8>> {
        // 鉴权应答与数据应答都是单字节 0x01
        match decoded {
            Decoded::Location(_) | Decoded::Login { .. } => Some(vec![0x01]),
            _ => None,
        }
    }

    fn extract_unique_id(&self, frame: &[u8]) -> Option<String> {
        if frame.len() < 8 {
            return None;
        }
        Some(
            frame[..8]
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect(),
        )
    }
}

fn read_f64(bytes: &[u8]) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    f64::from_be_bytes(raw)
}

fn read_f32(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    f32::from_be_bytes(raw)
}
