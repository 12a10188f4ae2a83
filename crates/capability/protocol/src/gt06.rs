//! GT06 协议编解码器
//!
//! 帧格式（大端）：
//!
//! ```text
//! 0x78 0x78 | len(1) | proto(1) + payload(len-1) | checksum(2) | 0x0D 0x0A
//! ```
//!
//! `len` 只统计 proto 与 payload，不含校验和与结束字节，
//! 即帧总长 = `len + 7`。校验和为 `len` 起至校验和前
//! 所有字节的 16 位 XOR 累加（高字节恒为 0，线上按大端存放）。
//!
//! 坐标为 4 字节压缩 BCD（`DD MM mmmm`），按
//! `度 + (分 + 小数分/10000) / 60` 还原；本帧布局不携带半球
//! 标志位，坐标一律按正值解码。时间为 6 字节 BCD
//! （年偏移 2000 起）。

use crate::codec::{AlarmKind, Decoded, Frame, ProtocolCodec};
use crate::error::CodecError;
use chrono::{DateTime, TimeZone, Timelike, Utc};
use domain::{AttrMap, Fix, Protocol};

// 帧标记
const START_BYTE_1: u8 = 0x78;
const START_BYTE_2: u8 = 0x78;
const END_BYTE_1: u8 = 0x0D;
const END_BYTE_2: u8 = 0x0A;

// 消息类型
const MSG_LOGIN: u8 = 0x01;
const MSG_LOCATION: u8 = 0x12;
const MSG_STATUS: u8 = 0x13;
const MSG_ALARM: u8 = 0x16;

// 各消息类型的最小帧总长
const MIN_LOGIN_LEN: usize = 15;
const MIN_LOCATION_LEN: usize = 26;
const MIN_STATUS_LEN: usize = 13;
const MIN_ALARM_LEN: usize = 27;

// 帧结构开销：start(2) + len(1) + checksum(2) + end(2)
const FRAME_OVERHEAD: usize = 7;

// 定位 payload：status(1) + lat(4) + lon(4) + speed(1) + course(2) + time(6)
const LOCATION_PAYLOAD_LEN: usize = 18;

// 报警类别码
const ALARM_SOS: u8 = 0x01;
const ALARM_POWER_CUT: u8 = 0x02;
const ALARM_VIBRATION: u8 = 0x04;
const ALARM_FENCE_IN: u8 = 0x10;
const ALARM_FENCE_OUT: u8 = 0x11;
const ALARM_LOW_BATTERY: u8 = 0x20;
const ALARM_OVERSPEED: u8 = 0x40;

/// GT06 编解码器（无状态，可共享）。
#[derive(Debug, Default)]
pub struct Gt06Codec;

impl Gt06Codec {
    pub fn new() -> Self {
        Self
    }

    /// 以显式时钟生成应答，登录应答的时分戳由 `now` 提供。
    ///
    /// [`ProtocolCodec::ack`] 用当前 UTC 调用本方法；测试用固定
    /// 时间保证字节级可复现。
    pub fn ack_at(&self, decoded: &Decoded, serial: u16, now: DateTime<Utc>) -> Option<Vec<u8>> {
        match decoded {
            Decoded::Login { unique_id } => Some(build_login_ack(unique_id, serial, now)),
            Decoded::Location(_) => Some(build_general_ack(MSG_LOCATION, serial)),
            Decoded::Alarm { .. } => Some(build_general_ack(MSG_ALARM, serial)),
            Decoded::Status { .. } => Some(build_general_ack(MSG_STATUS, serial)),
            Decoded::Heartbeat => None,
        }
    }

    fn decode_login(&self, payload: &[u8]) -> Result<Decoded, CodecError> {
        if payload.len() < 8 {
            return Err(CodecError::PacketTooShort {
                got: payload.len(),
                need: 8,
            });
        }
        let unique_id = payload[..8]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        Ok(Decoded::Login { unique_id })
    }

    fn decode_location(&self, payload: &[u8]) -> Result<Fix, CodecError> {
        if payload.len() < LOCATION_PAYLOAD_LEN {
            return Err(CodecError::PacketTooShort {
                got: payload.len(),
                need: LOCATION_PAYLOAD_LEN,
            });
        }

        let status = payload[0];
        let latitude = bcd_to_degrees(&payload[1..5], 90)?;
        let longitude = bcd_to_degrees(&payload[5..9], 180)?;
        let course = f64::from(u16::from_be_bytes([payload[10], payload[11]]));
        if course > 360.0 {
            return Err(CodecError::InvalidValue(format!(
                "course {course} exceeds 360"
            )));
        }
        // 时间字段是必填的：解析失败直接报错，绝不用本机时钟顶替
        let timestamp = parse_timestamp(&payload[12..18])?;

        let mut fix = Fix::new(Protocol::Gt06, latitude, longitude);
        fix.valid = status & 0x01 == 0x01;
        fix.satellites = (status >> 2) & 0x0F;
        fix.speed = f64::from(payload[9]);
        fix.course = course;
        fix.timestamp = Some(timestamp);
        Ok(fix)
    }

    fn decode_status(&self, payload: &[u8]) -> Result<Decoded, CodecError> {
        if payload.len() < 4 {
            return Err(CodecError::PacketTooShort {
                got: payload.len(),
                need: 4,
            });
        }

        let mut attributes = AttrMap::new();
        attributes.insert("powerLevel".to_string(), ((payload[0] >> 4) & 0x0F).into());
        attributes.insert("gsmSignal".to_string(), (payload[0] & 0x0F).into());
        attributes.insert("charging".to_string(), (payload[1] & 0x20 != 0).into());
        attributes.insert("engineOn".to_string(), (payload[1] & 0x40 != 0).into());
        Ok(Decoded::Status { attributes })
    }

    fn decode_alarm(&self, payload: &[u8]) -> Result<Decoded, CodecError> {
        if payload.len() < LOCATION_PAYLOAD_LEN + 1 {
            return Err(CodecError::PacketTooShort {
                got: payload.len(),
                need: LOCATION_PAYLOAD_LEN + 1,
            });
        }

        let mut fix = self.decode_location(&payload[..payload.len() - 1])?;
        let kind = alarm_kind(payload[payload.len() - 1]);
        fix.attributes
            .insert("alarm".to_string(), kind.label().into());
        Ok(Decoded::Alarm { fix, kind })
    }
}

impl ProtocolCodec for Gt06Codec {
    fn protocol(&self) -> Protocol {
        Protocol::Gt06
    }

    fn detect(&self, prefix: &[u8]) -> bool {
        prefix.len() >= 2 && prefix[0] == START_BYTE_1 && prefix[1] == START_BYTE_2
    }

    fn next_frame(&self, buf: &[u8]) -> Result<Option<Frame>, CodecError> {
        if buf.is_empty() {
            return Ok(None);
        }
        if buf[0] != START_BYTE_1 {
            return Err(CodecError::InvalidHeader(format!(
                "expected 0x7878, got 0x{:02x}..",
                buf[0]
            )));
        }
        if buf.len() >= 2 && buf[1] != START_BYTE_2 {
            return Err(CodecError::InvalidHeader(format!(
                "expected 0x7878, got 0x{:02x}{:02x}",
                buf[0], buf[1]
            )));
        }
        if buf.len() < 3 {
            return Ok(None);
        }

        let total = usize::from(buf[2]) + FRAME_OVERHEAD;
        if buf.len() < total {
            return Ok(None);
        }
        Ok(Some(Frame { consumed: total }))
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(CodecError::PacketTooShort {
                got: frame.len(),
                need: FRAME_OVERHEAD,
            });
        }
        if frame[0] != START_BYTE_1 || frame[1] != START_BYTE_2 {
            return Err(CodecError::InvalidHeader(format!(
                "expected 0x7878, got 0x{:02x}{:02x}",
                frame[0], frame[1]
            )));
        }

        let msg_type = frame[3];
        let min_len = match msg_type {
            MSG_LOGIN => MIN_LOGIN_LEN,
            MSG_LOCATION => MIN_LOCATION_LEN,
            MSG_STATUS => MIN_STATUS_LEN,
            MSG_ALARM => MIN_ALARM_LEN,
            other => {
                return Err(CodecError::InvalidMessageType(format!("0x{other:02x}")));
            }
        };
        if frame.len() < min_len {
            return Err(CodecError::PacketTooShort {
                got: frame.len(),
                need: min_len,
            });
        }

        let declared = usize::from(frame[2]);
        let actual = frame.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(CodecError::InvalidLength { declared, actual });
        }

        let checksum_pos = frame.len() - 4;
        let calc = checksum(&frame[2..checksum_pos]);
        let recv = u16::from_be_bytes([frame[checksum_pos], frame[checksum_pos + 1]]);
        if calc != recv {
            return Err(CodecError::InvalidChecksum { calc, recv });
        }

        if frame[frame.len() - 2] != END_BYTE_1 || frame[frame.len() - 1] != END_BYTE_2 {
            return Err(CodecError::MalformedPacket("invalid end bytes".to_string()));
        }

        let payload = &frame[4..checksum_pos];
        match msg_type {
            MSG_LOGIN => self.decode_login(payload),
            MSG_LOCATION => Ok(Decoded::Location(self.decode_location(payload)?)),
            MSG_STATUS => self.decode_status(payload),
            MSG_ALARM => self.decode_alarm(payload),
            _ => unreachable!("message type validated above"),
        }
    }

    fn ack(&self, decoded: &Decoded, serial: u16) -> Option<Vec<u8>> {
        self.ack_at(decoded, serial, Utc::now())
    }

    fn extract_unique_id(&self, frame: &[u8]) -> Option<String> {
        if frame.len() < 12 || frame.get(3) != Some(&MSG_LOGIN) {
            return None;
        }
        Some(
            frame[4..12]
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect(),
        )
    }
}

/// 16 位 XOR 累加校验和。
fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, byte| acc ^ u16::from(*byte))
}

/// 定位 / 报警 / 状态通用应答：
/// `78 78 05 proto serial(2) crc(2) 0D 0A`。
fn build_general_ack(msg_type: u8, serial: u16) -> Vec<u8> {
    let mut ack = vec![START_BYTE_1, START_BYTE_2, 0x05, msg_type];
    ack.extend_from_slice(&serial.to_be_bytes());
    let crc = checksum(&ack[2..]);
    ack.extend_from_slice(&crc.to_be_bytes());
    ack.push(END_BYTE_1);
    ack.push(END_BYTE_2);
    ack
}

/// 登录应答：回显设备标识，附 UTC 时分戳与成功码 0x0000。
fn build_login_ack(unique_id: &str, serial: u16, now: DateTime<Utc>) -> Vec<u8> {
    let id_bytes = unique_id.as_bytes();
    let mut content = Vec::with_capacity(id_bytes.len() + 7);
    content.push(MSG_LOGIN);
    content.extend_from_slice(id_bytes);
    content.push(now.hour() as u8);
    content.push(now.minute() as u8);
    content.extend_from_slice(&serial.to_be_bytes());
    content.extend_from_slice(&[0x00, 0x00]);

    let mut ack = vec![START_BYTE_1, START_BYTE_2, content.len() as u8];
    ack.extend_from_slice(&content);
    let crc = checksum(&ack[2..]);
    ack.extend_from_slice(&crc.to_be_bytes());
    ack.push(END_BYTE_1);
    ack.push(END_BYTE_2);
    ack
}

fn alarm_kind(code: u8) -> AlarmKind {
    match code {
        ALARM_SOS => AlarmKind::Sos,
        ALARM_POWER_CUT => AlarmKind::PowerCut,
        ALARM_VIBRATION => AlarmKind::Vibration,
        ALARM_FENCE_IN => AlarmKind::FenceIn,
        ALARM_FENCE_OUT => AlarmKind::FenceOut,
        ALARM_LOW_BATTERY => AlarmKind::LowBattery,
        ALARM_OVERSPEED => AlarmKind::Overspeed,
        other => AlarmKind::Unknown(format!("unknown_{other:02x}")),
    }
}

fn bcd_digit_pair(byte: u8) -> Option<(u8, u8)> {
    let hi = byte >> 4;
    let lo = byte & 0x0F;
    (hi <= 9 && lo <= 9).then_some((hi, lo))
}

/// 4 字节压缩 BCD 坐标（DD MM mmmm）转十进制度。
fn bcd_to_degrees(raw: &[u8], axis_max: u16) -> Result<f64, CodecError> {
    let mut digits = [0u8; 8];
    for (i, byte) in raw.iter().take(4).enumerate() {
        let (hi, lo) = bcd_digit_pair(*byte).ok_or_else(|| {
            CodecError::InvalidCoordinate(format!("non-decimal nibble in 0x{byte:02x}"))
        })?;
        digits[i * 2] = hi;
        digits[i * 2 + 1] = lo;
    }

    let degrees = u16::from(digits[0]) * 10 + u16::from(digits[1]);
    let minutes = u16::from(digits[2]) * 10 + u16::from(digits[3]);
    let fraction = u32::from(digits[4]) * 1000
        + u32::from(digits[5]) * 100
        + u32::from(digits[6]) * 10
        + u32::from(digits[7]);

    if degrees > axis_max {
        return Err(CodecError::InvalidCoordinate(format!(
            "degrees {degrees} exceeds {axis_max}"
        )));
    }
    if minutes >= 60 {
        return Err(CodecError::InvalidCoordinate(format!(
            "minutes {minutes} out of range"
        )));
    }

    let value = f64::from(degrees) + (f64::from(minutes) + f64::from(fraction) / 10_000.0) / 60.0;
    if value > f64::from(axis_max) {
        return Err(CodecError::InvalidCoordinate(format!(
            "value {value} exceeds {axis_max}"
        )));
    }
    Ok(value)
}

/// 6 字节 BCD 时间（年月日时分秒，年偏移 2000）。
fn parse_timestamp(raw: &[u8]) -> Result<DateTime<Utc>, CodecError> {
    let mut parts = [0u8; 6];
    for (i, byte) in raw.iter().take(6).enumerate() {
        let (hi, lo) = bcd_digit_pair(*byte).ok_or_else(|| {
            CodecError::InvalidTimestamp(format!("non-decimal nibble in 0x{byte:02x}"))
        })?;
        parts[i] = hi * 10 + lo;
    }

    let [year, month, day, hour, minute, second] = parts;
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return Err(CodecError::InvalidTimestamp(format!(
            "out of range: {year:02}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )));
    }

    Utc.with_ymd_and_hms(
        2000 + i32::from(year),
        u32::from(month),
        u32::from(day),
        u32::from(hour),
        u32::from(minute),
        u32::from(second),
    )
    .single()
    .ok_or_else(|| {
        CodecError::InvalidTimestamp(format!("no such date: {year:02}-{month:02}-{day:02}"))
    })
}
