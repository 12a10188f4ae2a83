//! H02 协议编解码器
//!
//! ASCII 帧：`*HQ,` 前缀，逗号分隔字段，`#`（或换行）结尾。
//! 首字段为消息类型：`V1` 定位、`V2` 报警、`V3` 状态。
//! 坐标为 `DDMM.MMMM` / `DDDMM.MMMM` 度分格式，半球取自
//! N/S、E/W 字段；速度单位为节（× 1.852 转 km/h）；日期为
//! `DDMMYY` 六位数字，按 UTC 零点解释。

use crate::codec::{AlarmKind, Decoded, Frame, ProtocolCodec};
use crate::error::CodecError;
use chrono::{DateTime, TimeZone, Utc};
use domain::{AttrMap, Fix, Protocol};

const PREFIX: &str = "*HQ,";
const TERMINATOR: u8 = b'#';
const MIN_FRAME_LEN: usize = 20;

const MSG_LOCATION: &str = "V1";
const MSG_ALARM: &str = "V2";
const MSG_STATUS: &str = "V3";

// V1 字段（类型之后）：设备号、定位状态、纬度、N/S、经度、E/W、
// 速度、航向、日期、电量
const MIN_LOCATION_FIELDS: usize = 10;

const KNOTS_TO_KMH: f64 = 1.852;

const MAX_POWER_LEVEL: i64 = 100;
const MAX_GSM_SIGNAL: i64 = 31;

/// 纬度还是经度，决定半球字母与范围校验。
#[derive(Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

/// H02 编解码器（无状态，可共享）。
#[derive(Debug, Default)]
pub struct H02Codec;

impl H02Codec {
    pub fn new() -> Self {
        Self
    }

    fn decode_location(&self, fields: &[&str]) -> Result<Fix, CodecError> {
        if fields.len() < MIN_LOCATION_FIELDS {
            return Err(CodecError::MalformedPacket(format!(
                "location report requires {} fields, got {}",
                MIN_LOCATION_FIELDS,
                fields.len()
            )));
        }

        let latitude = parse_coordinate(fields[2], fields[3], Axis::Latitude)?;
        let longitude = parse_coordinate(fields[4], fields[5], Axis::Longitude)?;

        let knots: f64 = fields[6]
            .parse()
            .map_err(|_| CodecError::InvalidValue(format!("speed field `{}`", fields[6])))?;
        if !(0.0..=300.0).contains(&knots) {
            return Err(CodecError::InvalidValue(format!("speed {knots} knots")));
        }
        let course: f64 = fields[7]
            .parse()
            .map_err(|_| CodecError::InvalidValue(format!("course field `{}`", fields[7])))?;
        if !(0.0..=360.0).contains(&course) {
            return Err(CodecError::InvalidValue(format!("course {course}")));
        }

        // 日期字段是必填的：解析失败直接报错，绝不用本机时钟顶替
        let timestamp = parse_date(fields[8])?;

        let mut fix = Fix::new(Protocol::H02, latitude, longitude);
        fix.valid = fields[1] == "A";
        fix.speed = knots * KNOTS_TO_KMH;
        fix.course = course;
        fix.timestamp = Some(timestamp);
        if let Ok(power) = fields[9].parse::<i64>() {
            fix.attributes.insert(
                "powerLevel".to_string(),
                power.clamp(0, MAX_POWER_LEVEL).into(),
            );
        }
        // 可选的 GSM 信号字段
        if let Some(signal) = fields.get(10).and_then(|field| field.parse::<i64>().ok()) {
            fix.attributes.insert(
                "gsmSignal".to_string(),
                signal.clamp(0, MAX_GSM_SIGNAL).into(),
            );
        }
        Ok(fix)
    }

    fn decode_status(&self, fields: &[&str]) -> Result<Decoded, CodecError> {
        if fields.len() < 2 {
            return Err(CodecError::MalformedPacket(format!(
                "status report requires 2 fields, got {}",
                fields.len()
            )));
        }

        let mut attributes = AttrMap::new();
        if let Ok(power) = fields[1].parse::<i64>() {
            attributes.insert(
                "powerLevel".to_string(),
                power.clamp(0, MAX_POWER_LEVEL).into(),
            );
        }
        if let Some(signal) = fields.get(2).and_then(|field| field.parse::<i64>().ok()) {
            attributes.insert(
                "gsmSignal".to_string(),
                signal.clamp(0, MAX_GSM_SIGNAL).into(),
            );
        }
        if let Some(flags) = fields.get(3) {
            attributes.insert("charging".to_string(), flags.contains('C').into());
            attributes.insert("engineOn".to_string(), flags.contains('E').into());
        }
        Ok(Decoded::Status { attributes })
    }

    fn decode_alarm(&self, fields: &[&str]) -> Result<Decoded, CodecError> {
        let mut fix = self.decode_location(fields)?;
        let code = fields[fields.len() - 1];
        let kind = alarm_kind(code);
        fix.attributes
            .insert("alarm".to_string(), kind.label().into());
        Ok(Decoded::Alarm { fix, kind })
    }
}

impl ProtocolCodec for H02Codec {
    fn protocol(&self) -> Protocol {
        Protocol::H02
    }

    fn detect(&self, prefix: &[u8]) -> bool {
        prefix.len() >= 3 && &prefix[..3] == b"*HQ"
    }

    fn next_frame(&self, buf: &[u8]) -> Result<Option<Frame>, CodecError> {
        if buf.is_empty() {
            return Ok(None);
        }
        // 前缀逐字节校验：不匹配即失步
        let expected = PREFIX.as_bytes();
        let check = buf.len().min(expected.len());
        if buf[..check] != expected[..check] {
            return Err(CodecError::InvalidHeader(format!(
                "expected `*HQ,`, got {:?}",
                String::from_utf8_lossy(&buf[..check])
            )));
        }

        match buf
            .iter()
            .position(|byte| *byte == TERMINATOR || *byte == b'\n')
        {
            Some(pos) => Ok(Some(Frame { consumed: pos + 1 })),
            None => Ok(None),
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(CodecError::PacketTooShort {
                got: frame.len(),
                need: MIN_FRAME_LEN,
            });
        }

        let text = std::str::from_utf8(frame)
            .map_err(|_| CodecError::MalformedPacket("frame is not valid ascii".to_string()))?
            .trim();
        let body = text
            .strip_prefix(PREFIX)
            .ok_or_else(|| CodecError::InvalidHeader(format!("expected `*HQ,`, got `{text}`")))?
            .trim_end_matches('#');

        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() < 3 {
            return Err(CodecError::MalformedPacket(
                "insufficient fields".to_string(),
            ));
        }

        match fields[0] {
            MSG_LOCATION => Ok(Decoded::Location(self.decode_location(&fields[1..])?)),
            MSG_ALARM => self.decode_alarm(&fields[1..]),
            MSG_STATUS => self.decode_status(&fields[1..]),
            other => Err(CodecError::InvalidMessageType(format!("`{other}`"))),
        }
    }

    fn ack(&self, _decoded: &Decoded, _serial: u16) -> Option<Vec<u8>> {
        Some(b"*HQ,OK#".to_vec())
    }

    fn extract_unique_id(&self, frame: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(frame).ok()?.trim();
        let body = text.strip_prefix(PREFIX)?;
        let device_id = body.split(',').nth(1)?;
        (!device_id.is_empty()).then(|| device_id.to_string())
    }
}

/// `DDMM.MMMM` 度分坐标转十进制度，半球字母给出符号。
fn parse_coordinate(value: &str, hemisphere: &str, axis: Axis) -> Result<f64, CodecError> {
    let raw: f64 = value
        .parse()
        .map_err(|_| CodecError::InvalidCoordinate(format!("bad field `{value}`")))?;

    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return Err(CodecError::InvalidCoordinate(format!(
            "minutes {minutes} out of range"
        )));
    }

    let mut decimal = degrees + minutes / 60.0;
    let max = match axis {
        Axis::Latitude => {
            match hemisphere {
                "N" => {}
                "S" => decimal = -decimal,
                other => {
                    return Err(CodecError::InvalidCoordinate(format!(
                        "bad hemisphere `{other}`"
                    )));
                }
            }
            90.0
        }
        Axis::Longitude => {
            match hemisphere {
                "E" => {}
                "W" => decimal = -decimal,
                other => {
                    return Err(CodecError::InvalidCoordinate(format!(
                        "bad hemisphere `{other}`"
                    )));
                }
            }
            180.0
        }
    };

    if !(-max..=max).contains(&decimal) {
        return Err(CodecError::InvalidCoordinate(format!(
            "value {decimal} out of range"
        )));
    }
    Ok(decimal)
}

/// `DDMMYY` 日期字段，按 UTC 零点解释。
fn parse_date(field: &str) -> Result<DateTime<Utc>, CodecError> {
    if field.len() != 6 || !field.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(CodecError::InvalidTimestamp(format!(
            "bad date field `{field}`"
        )));
    }

    let day: u32 = field[0..2].parse().unwrap_or(0);
    let month: u32 = field[2..4].parse().unwrap_or(0);
    let year: i32 = 2000 + field[4..6].parse::<i32>().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(CodecError::InvalidTimestamp(format!(
            "out of range: day={day}, month={month}"
        )));
    }

    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .ok_or_else(|| CodecError::InvalidTimestamp(format!("no such date: `{field}`")))
}

fn alarm_kind(code: &str) -> AlarmKind {
    match code {
        "0" => AlarmKind::Sos,
        "1" => AlarmKind::PowerCut,
        "2" => AlarmKind::LowBattery,
        "3" => AlarmKind::Overspeed,
        "4" => AlarmKind::Geofence,
        other => AlarmKind::Unknown(format!("unknown_{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LOCATION: &[u8] = b"*HQ,V1,123456789012345,A,2237.7514,N,11408.6214,E,6,2,151022,10,1,6#";

    fn decode_fix(frame: &[u8]) -> Fix {
        match H02Codec::new().decode(frame).expect("decode") {
            Decoded::Location(fix) => fix,
            other => panic!("expected location, got {other:?}"),
        }
    }

    #[test]
    fn decodes_location_happy_path() {
        let fix = decode_fix(LOCATION);
        assert!(fix.valid);
        assert!((fix.latitude - 22.629_19).abs() < 1e-5);
        assert!((fix.longitude - 114.143_69).abs() < 1e-5);
        assert!((fix.speed - 11.112).abs() < 1e-9);
        assert_eq!(fix.course, 2.0);
        assert_eq!(
            fix.timestamp,
            Some(Utc.with_ymd_and_hms(2022, 10, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(fix.attributes.get("powerLevel"), Some(&10i64.into()));
        assert_eq!(fix.attributes.get("gsmSignal"), Some(&1i64.into()));
    }

    #[test]
    fn rejects_latitude_out_of_range() {
        let frame = b"*HQ,V1,123456789012345,A,9237.7514,N,11408.6214,E,6,2,151022,10,1,6#";
        let err = H02Codec::new().decode(frame).expect_err("latitude");
        assert!(matches!(err, CodecError::InvalidCoordinate(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn applies_hemisphere_sign() {
        let frame = b"*HQ,V1,123456789012345,A,2237.7514,S,11408.6214,W,6,2,151022,10#";
        let fix = decode_fix(frame);
        assert!(fix.latitude < 0.0);
        assert!(fix.longitude < 0.0);
    }

    #[test]
    fn invalid_fix_flag_marks_position_invalid() {
        let frame = b"*HQ,V1,123456789012345,V,2237.7514,N,11408.6214,E,6,2,151022,10#";
        assert!(!decode_fix(frame).valid);
    }

    #[test]
    fn rejects_minutes_out_of_range() {
        let frame = b"*HQ,V1,123456789012345,A,2260.0000,N,11408.6214,E,6,2,151022,10#";
        let err = H02Codec::new().decode(frame).expect_err("minutes");
        assert!(matches!(err, CodecError::InvalidCoordinate(_)));
    }

    #[test]
    fn rejects_bad_date() {
        let frame = b"*HQ,V1,123456789012345,A,2237.7514,N,11408.6214,E,6,2,153322,10#";
        let err = H02Codec::new().decode(frame).expect_err("date");
        assert!(matches!(err, CodecError::InvalidTimestamp(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn rejects_garbage_speed() {
        let frame = b"*HQ,V1,123456789012345,A,2237.7514,N,11408.6214,E,abc,2,151022,10#";
        let err = H02Codec::new().decode(frame).expect_err("speed");
        assert!(matches!(err, CodecError::InvalidValue(_)));
    }

    #[test]
    fn decodes_status_report() {
        let frame = b"*HQ,V3,123456789012345,120,45,CE#";
        match H02Codec::new().decode(frame).expect("decode") {
            Decoded::Status { attributes } => {
                // 电量与信号按协议上限截断
                assert_eq!(attributes.get("powerLevel"), Some(&100i64.into()));
                assert_eq!(attributes.get("gsmSignal"), Some(&31i64.into()));
                assert_eq!(attributes.get("charging"), Some(&true.into()));
                assert_eq!(attributes.get("engineOn"), Some(&true.into()));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn decodes_alarm_report() {
        let frame = b"*HQ,V2,123456789012345,A,2237.7514,N,11408.6214,E,6,2,151022,10,0#";
        match H02Codec::new().decode(frame).expect("decode") {
            Decoded::Alarm { fix, kind } => {
                assert_eq!(kind, AlarmKind::Sos);
                assert_eq!(fix.attributes.get("alarm"), Some(&"sos".into()));
            }
            other => panic!("expected alarm, got {other:?}"),
        }
    }

    #[test]
    fn maps_all_alarm_codes() {
        assert_eq!(alarm_kind("0"), AlarmKind::Sos);
        assert_eq!(alarm_kind("1"), AlarmKind::PowerCut);
        assert_eq!(alarm_kind("2"), AlarmKind::LowBattery);
        assert_eq!(alarm_kind("3"), AlarmKind::Overspeed);
        assert_eq!(alarm_kind("4"), AlarmKind::Geofence);
        assert_eq!(alarm_kind("9"), AlarmKind::Unknown("unknown_9".to_string()));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let frame = b"*HQ,V9,123456789012345,A,2237.7514#";
        let err = H02Codec::new().decode(frame).expect_err("type");
        assert!(matches!(err, CodecError::InvalidMessageType(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_short_frame() {
        let err = H02Codec::new().decode(b"*HQ,V1,1#").expect_err("short");
        assert!(matches!(err, CodecError::PacketTooShort { .. }));
    }

    #[test]
    fn next_frame_waits_for_terminator() {
        let codec = H02Codec::new();
        assert!(codec.next_frame(b"").expect("empty").is_none());
        assert!(codec.next_frame(b"*").expect("one byte").is_none());
        assert!(codec.next_frame(b"*HQ,V1,12345").expect("partial").is_none());

        let frame = codec.next_frame(LOCATION).expect("framed").expect("some");
        assert_eq!(frame.consumed, LOCATION.len());
    }

    #[test]
    fn next_frame_accepts_newline_terminator() {
        let mut data = b"*HQ,V3,123456789012345,80,20,C\n".to_vec();
        data.extend_from_slice(b"*HQ,");
        let frame = H02Codec::new().next_frame(&data).expect("framed").expect("some");
        assert_eq!(frame.consumed, 31);
    }

    #[test]
    fn next_frame_rejects_foreign_prefix() {
        let err = H02Codec::new().next_frame(b"xHQ,V1").expect_err("prefix");
        assert!(matches!(err, CodecError::InvalidHeader(_)));
    }

    #[test]
    fn extracts_device_id() {
        let codec = H02Codec::new();
        assert_eq!(
            codec.extract_unique_id(LOCATION).as_deref(),
            Some("123456789012345")
        );
        assert_eq!(codec.extract_unique_id(b"garbage"), None);
    }

    #[test]
    fn ack_is_constant() {
        let codec = H02Codec::new();
        let decoded = codec.decode(LOCATION).expect("decode");
        assert_eq!(codec.ack(&decoded, 1).expect("ack"), b"*HQ,OK#".to_vec());
        assert_eq!(codec.ack(&decoded, 9).expect("ack"), b"*HQ,OK#".to_vec());
    }
}
