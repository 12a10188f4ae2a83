//! 协议解码输出的规范化数据模型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 接入协议标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Gt06,
    H02,
    Teltonika,
}

impl Protocol {
    /// 协议的线上标签（写入 Position.protocol）。
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Gt06 => "gt06",
            Protocol::H02 => "h02",
            Protocol::Teltonika => "teltonika",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议扩展属性值（有界类型联合，替代无类型 map）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<u8> for AttrValue {
    fn from(value: u8) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

/// 协议特有附加字段的属性映射（powerLevel、gsmSignal、alarm 等）。
pub type AttrMap = BTreeMap<String, AttrValue>;

/// 解码后的定位数据，尚未绑定设备身份。
///
/// 编解码器是无状态的，解码时不知道连接属于哪台设备；
/// 会话在发布前通过 [`Fix::into_position`] 绑定 device_id。
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    /// 设备上报的 UTC 时间；时间字段缺失时保持 None
    pub timestamp: Option<DateTime<Utc>>,
    /// 纬度（WGS-84 十进制度，[-90, 90]）
    pub latitude: f64,
    /// 经度（WGS-84 十进制度，[-180, 180]）
    pub longitude: f64,
    /// 海拔（米）
    pub altitude: Option<f64>,
    /// 速度（km/h）
    pub speed: f64,
    /// 航向（度，0-360）
    pub course: f64,
    /// GNSS 定位有效性
    pub valid: bool,
    /// 卫星数（0-15）
    pub satellites: u8,
    /// 来源协议
    pub protocol: Protocol,
    /// 协议特有扩展属性
    pub attributes: AttrMap,
}

impl Fix {
    /// 以必填字段构造，其余字段取默认值。
    pub fn new(protocol: Protocol, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp: None,
            latitude,
            longitude,
            altitude: None,
            speed: 0.0,
            course: 0.0,
            valid: false,
            satellites: 0,
            protocol,
            attributes: AttrMap::new(),
        }
    }

    /// 绑定设备身份，生成最终位置记录（Position 的唯一构造点）。
    pub fn into_position(self, device_id: impl Into<String>) -> Position {
        Position {
            device_id: device_id.into(),
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            speed: self.speed,
            course: self.course,
            valid: self.valid,
            satellites: self.satellites,
            protocol: self.protocol,
            attributes: self.attributes,
        }
    }
}

/// 规范化位置记录：所有协议的统一输出。
///
/// 构造后不可变，交给 PositionSink 恰好一次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub device_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: f64,
    pub course: f64,
    pub valid: bool,
    pub satellites: u8,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: AttrMap,
}
