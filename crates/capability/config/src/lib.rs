//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP 监听端口
    pub tcp_port: u16,
    /// 无入站字节多久后关闭会话（秒）
    pub idle_timeout_s: u64,
    /// 单次回写的截止时间（秒）
    pub write_timeout_s: u64,
    /// 每会话出站位置队列容量
    pub outbound_queue_cap: usize,
    /// 帧缓冲硬上限（字节）
    pub max_frame_bytes: usize,
    /// 允许 test- / demo- 前缀设备绕过注册表
    pub test_mode: bool,
    /// 按帧输出十六进制转储日志
    pub debug_protocols: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tcp_port: read_u16_with_default("GEOTRACK_TCP_PORT", 5023)?,
            idle_timeout_s: read_u64_with_default("GEOTRACK_IDLE_TIMEOUT_S", 600)?,
            write_timeout_s: read_u64_with_default("GEOTRACK_WRITE_TIMEOUT_S", 10)?,
            outbound_queue_cap: read_usize_with_default("GEOTRACK_OUTBOUND_QUEUE_CAP", 64)?,
            max_frame_bytes: read_usize_with_default("GEOTRACK_MAX_FRAME_BYTES", 65536)?,
            test_mode: read_bool_with_default("GEOTRACK_TEST_MODE", false),
            debug_protocols: read_bool_with_default("GEOTRACK_DEBUG_PROTOCOLS", false),
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
