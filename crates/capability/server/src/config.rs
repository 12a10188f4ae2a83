//! 接入服务器运行参数

use std::time::Duration;

/// 接入服务器配置。
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP 监听端口
    pub tcp_port: u16,
    /// 无入站字节多久后关闭会话
    pub idle_timeout: Duration,
    /// 单次回写的截止时间
    pub write_timeout: Duration,
    /// 每会话出站位置队列容量
    pub outbound_queue_cap: usize,
    /// 帧缓冲硬上限（字节）
    pub max_frame_bytes: usize,
    /// 允许 test- / demo- 前缀设备绕过注册表
    pub test_mode: bool,
    /// 按帧输出十六进制转储日志
    pub debug_protocols: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_port: 5023,
            idle_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(10),
            outbound_queue_cap: 64,
            max_frame_bytes: 65536,
            test_mode: false,
            debug_protocols: false,
        }
    }
}
