//! 调试用帧内容十六进制转储

use std::fmt::Write;

/// 按每行 16 字节格式化帧内容，用于 debug_protocols 日志。
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            if i % 16 == 0 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}
