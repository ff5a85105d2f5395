//! 编码检测与转换
//!
//! CSV 文件可能来自不同系统（Excel 导出的 GBK、带 BOM 的 UTF-8 等），
//! 在交给解析器之前统一转换为 UTF-8 文本。

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use tracing::debug;

/// BOM检测
pub fn detect_bom(data: &[u8]) -> Option<&'static Encoding> {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(UTF_8);
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return Some(UTF_16LE);
    }
    if data.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF_16BE);
    }
    None
}

/// 检测字节流编码
///
/// 检测顺序：
/// 1. BOM
/// 2. 合法 UTF-8 直接采用
/// 3. chardetng 猜测
pub fn detect_encoding(data: &[u8]) -> &'static Encoding {
    if data.is_empty() {
        return UTF_8;
    }

    if let Some(encoding) = detect_bom(data) {
        debug!("通过BOM检测到编码: {}", encoding.name());
        return encoding;
    }

    if std::str::from_utf8(data).is_ok() {
        return UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(data, true);
    let guess = detector.guess(None, true);
    debug!("通过chardetng检测到编码: {}", guess.name());
    guess
}

/// 解码为 UTF-8 字符串，返回文本和所用编码
///
/// 无法映射的字节以替换字符代替，不会失败。
pub fn decode_to_string(data: &[u8]) -> (String, &'static Encoding) {
    let encoding = detect_encoding(data);
    // decode() 会自行剥离 BOM
    let (decoded, used, had_errors) = encoding.decode(data);
    if had_errors {
        debug!("解码 {} 时存在无效字节，已替换", used.name());
    }
    (decoded.into_owned(), used)
}
