//! CSV 导入模块
//!
//! 把任意 CSV 文本转换为有序的 [`WorkItem`] 列表，不依赖固定的列位置或表头。
//!
//! ## 列识别策略
//!
//! - **分隔符**: 首行含制表符用 `\t`，否则含分号用 `;`，否则用 `,`
//! - **链接列**: 首行不含链接时按表头关键字匹配；否则扫描前几行找第一个像链接的单元格；都失败则取第 0 列
//! - **标题列**: 表头关键字匹配；失败则取链接列以外的第一列
//! - **表头判定**: 第 0 行链接列的单元格不像链接即视为表头
//!
//! 解析永不失败：无效行会被静默丢弃，空输入得到空列表。

use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

use encoding_rs::Encoding;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::ImportConfig;
use crate::core::models::{AppResult, WorkItem};
use crate::utils::encoding::decode_to_string;
use crate::utils::validation::{ensure_csv_file, is_valid_video_url};

/// 模板文件的默认下载名
pub const TEMPLATE_FILE_NAME: &str = "tubebatch_template.csv";

const CSV_TEMPLATE: &str = "url,title\n\
https://www.youtube.com/watch?v=dQw4w9WgXcQ,Never Gonna Give You Up\n\
https://www.youtube.com/watch?v=9bZkp7q19f0,PSY - GANGNAM STYLE";

/// 单元格两端可剥离的引号（直引号与弯引号）
const QUOTE_CHARS: [char; 6] = ['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)youtube\.com|youtu\.be|^https?://|^www\.").expect("URL pattern is valid")
    })
}

/// 单元格是否像一个视频链接
pub fn looks_like_url(cell: &str) -> bool {
    url_pattern().is_match(cell.trim())
}

/// 规范化链接：保留 http(s):// 前缀，其余一律补 `https://`
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// 标准两列模板（表头 + 两行示例）
pub fn csv_template() -> &'static str {
    CSV_TEMPLATE
}

/// 列号的来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnSource {
    /// 表头关键字匹配
    Header,
    /// 按链接模式扫描数据行
    PatternScan,
    /// 回退到默认列
    Fallback,
}

/// 解析结果统计信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseStats {
    /// 非空行数（含表头）
    pub total_rows: usize,
    /// 成功生成条目的行数
    pub parsed_rows: usize,
    /// 被丢弃的数据行数
    pub skipped_rows: usize,
    /// 使用的分隔符
    pub delimiter: char,
    /// 第 0 行是否被当作表头
    pub has_header: bool,
    pub url_column: usize,
    pub url_column_source: ColumnSource,
    pub title_column: usize,
    pub title_column_source: ColumnSource,
    /// 解析耗时（毫秒）
    pub parse_time_ms: u64,
}

/// 解析输出：条目 + 统计
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub items: Vec<WorkItem>,
    pub stats: ParseStats,
    /// 文件导入时检测到的编码
    pub encoding: Option<&'static Encoding>,
}

/// CSV 导入器
#[derive(Debug, Clone)]
pub struct CsvIngest {
    config: ImportConfig,
}

impl Default for CsvIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvIngest {
    pub fn new() -> Self {
        Self {
            config: ImportConfig::default(),
        }
    }

    pub fn with_config(config: ImportConfig) -> Self {
        Self { config }
    }

    /// 解析 CSV 文本，返回有序条目
    pub fn parse(&self, content: &str) -> Vec<WorkItem> {
        self.parse_with_report(content).items
    }

    /// 解析 CSV 文本并返回统计信息
    pub fn parse_with_report(&self, content: &str) -> IngestReport {
        let start_time = Instant::now();

        // 同时支持 \n 与 \r\n
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let delimiter = match self.config.delimiter {
            Some(delimiter) => delimiter,
            None => lines.first().map(|l| detect_delimiter(l)).unwrap_or(','),
        };

        let mut stats = ParseStats {
            total_rows: lines.len(),
            parsed_rows: 0,
            skipped_rows: 0,
            delimiter,
            has_header: false,
            url_column: 0,
            url_column_source: ColumnSource::Fallback,
            title_column: 0,
            title_column_source: ColumnSource::Fallback,
            parse_time_ms: 0,
        };

        if lines.is_empty() {
            debug!("输入为空，没有可导入的行");
            return IngestReport {
                items: Vec::new(),
                stats,
                encoding: None,
            };
        }

        let rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| split_line(line, delimiter))
            .collect();

        // 首行含链接时它必然是数据行，不参与表头关键字匹配
        let header_candidate = !rows[0].iter().any(|cell| looks_like_url(cell));

        let (url_column, url_source) = self.detect_url_column(&rows, header_candidate);
        let (title_column, title_source) =
            self.detect_title_column(&rows, url_column, header_candidate);

        let has_header = !rows[0]
            .get(url_column)
            .map(|cell| looks_like_url(cell))
            .unwrap_or(false);

        stats.url_column = url_column;
        stats.url_column_source = url_source;
        stats.title_column = title_column;
        stats.title_column_source = title_source;
        stats.has_header = has_header;

        debug!(
            "列识别: 分隔符={:?}, 链接列={} ({:?}), 标题列={} ({:?}), 表头={}",
            delimiter, url_column, url_source, title_column, title_source, has_header
        );

        let mut items: Vec<WorkItem> = Vec::new();
        let data_start = usize::from(has_header);

        for (row_index, row) in rows.iter().enumerate().skip(data_start) {
            let raw_url = match row.get(url_column) {
                Some(cell) if !cell.is_empty() && looks_like_url(cell) => cell,
                _ => {
                    debug!("跳过第{}行: 链接列为空或不是链接", row_index + 1);
                    stats.skipped_rows += 1;
                    continue;
                }
            };

            let url = normalize_url(raw_url);
            if self.config.strict_urls && !is_valid_video_url(&url) {
                debug!("跳过第{}行: 无法解析的链接 {}", row_index + 1, url);
                stats.skipped_rows += 1;
                continue;
            }

            let title = row
                .get(title_column)
                .map(|cell| cell.trim())
                .filter(|cell| is_usable_title(cell, raw_url, &url))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Video {}", items.len() + 1));

            items.push(WorkItem::new(url, title));
        }

        stats.parsed_rows = items.len();
        stats.parse_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "CSV解析完成: 总行数={}, 成功解析={}, 跳过={}",
            stats.total_rows, stats.parsed_rows, stats.skipped_rows
        );

        IngestReport {
            items,
            stats,
            encoding: None,
        }
    }

    /// 读取并解析 CSV 文件（校验扩展名、自动检测编码）
    pub async fn parse_file<P: AsRef<Path>>(&self, file_path: P) -> AppResult<IngestReport> {
        let (content, encoding) = read_csv_file(file_path.as_ref()).await?;
        let mut report = self.parse_with_report(&content);
        report.encoding = Some(encoding);
        Ok(report)
    }

    /// 确定链接列
    fn detect_url_column(&self, rows: &[Vec<String>], header_candidate: bool) -> (usize, ColumnSource) {
        if header_candidate {
            if let Some(index) = keyword_column(&rows[0], &self.config.url_keywords, None) {
                return (index, ColumnSource::Header);
            }
        }

        for row in rows.iter().take(self.config.header_scan_rows.max(1)) {
            if let Some(index) = row.iter().position(|cell| looks_like_url(cell)) {
                return (index, ColumnSource::PatternScan);
            }
        }

        (0, ColumnSource::Fallback)
    }

    /// 确定标题列
    fn detect_title_column(
        &self,
        rows: &[Vec<String>],
        url_column: usize,
        header_candidate: bool,
    ) -> (usize, ColumnSource) {
        if header_candidate {
            if let Some(index) =
                keyword_column(&rows[0], &self.config.title_keywords, Some(url_column))
            {
                return (index, ColumnSource::Header);
            }
        }

        let width = rows
            .iter()
            .take(self.config.header_scan_rows.max(1))
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        if width > 1 {
            let index = if url_column == 0 { 1 } else { 0 };
            (index, ColumnSource::Fallback)
        } else {
            (url_column, ColumnSource::Fallback)
        }
    }
}

/// 快速解析（使用默认配置）
pub fn parse_video_csv(content: &str) -> Vec<WorkItem> {
    CsvIngest::new().parse(content)
}

/// 读取 CSV 文件为 UTF-8 文本
///
/// 非 `.csv` 扩展名直接拒绝；编码按 BOM、UTF-8、chardetng 的顺序检测。
pub async fn read_csv_file(path: &Path) -> AppResult<(String, &'static Encoding)> {
    ensure_csv_file(path)?;
    let bytes = tokio::fs::read(path).await?;
    let (content, encoding) = decode_to_string(&bytes);
    debug!("读取 {}: 编码 {}", path.display(), encoding.name());
    Ok((content, encoding))
}

/// 根据首行检测分隔符
pub fn detect_delimiter(first_line: &str) -> char {
    if first_line.contains('\t') {
        '\t'
    } else if first_line.contains(';') {
        ';'
    } else {
        ','
    }
}

/// 按分隔符切分一行，支持引号包裹的字段
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    // csv 只接受单字节分隔符
    if !delimiter.is_ascii() {
        return line.split(delimiter).map(clean_cell).collect();
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(clean_cell).collect(),
        Ok(false) => Vec::new(),
        Err(e) => {
            debug!("CSV行解析失败，按分隔符直接切分: {}", e);
            line.split(delimiter).map(clean_cell).collect()
        }
    }
}

/// 去除空白并剥离一层成对的引号
fn clean_cell(cell: &str) -> String {
    let trimmed = cell.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if QUOTE_CHARS.contains(&first) && QUOTE_CHARS.contains(&last) => {
            chars.as_str().trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// 按关键字顺序查找表头列，第一个命中的关键字胜出，同一关键字取最左列
fn keyword_column(header: &[String], keywords: &[String], exclude: Option<usize>) -> Option<usize> {
    let lowered: Vec<String> = header.iter().map(|cell| cell.to_lowercase()).collect();

    keywords.iter().find_map(|keyword| {
        let keyword = keyword.to_lowercase();
        lowered
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != exclude)
            .find(|(_, cell)| !cell.is_empty() && cell.contains(&keyword))
            .map(|(index, _)| index)
    })
}

fn is_usable_title(title: &str, raw_url: &str, url: &str) -> bool {
    !title.is_empty() && title != raw_url && title != url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("url\ttitle"), '\t');
        assert_eq!(detect_delimiter("url;title"), ';');
        assert_eq!(detect_delimiter("url,title"), ',');
        assert_eq!(detect_delimiter("url\ttitle;x"), '\t');
    }

    #[test]
    fn test_clean_cell_strips_one_quote_layer() {
        assert_eq!(clean_cell("  \"Foo\"  "), "Foo");
        assert_eq!(clean_cell("\u{201C}Smart\u{201D}"), "Smart");
        assert_eq!(clean_cell("''double''"), "'double'");
        assert_eq!(clean_cell("'Til Tuesday"), "'Til Tuesday");
        assert_eq!(clean_cell("\""), "\"");
    }

    #[test]
    fn test_split_line_honours_quotes() {
        let cells = split_line("https://youtu.be/a,\"Hello, World\"", ',');
        assert_eq!(cells, vec!["https://youtu.be/a", "Hello, World"]);
    }

    #[test]
    fn test_looks_like_url() {
        assert!(looks_like_url("https://example.com/x"));
        assert!(looks_like_url("HTTP://EXAMPLE.COM"));
        assert!(looks_like_url("www.example.com"));
        assert!(looks_like_url("m.youtube.com/watch?v=1"));
        assert!(looks_like_url("youtu.be/abc"));
        assert!(!looks_like_url("not a url"));
        assert!(!looks_like_url("url"));
        assert!(!looks_like_url(""));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("www.example.com/x"), "https://www.example.com/x");
        assert_eq!(normalize_url("youtube.com/watch?v=1"), "https://youtube.com/watch?v=1");
        assert_eq!(normalize_url("http://youtu.be/a"), "http://youtu.be/a");
        assert_eq!(normalize_url("//youtu.be/a"), "https://youtu.be/a");
    }

    #[test]
    fn test_keyword_column_order() {
        let header: Vec<String> = ["Video Title", "Video URL"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let config = ImportConfig::default();
        // "url" 排在 "video" 之前，所以命中第 1 列
        assert_eq!(keyword_column(&header, &config.url_keywords, None), Some(1));
        assert_eq!(
            keyword_column(&header, &config.title_keywords, Some(1)),
            Some(0)
        );
    }

    #[test]
    fn test_template_shape() {
        let template = csv_template();
        let lines: Vec<&str> = template.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "url,title");
        assert_eq!(parse_video_csv(template).len(), 2);
    }
}
