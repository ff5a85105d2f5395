//! CSV 导入测试模块
//!
//! 覆盖列识别、表头判定、链接规范化以及文件读取（编码检测）

#[cfg(test)]
mod tests {
    use crate::core::csv_ingest::*;
    use crate::core::config::ImportConfig;
    use crate::core::models::{AppError, ItemStatus};
    use anyhow::Result;
    use encoding_rs::{Encoding, GBK, UTF_8};
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    /// 创建指定编码的 CSV 临时文件
    fn create_csv_with_encoding(content: &str, encoding: &'static Encoding) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        let (encoded_bytes, _, _) = encoding.encode(content);
        file.write_all(&encoded_bytes)?;
        file.flush()?;
        Ok(file)
    }

    fn urls_and_titles(content: &str) -> Vec<(String, String)> {
        parse_video_csv(content)
            .into_iter()
            .map(|item| (item.url, item.title))
            .collect()
    }

    #[test]
    fn test_www_prefix_normalized() {
        let items = parse_video_csv("www.example.com/x,Example");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://www.example.com/x");
    }

    #[test]
    fn test_header_row_is_skipped() {
        assert_eq!(
            urls_and_titles("url,title\nhttps://youtu.be/a,A"),
            vec![("https://youtu.be/a".to_string(), "A".to_string())]
        );
    }

    #[test]
    fn test_headerless_file_keeps_row_zero() {
        assert_eq!(
            urls_and_titles("https://youtu.be/a,A\nhttps://youtu.be/b,B"),
            vec![
                ("https://youtu.be/a".to_string(), "A".to_string()),
                ("https://youtu.be/b".to_string(), "B".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_column_detected_anywhere() {
        let report = CsvIngest::new().parse_with_report("title,url\nFoo,https://youtu.be/a");
        assert_eq!(report.stats.url_column, 1);
        assert_eq!(report.stats.title_column, 0);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].title, "Foo");
        assert_eq!(report.items[0].url, "https://youtu.be/a");
    }

    #[test]
    fn test_missing_title_is_synthesized() {
        let items = parse_video_csv("https://youtu.be/a,\nhttps://youtu.be/b");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Video 1");
        assert_eq!(items[1].title, "Video 2");
    }

    #[test]
    fn test_title_equal_to_url_is_replaced() {
        let items = parse_video_csv("https://youtu.be/a,https://youtu.be/a");
        assert_eq!(items[0].title, "Video 1");
    }

    #[test]
    fn test_non_url_rows_dropped() {
        let items = parse_video_csv("not a url,Something\nhttps://youtu.be/a,A");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://youtu.be/a");

        assert!(parse_video_csv("not a url,Something").is_empty());
    }

    /// 匹配链接模式的行即使无法被 URL 解析也保留
    const LOOSE_LINK_ROWS: [(&str, &str); 4] = [
        ("www.exa mple.com/x,Title", "https://www.exa mple.com/x"),
        ("www.example.com:99999/x,Title", "https://www.example.com:99999/x"),
        ("https://,Title", "https://"),
        (
            "Watch on youtube.com/watch?v=1,Title",
            "https://Watch on youtube.com/watch?v=1",
        ),
    ];

    #[test]
    fn test_pattern_matched_rows_kept_without_url_parse() {
        for (content, expected_url) in LOOSE_LINK_ROWS {
            let items = parse_video_csv(content);
            assert_eq!(items.len(), 1, "row dropped: {}", content);
            assert_eq!(items[0].url, expected_url);
            assert_eq!(items[0].title, "Title");
        }
    }

    #[test]
    fn test_strict_urls_drops_unparseable_rows() {
        let ingest = CsvIngest::with_config(ImportConfig {
            strict_urls: true,
            ..ImportConfig::default()
        });
        for (content, _) in LOOSE_LINK_ROWS {
            let report = ingest.parse_with_report(content);
            assert!(report.items.is_empty(), "row kept: {}", content);
            assert_eq!(report.stats.skipped_rows, 1);
        }

        let items = ingest.parse("www.youtube.com/watch?v=1,Title");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=1");
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(parse_video_csv("").is_empty());
        assert!(parse_video_csv("   \n\r\n  \t ").is_empty());
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let content = "url,title\r\n\r\nhttps://youtu.be/a,A\r\n   \r\nhttps://youtu.be/b,B\r\n";
        let items = parse_video_csv(content);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title, "B");
    }

    #[test]
    fn test_semicolon_and_tab_delimiters() {
        let items = parse_video_csv("Link;Name\nyoutube.com/watch?v=1;First");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://youtube.com/watch?v=1");
        assert_eq!(items[0].title, "First");

        let report = CsvIngest::new().parse_with_report("name\tvideo url\nSecond\thttps://youtu.be/2");
        assert_eq!(report.stats.delimiter, '\t');
        assert_eq!(report.items[0].title, "Second");
    }

    #[test]
    fn test_quoted_cells() {
        let content = "\"url\",\"title\"\n\"https://youtu.be/a\",\"Hello, World\"\n“youtu.be/b”,‘Smart’";
        let items = parse_video_csv(content);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Hello, World");
        assert_eq!(items[1].url, "https://youtu.be/b");
        assert_eq!(items[1].title, "Smart");
    }

    #[test]
    fn test_keyword_header_beats_position() {
        // "Video Title" 也含 video，但 url 关键字优先
        let report =
            CsvIngest::new().parse_with_report("Video Title,Video URL\nIntro,https://youtu.be/a");
        assert_eq!(report.stats.url_column, 1);
        assert_eq!(report.stats.url_column_source, ColumnSource::Header);
        assert_eq!(report.items[0].title, "Intro");
    }

    #[test]
    fn test_pattern_scan_without_keywords() {
        let report = CsvIngest::new()
            .parse_with_report("Foo,Bar,Baz\nx,y,https://youtu.be/a\nx2,y2,https://youtu.be/b");
        assert!(report.stats.has_header);
        assert_eq!(report.stats.url_column, 2);
        assert_eq!(report.stats.url_column_source, ColumnSource::PatternScan);
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].title, "x");
    }

    #[test]
    fn test_single_column_file() {
        let items = parse_video_csv("https://youtu.be/a\nhttps://youtu.be/b");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Video 1");
        assert_eq!(items[1].title, "Video 2");
    }

    #[test]
    fn test_short_rows_skipped() {
        let items = parse_video_csv("title,url\nOnly a title\nFoo,https://youtu.be/a");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Foo");
    }

    #[test]
    fn test_items_are_pending_with_unique_ids() {
        let content = (0..50)
            .map(|i| format!("https://youtu.be/{i},Clip {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let items = parse_video_csv(&content);
        assert_eq!(items.len(), 50);
        assert!(items
            .iter()
            .all(|i| i.status == ItemStatus::Pending && i.progress == 0 && i.error.is_none()));

        let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(items[49].title, "Clip 49");
    }

    #[test]
    fn test_parse_stats() {
        let report = CsvIngest::new()
            .parse_with_report("url,title\nhttps://youtu.be/a,A\ngarbage,B\nwww.youtube.com/c,C");
        assert_eq!(report.stats.total_rows, 4);
        assert_eq!(report.stats.parsed_rows, 2);
        assert_eq!(report.stats.skipped_rows, 1);
        assert!(report.stats.has_header);
        assert_eq!(report.items[1].url, "https://www.youtube.com/c");
    }

    #[test]
    fn test_configured_delimiter_and_keywords() {
        let config = ImportConfig {
            delimiter: Some('|'),
            url_keywords: vec!["clip".to_string()],
            title_keywords: vec!["caption".to_string()],
            ..ImportConfig::default()
        };
        let items = CsvIngest::with_config(config).parse("caption|clip\nHi|youtu.be/x");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hi");
        assert_eq!(items[0].url, "https://youtu.be/x");
    }

    #[test]
    fn test_non_ascii_delimiter_splits_row() {
        let config = ImportConfig {
            delimiter: Some('§'),
            ..ImportConfig::default()
        };
        let items = CsvIngest::with_config(config).parse("url§title\nhttps://youtu.be/a§A");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://youtu.be/a");
        assert_eq!(items[0].title, "A");
    }

    #[test]
    fn test_template_parses_to_two_items() {
        let items = parse_video_csv(csv_template());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Never Gonna Give You Up");
        assert_eq!(TEMPLATE_FILE_NAME, "tubebatch_template.csv");
    }

    #[tokio::test]
    async fn test_parse_file_detects_gbk() {
        let content = "链接,标题\nhttps://youtu.be/a,第一集 视频教程\nhttps://youtu.be/b,第二集 视频教程";
        let file = create_csv_with_encoding(content, GBK).unwrap();

        let report = CsvIngest::new().parse_file(file.path()).await.unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].title, "第一集 视频教程");
        assert!(report.encoding.is_some());
        assert_ne!(report.encoding, Some(UTF_8));
    }

    #[tokio::test]
    async fn test_parse_file_with_utf8_bom() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(&[0xEF, 0xBB, 0xBF]).unwrap();
        file.write_all("url,title\nhttps://youtu.be/a,A".as_bytes()).unwrap();
        file.flush().unwrap();

        let report = CsvIngest::new().parse_file(file.path()).await.unwrap();
        assert_eq!(report.encoding, Some(UTF_8));
        assert!(report.stats.has_header);
        assert_eq!(report.items.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_file_rejects_other_extensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("videos.xlsx");
        std::fs::write(&path, "url\nhttps://youtu.be/a").unwrap();

        let result = CsvIngest::new().parse_file(&path).await;
        assert!(matches!(result, Err(AppError::Parse(_))));
    }
}
