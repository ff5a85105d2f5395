//! 归档导出 - 把已完成条目打包成 ZIP
//!
//! 每个已完成条目写入一个占位文件，文件名来自清洗后的标题。导出失败只返回
//! 错误，不会修改任何条目状态。

use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::config::ArchiveConfig;
use crate::core::models::{ItemStatus, WorkItem};
use crate::utils::file_utils::sanitize_filename;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("No completed items to export")]
    NothingToExport,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// 导出结果
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub path: PathBuf,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveExporter {
    config: ArchiveConfig,
}

impl ArchiveExporter {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// 占位内容
    pub fn placeholder_content(item: &WorkItem) -> String {
        format!(
            "Simulated video content for: {}\nSource: {}",
            item.title, item.url
        )
    }

    pub fn entry_name(&self, title: &str) -> String {
        format!("{}.{}", sanitize_filename(title), self.config.entry_extension)
    }

    /// 归档文件名，带毫秒时间戳
    pub fn archive_file_name(&self) -> String {
        format!(
            "{}-{}.zip",
            self.config.file_prefix,
            chrono::Utc::now().timestamp_millis()
        )
    }

    /// 计算已完成条目的归档条目名（保持队列顺序，重名追加 " (n)"）
    pub fn plan_entries<'a>(&self, items: &'a [WorkItem]) -> Vec<(String, &'a WorkItem)> {
        let mut used = HashSet::new();
        let mut entries = Vec::new();

        for item in items.iter().filter(|i| i.status == ItemStatus::Completed) {
            let base = sanitize_filename(&item.title);
            let mut name = self.entry_name(&item.title);
            let mut n = 2;
            while used.contains(&name) {
                name = format!("{} ({}).{}", base, n, self.config.entry_extension);
                n += 1;
            }
            used.insert(name.clone());
            entries.push((name, item));
        }

        entries
    }

    /// 写入任意可寻址的输出
    pub fn write_archive<W: Write + Seek>(
        &self,
        items: &[WorkItem],
        writer: W,
    ) -> Result<Vec<String>, ArchiveError> {
        let entries = self.plan_entries(items);
        if entries.is_empty() {
            return Err(ArchiveError::NothingToExport);
        }

        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut names = Vec::with_capacity(entries.len());
        for (name, item) in entries {
            debug!("Adding archive entry {}", name);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(Self::placeholder_content(item).as_bytes())?;
            names.push(name);
        }

        zip.finish()?;
        Ok(names)
    }

    /// 导出到目录，返回生成的归档路径
    pub async fn export(
        &self,
        items: &[WorkItem],
        output_dir: &Path,
    ) -> Result<ArchiveReport, ArchiveError> {
        if !items.iter().any(|i| i.status == ItemStatus::Completed) {
            return Err(ArchiveError::NothingToExport);
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let path = output_dir.join(self.archive_file_name());
        let exporter = self.clone();
        let items = items.to_vec();
        let target = path.clone();

        let entries = tokio::task::spawn_blocking(move || {
            let file = File::create(&target)?;
            exporter.write_archive(&items, file)
        })
        .await
        .map_err(|e| {
            ArchiveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })??;

        info!("📦 Exported {} items to {:?}", entries.len(), path);
        Ok(ArchiveReport { path, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ItemUpdate;
    use std::io::{Cursor, Read};

    fn completed(url: &str, title: &str) -> WorkItem {
        let mut item = WorkItem::new(url, title);
        item.apply(&ItemUpdate::completed("12.0MB"));
        item
    }

    #[test]
    fn test_only_completed_items_are_archived() {
        let exporter = ArchiveExporter::default();
        let items = vec![
            completed("https://youtu.be/a", "First: Part 1/2"),
            WorkItem::new("https://youtu.be/b", "Pending one"),
            completed("https://youtu.be/c", "Second"),
        ];

        let mut buffer = Cursor::new(Vec::new());
        let names = exporter.write_archive(&items, &mut buffer).unwrap();
        assert_eq!(names, vec!["First- Part 1-2.mp4", "Second.mp4"]);

        let mut archive = zip::ZipArchive::new(Cursor::new(buffer.into_inner())).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("First- Part 1-2.mp4")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(
            content,
            "Simulated video content for: First: Part 1/2\nSource: https://youtu.be/a"
        );
    }

    #[test]
    fn test_duplicate_titles_get_suffix() {
        let exporter = ArchiveExporter::default();
        let items = vec![
            completed("https://youtu.be/a", "Clip"),
            completed("https://youtu.be/b", "Clip"),
            completed("https://youtu.be/c", "Clip"),
        ];
        let names: Vec<String> = exporter
            .plan_entries(&items)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Clip.mp4", "Clip (2).mp4", "Clip (3).mp4"]);
    }

    #[test]
    fn test_nothing_to_export() {
        let exporter = ArchiveExporter::default();
        let items = vec![WorkItem::new("https://youtu.be/a", "A")];
        let result = exporter.write_archive(&items, Cursor::new(Vec::new()));
        assert!(matches!(result, Err(ArchiveError::NothingToExport)));
    }

    #[tokio::test]
    async fn test_export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ArchiveExporter::default();
        let items = vec![completed("https://youtu.be/a", "A")];

        let report = exporter.export(&items, dir.path()).await.unwrap();
        let file_name = report.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("tubebatch-archive-"));
        assert!(file_name.ends_with(".zip"));
        assert!(report.path.exists());
        assert_eq!(report.entries, vec!["A.mp4"]);
    }

    #[tokio::test]
    async fn test_export_creates_nested_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("exports").join("2024");
        let exporter = ArchiveExporter::default();
        let items = vec![completed("https://youtu.be/a", "A")];

        let report = exporter.export(&items, &output).await.unwrap();
        assert!(output.is_dir());
        assert_eq!(report.path.parent(), Some(output.as_path()));
        assert!(report.path.exists());
    }

    #[tokio::test]
    async fn test_export_leaves_items_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ArchiveExporter::default();
        let items = vec![WorkItem::new("https://youtu.be/a", "A")];
        let before = items.clone();

        let result = exporter.export(&items, dir.path()).await;
        assert!(matches!(result, Err(ArchiveError::NothingToExport)));
        assert_eq!(items, before);
    }
}
