//! URL and input validation utilities

use std::path::Path;

use url::Url;

use crate::core::models::{AppError, AppResult};
use crate::utils::file_utils::get_file_extension;

/// Validate URL syntax
pub fn validate_url(url: &str) -> AppResult<Url> {
    Url::parse(url).map_err(|e| AppError::Parse(format!("Invalid URL format: {}", e)))
}

/// Check if URL is a valid http(s) video URL
pub fn is_valid_video_url(url: &str) -> bool {
    match validate_url(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Accept only `.csv` files (case-insensitive extension)
pub fn ensure_csv_file(path: &Path) -> AppResult<()> {
    match path.to_str().and_then(get_file_extension) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(()),
        _ => Err(AppError::Parse(format!(
            "Not a CSV file: {}",
            path.display()
        ))),
    }
}

/// Accept the MIME types browsers and OSes report for CSV
pub fn is_csv_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim();
    matches!(
        essence.to_ascii_lowercase().as_str(),
        "text/csv" | "application/csv" | "application/vnd.ms-excel" | "text/comma-separated-values"
    )
}
