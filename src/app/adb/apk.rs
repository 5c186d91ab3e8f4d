use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;
use crate::app::models::ApkPreview;

pub fn normalize_apk_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(trimmed)
}

pub fn has_apk_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"))
}

/// Checks a typed or picked path before install: non-blank and an existing file.
pub fn validate_apk_path(path: &str, trace_id: &str) -> Result<PathBuf, AppError> {
    if path.trim().is_empty() {
        return Err(AppError::validation(
            "APK path is empty. Choose a valid .apk file.",
            trace_id,
        ));
    }
    let normalized = normalize_apk_path(path);
    if !normalized.is_file() {
        return Err(AppError::validation(
            format!(
                "APK path is invalid: {}. Choose a valid .apk file.",
                normalized.display()
            ),
            trace_id,
        ));
    }
    Ok(std::path::absolute(&normalized).unwrap_or(normalized))
}

/// Accepts a drop only when it is exactly one existing `.apk` file.
pub fn single_apk_from_paths(paths: &[PathBuf]) -> Option<PathBuf> {
    let [candidate] = paths else {
        return None;
    };
    if candidate.as_os_str().to_string_lossy().trim().is_empty() {
        return None;
    }
    if !has_apk_extension(candidate) || !candidate.is_file() {
        return None;
    }
    Some(candidate.clone())
}

pub fn format_file_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size_bytes < KB {
        format!("{size_bytes} B")
    } else if size_bytes < MB {
        format!("{:.1} KB", size_bytes as f64 / KB as f64)
    } else if size_bytes < GB {
        format!("{:.1} MB", size_bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size_bytes as f64 / GB as f64)
    }
}

/// File name and size only; the manifest is never parsed.
pub fn apk_preview(path: &str) -> Option<ApkPreview> {
    if path.trim().is_empty() {
        return None;
    }
    let normalized = normalize_apk_path(path);
    let metadata = fs::metadata(&normalized).ok().filter(|meta| meta.is_file())?;
    let file_name = normalized
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Some(ApkPreview {
        path: normalized.to_string_lossy().to_string(),
        file_name,
        size_bytes: metadata.len(),
        size_label: format_file_size(metadata.len()),
        package_name: None,
        version_name: None,
    })
}

pub fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
