//! File extension to MIME type mapping
//!
//! Used to fill in a missing `format` tag after signing an artifact.

/// Look up the MIME type for a file extension (without the dot)
pub fn from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "zip" => Some("application/zip"),
        "json" => Some("application/json"),
        "pdf" => Some("application/pdf"),
        "usfm" => Some("text/usfm"),
        "md" => Some("text/markdown"),
        "txt" => Some("text/plain"),
        "yaml" | "yml" => Some("text/yaml"),
        "mp3" => Some("audio/mp3"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

/// MIME type for a file path, keyed on its extension
pub fn from_path(path: &std::path::Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(from_extension)
}
