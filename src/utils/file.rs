//! File helpers for document uploads.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// SHA-256 checksum of content, hex encoded.
pub fn calculate_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Whether a file can be uploaded as plain text.
///
/// PDF and office formats are rejected here; parsing them is left to
/// dedicated tools.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_binary_extension(&ext) {
            return false;
        }
        if content_type_for_extension(&ext).is_some() {
            return true;
        }
    }

    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut buffer = [0u8; 512];
    let mut reader = std::io::BufReader::new(file);
    match reader.read(&mut buffer) {
        Ok(0) => true,
        Ok(n) => !buffer[..n].contains(&0),
        Err(_) => false,
    }
}

/// Read a file as UTF-8, refusing anything above `max_size` bytes.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read_to_string(path)
}

/// Content type recorded in document metadata.
pub fn content_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| content_type_for_extension(&e.to_string_lossy().to_lowercase()))
        .unwrap_or("text/plain")
}

fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    let ct = match ext {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" | "mdx" => "text/markdown",
        "json" | "jsonl" => "application/json",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" | "ini" | "cfg" | "conf" => "text/plain",
        "rs" | "py" | "js" | "ts" | "jsx" | "tsx" | "go" | "java" | "kt" | "c" | "h" | "cpp"
        | "hpp" | "rb" | "php" | "swift" | "sh" | "sql" | "css" => "text/x-source",
        _ => return None,
    };
    Some(ct)
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "o"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "webp"
            | "ico"
            | "mp3"
            | "mp4"
            | "mov"
            | "wav"
            | "zip"
            | "tar"
            | "gz"
            | "7z"
            | "pdf"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "woff"
            | "woff2"
            | "sqlite"
            | "db"
            | "bin"
    )
}
