//! Small helpers for logging, JSON formatting and file system checks.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a char boundary at or below `max` bytes and
/// suffixed with `"…(+N bytes)"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Serialize as JSON indented with four spaces, non-ASCII left as is.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    out.push(b'\n');
    Ok(out)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a scratch file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Data directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
