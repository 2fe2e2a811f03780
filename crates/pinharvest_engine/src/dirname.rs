use chrono::{NaiveDate, NaiveTime};

const MAX_SEGMENT_BYTES: usize = 255;

/// Name of the per-run root directory, e.g. `pinharvest-2024-05-01`.
pub fn dated_root_name(date: NaiveDate) -> String {
    format!("pinharvest-{}", date.format("%Y-%m-%d"))
}

/// Name shared by every group whose key cannot be used as a directory name
/// in a run, e.g. `capture-14-03-59`.
pub fn fallback_dir_name(time: NaiveTime) -> String {
    format!("capture-{}", time.format("%H-%M-%S"))
}

/// File name of the `number`th image of a group (1-based).
pub fn image_file_name(number: usize) -> String {
    format!("img{number}.jpg")
}

/// Whether `name` can be used as a single path segment on common hosts.
pub fn is_legal_segment(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_SEGMENT_BYTES {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    if name.chars().any(is_forbidden) {
        return false;
    }
    if name.ends_with(['.', ' ']) || name.starts_with(' ') {
        return false;
    }
    !is_reserved_windows_name(name)
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}
