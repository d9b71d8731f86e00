/// MIME type served when the extension is unknown or missing.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Best-effort MIME type for a file name, inferred from its extension.
///
/// Only the text after the last `.` is considered, case-insensitively.
pub fn media_type_for(file_name: &str) -> &'static str {
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => OCTET_STREAM,
    }
}
