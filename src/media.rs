//! Media-type registry for binary fields.
//!
//! Binary fields store a varuint media-type id resolved from a file
//! extension. Id 0 is the octet-stream fallback for unknown extensions;
//! the table order is part of the wire format and must not be reordered.

use tracing::warn;

/// `(file extension, media type)` — the index is the wire id.
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("bin", "application/octet-stream"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("xml", "application/xml"),
    ("js", "application/javascript"),
    ("wasm", "application/wasm"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("md", "text/markdown"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("ico", "image/vnd.microsoft.icon"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
];

/// Wire id for a file extension. Unknown extensions map to the
/// octet-stream fallback (id 0).
pub fn mime_id_by_ext(file_ext: &str) -> u64 {
    let ext = file_ext.trim_start_matches('.');
    match MEDIA_TYPES
        .iter()
        .position(|(e, _)| e.eq_ignore_ascii_case(ext))
    {
        Some(id) => id as u64,
        None => {
            warn!(ext, "unregistered media extension, falling back to octet-stream");
            0
        }
    }
}

/// File extension registered for a wire id.
pub fn ext_by_mime_id(id: u64) -> Option<&'static str> {
    MEDIA_TYPES.get(id as usize).map(|(ext, _)| *ext)
}

/// Media type string registered for a wire id.
pub fn mime_by_id(id: u64) -> Option<&'static str> {
    MEDIA_TYPES.get(id as usize).map(|(_, mime)| *mime)
}
