//! Extension -> Content-Type table. Grounded on the teacher's
//! `http/response.rs::get_mime_type`; the static resource layout and the
//! table's contents are an out-of-scope collaborator per spec.md §1, so this
//! stays a small fixed match rather than a configurable registry.

pub fn for_path(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mp3") => "audio/mpeg",
        _ => "text/plain",
    }
}
