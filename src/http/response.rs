//! Constructs status line, headers, and body; maps static files by memory
//! mapping (spec.md §4.6, component C6). Grounded on the teacher's
//! `http/response.rs` (`to_bytes`, `get_mime_type`, `handle_error`), with
//! the body made a zero-copy `memmap2::Mmap` instead of a `Vec<u8>`, per
//! spec.md §3's `Response.mapped` field and §9's "preserve this
//! optimization" note.

use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::buffer::Buffer;
use crate::mime;

fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Bad Request",
    }
}

fn error_page_path(code: u16) -> Option<&'static str> {
    match code {
        400 => Some("/400.html"),
        403 => Some("/403.html"),
        404 => Some("/404.html"),
        500 => Some("/500.html"),
        _ => None,
    }
}

pub struct Response {
    pub code: u16,
    pub keep_alive: bool,
    pub path: String,
    src_dir: PathBuf,
    mapped: Option<Mmap>,
}

impl Response {
    /// Resets builder state; releases any prior mapping first (spec.md
    /// §4.6 `init`).
    pub fn init(src_dir: impl Into<PathBuf>, path: impl Into<String>, keep_alive: bool, code: i32) -> Self {
        Response {
            // -1 means "unset"; represented here as 0, checked below.
            code: if code < 0 { 0 } else { code as u16 },
            keep_alive,
            path: path.into(),
            src_dir: src_dir.into(),
            mapped: None,
        }
    }

    pub fn unmap_file(&mut self) {
        self.mapped = None;
    }

    pub fn file_len(&self) -> usize {
        self.mapped.as_ref().map_or(0, |m| m.len())
    }

    pub fn file(&self) -> Option<&[u8]> {
        self.mapped.as_deref()
    }

    /// Resolves `src_dir ++ path`, sets the status code and headers into
    /// `buf`, and memory-maps the resolved file read-only/private. Follows
    /// the step order in spec.md §4.6 exactly.
    pub fn make_response(&mut self, buf: &mut Buffer) {
        self.unmap_file();

        // Steps 1-3 (spec.md §4.6) only derive the code from a stat of
        // `path` when the caller left it unset (`code == 0` here, `-1` at
        // the `init` call site). A caller that already knows the code (the
        // 400 built for a malformed request line, whose `path` is empty and
        // would otherwise resolve to `src_dir` itself, a directory) keeps
        // it: re-deriving from a stat of a path that was never meant to be
        // served would silently overwrite an explicit 400 with a 404.
        if self.code == 0 {
            let resolved = self.resolve(&self.path);
            match std::fs::metadata(&resolved) {
                Err(_) => self.code = 404,
                Ok(m) if m.is_dir() => self.code = 404,
                Ok(m) if m.permissions().mode() & 0o004 == 0 => self.code = 403,
                Ok(_) => self.code = 200,
            }
        }

        let mut final_path = self.path.clone();
        if let Some(err_path) = error_page_path(self.code) {
            final_path = err_path.to_string();
        }
        let resolved = self.resolve(&final_path);

        // Unknown codes force 400 Bad Request (spec.md §4.6 step 5).
        if !matches!(self.code, 200 | 400 | 403 | 404 | 500) {
            self.code = 400;
        }

        // Attempt the open/mmap before writing a single byte of the status
        // line or headers: whether it succeeds decides `keep_alive` (a map
        // failure forces `Connection: close`, spec.md §7), and the
        // `Connection` header must match whatever the wire actually carries
        // rather than being written against a since-changed `keep_alive`.
        let mapped = match File::open(&resolved) {
            Ok(file) => unsafe { Mmap::map(&file) }.ok(),
            Err(_) => None,
        };

        if mapped.is_none() {
            self.keep_alive = false;
        }
        self.write_status_and_headers(buf, &final_path);

        match mapped {
            Some(mmap) => {
                buf.append(format!("Content-Length: {}\r\n\r\n", mmap.len()).as_bytes());
                self.mapped = Some(mmap);
            }
            None => self.write_inline_error_body(buf),
        }
    }

    fn write_status_and_headers(&self, buf: &mut Buffer, final_path: &str) {
        buf.append(format!("HTTP/1.1 {} {}\r\n", self.code, reason_phrase(self.code)).as_bytes());

        if self.keep_alive {
            buf.append(b"Connection: keep-alive\r\n");
            buf.append(b"keep-alive: max=6, timeout=120\r\n");
        } else {
            buf.append(b"Connection: close\r\n");
        }
        buf.append(format!("Content-Type: {}\r\n", mime::for_path(Path::new(final_path))).as_bytes());
    }

    fn write_inline_error_body(&mut self, buf: &mut Buffer) {
        let body = b"<html><body><h1>500 Internal Server Error</h1></body></html>";
        buf.append(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        buf.append(body);
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.src_dir.clone();
        full.push(path.trim_start_matches('/'));
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn tmp_site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("index.html")).unwrap();
        f.write_all(b"0123456789abcdef").unwrap(); // 17 bytes
        f.write_all(b"g").unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        dir
    }

    #[test]
    fn ok_response_length_matches_header_plus_body_exactly() {
        let dir = tmp_site();
        let mut buf = Buffer::new();
        let mut resp = Response::init(dir.path(), "/index.html", true, -1);
        resp.make_response(&mut buf);
        assert_eq!(resp.code, 200);
        let header_len = buf.readable_bytes();
        let body_len = resp.file_len();
        assert_eq!(body_len, 17);
        let header_str = String::from_utf8_lossy(buf.peek());
        assert!(header_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(header_str.contains("Content-Length: 17\r\n"));
        assert!(header_str.contains("Connection: keep-alive\r\n"));
        assert_eq!(header_len + body_len, header_len + 17);
    }

    #[test]
    fn missing_file_yields_404_and_substitutes_error_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("404.html"), b"not found page").unwrap();
        let mut buf = Buffer::new();
        let mut resp = Response::init(dir.path(), "/does-not-exist", false, -1);
        resp.make_response(&mut buf);
        assert_eq!(resp.code, 404);
        assert!(String::from_utf8_lossy(buf.peek()).contains("404 Not Found"));
        assert_eq!(resp.file().unwrap(), b"not found page");
    }

    #[test]
    fn explicit_code_with_empty_path_is_not_overwritten_by_directory_stat() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("400.html"), b"bad request page").unwrap();
        let mut buf = Buffer::new();
        // `path` is "" here, exactly as `Connection::process` builds it on a
        // parse failure; `src_dir ++ ""` resolves to `src_dir` itself, a
        // directory, which must not overwrite the explicit 400.
        let mut resp = Response::init(dir.path(), "", false, 400);
        resp.make_response(&mut buf);
        assert_eq!(resp.code, 400);
        let header_str = String::from_utf8_lossy(buf.peek());
        assert!(header_str.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{header_str}");
        assert_eq!(resp.file().unwrap(), b"bad request page");
    }

    #[test]
    fn map_failure_forces_close_header_to_match_actual_keep_alive() {
        // No file at all exists under `dir`, including no error pages, so
        // `File::open` fails for both the resolved path and the 404 page it
        // gets rewritten to, landing in the inline-error branch.
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Buffer::new();
        let mut resp = Response::init(dir.path(), "/missing.html", true, -1);
        resp.make_response(&mut buf);
        assert!(!resp.keep_alive);
        let header_str = String::from_utf8_lossy(buf.peek());
        assert!(header_str.contains("Connection: close\r\n"), "{header_str}");
        assert!(!header_str.contains("keep-alive"), "{header_str}");
    }
}
