//! Content type detection by magic bytes.
use std::{fs::File, io::Read, path::Path};

pub const APPLICATION_ZIP: &str = "application/zip";
const OCTET_STREAM: &str = "application/octet-stream";

/// Content types accepted for submissions unless configured otherwise.
pub const DEFAULT_ACCEPTED: &[&str] = &[
    APPLICATION_ZIP,
    "application/x-zip-compressed",
    "application/zip-compressed",
];

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"PK\x03\x04", APPLICATION_ZIP),
    // empty archive
    (b"PK\x05\x06", APPLICATION_ZIP),
    // spanned archive
    (b"PK\x07\x08", APPLICATION_ZIP),
    (b"\x1f\x8b", "application/gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xfd7zXZ\x00", "application/x-xz"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"Rar!\x1a\x07", "application/vnd.rar"),
    (b"%PDF-", "application/pdf"),
    (b"\x7fELF", "application/x-executable"),
];

/// Content type of `data` judging by its leading bytes.
pub fn sniff(data: &[u8]) -> &'static str {
    for (magic, content_type) in SIGNATURES {
        if data.starts_with(magic) {
            return content_type;
        }
    }
    if data.len() > 262 && &data[257..262] == b"ustar" {
        return "application/x-tar";
    }
    if !data.is_empty() && std::str::from_utf8(data).is_ok() {
        return "text/plain";
    }
    OCTET_STREAM
}

/// Content type of the file at `path`.
pub fn sniff_file(path: &Path) -> std::io::Result<&'static str> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;
    Ok(sniff(&head))
}
