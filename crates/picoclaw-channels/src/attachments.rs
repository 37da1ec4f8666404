//! Shared outbound attachment validation — path/size/readability checks
//! every adapter's send path runs before handing a file to the platform
//! API.
//!
//! Grounded in `discord.rs`'s inline attachment-size check
//! (`MAX_ATTACHMENT_BYTES = 20 * 1024 * 1024`) and its
//! `download_attachment`'s filename sanitation, generalized into a
//! standalone validator so every adapter calls the same function instead
//! of repeating the checks.

use std::path::Path;

use thiserror::Error;

/// Discord's limit (25 MiB) is the largest of the supported platforms;
/// adapters with a tighter limit pass their own `max_bytes`.
pub const DEFAULT_MAX_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment path is empty")]
    EmptyPath,
    #[error("attachment not found: {0}")]
    NotFound(String),
    #[error("attachment is not a regular file: {0}")]
    NotAFile(String),
    #[error("attachment {path} is {size} bytes, exceeds the {limit}-byte platform limit")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("attachment unreadable: {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Validate a single attachment path against the platform's byte limit.
/// Any violation fails the send with a descriptive error (spec §4.2
/// point 5) rather than silently skipping the attachment.
pub fn validate(path: &str, max_bytes: u64) -> Result<(), AttachmentError> {
    if path.trim().is_empty() {
        return Err(AttachmentError::EmptyPath);
    }

    let p = Path::new(path);
    let metadata = std::fs::metadata(p).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AttachmentError::NotFound(path.to_string())
        } else {
            AttachmentError::Unreadable {
                path: path.to_string(),
                source: e,
            }
        }
    })?;

    if !metadata.is_file() {
        return Err(AttachmentError::NotAFile(path.to_string()));
    }

    if metadata.len() > max_bytes {
        return Err(AttachmentError::TooLarge {
            path: path.to_string(),
            size: metadata.len(),
            limit: max_bytes,
        });
    }

    std::fs::File::open(p).map_err(|e| AttachmentError::Unreadable {
        path: path.to_string(),
        source: e,
    })?;

    Ok(())
}

/// Strip characters a platform filesystem/API would reject, matching
/// `discord.rs`'s inline sanitizer in `download_attachment`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Pair a local attachment validation result with the caption assigned
/// to it by the fan-out algorithm (spec §4.2 point 5): when content and
/// attachments both exist, the first `k = len(attachments)` chunks are
/// captions, one per attachment, in order; remaining chunks follow as
/// plain text.
pub fn pair_captions(chunks: Vec<String>, attachment_count: usize) -> (Vec<Option<String>>, Vec<String>) {
    if attachment_count == 0 {
        return (Vec::new(), chunks);
    }

    let mut chunks = chunks.into_iter();
    let mut captions = Vec::with_capacity(attachment_count);
    for _ in 0..attachment_count {
        captions.push(chunks.next());
    }
    let remainder: Vec<String> = chunks.collect();
    (captions, remainder)
}
