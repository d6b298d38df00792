//! Upload validation rules.
//!
//! Checked by the upload coordinator before any job-store mutation, so
//! a rejected file never leaves a half-created job behind.

use crate::error::CoreError;

/// Hard ceiling on a single uploaded file, independent of the
/// configurable per-deployment limit.
pub const ABSOLUTE_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Maximum length of an uploaded filename.
const MAX_FILENAME_LEN: usize = 255;

/// Validate one uploaded file against the given size limit.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `max_bytes` (clamped to the absolute ceiling).
/// - Must be valid UTF-8 text; binary artifacts are rejected here
///   rather than failing deep inside the pipeline.
/// - Filename must be non-empty and of sane length.
pub fn validate_upload_file(
    filename: &str,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(), CoreError> {
    if filename.is_empty() {
        return Err(CoreError::Validation(
            "filename must not be empty".to_string(),
        ));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(CoreError::Validation(format!(
            "filename must not exceed {MAX_FILENAME_LEN} characters"
        )));
    }
    if bytes.is_empty() {
        return Err(CoreError::Validation(format!("file {filename:?} is empty")));
    }

    let limit = max_bytes.min(ABSOLUTE_MAX_UPLOAD_BYTES);
    if bytes.len() > limit {
        return Err(CoreError::Validation(format!(
            "file {filename:?} exceeds the {limit} byte upload limit"
        )));
    }

    if std::str::from_utf8(bytes).is_err() {
        return Err(CoreError::Validation(format!(
            "file {filename:?} is not UTF-8 text"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes() {
        assert!(validate_upload_file("boot.log", b"ERROR boom", 1024).is_ok());
    }

    #[test]
    fn empty_file_rejected() {
        assert!(validate_upload_file("boot.log", b"", 1024).is_err());
    }

    #[test]
    fn empty_filename_rejected() {
        assert!(validate_upload_file("", b"data", 1024).is_err());
    }

    #[test]
    fn oversized_file_rejected() {
        let bytes = vec![b'x'; 2048];
        assert!(validate_upload_file("big.log", &bytes, 1024).is_err());
    }

    #[test]
    fn limit_is_clamped_to_absolute_ceiling() {
        // A limit above the ceiling does not disable the ceiling.
        let bytes = b"fine";
        assert!(validate_upload_file("a.log", bytes, usize::MAX).is_ok());
    }

    #[test]
    fn binary_content_rejected() {
        assert!(validate_upload_file("blob.bin", &[0xff, 0xfe, 0x00, 0x80], 1024).is_err());
    }

    #[test]
    fn overlong_filename_rejected() {
        let name = "a".repeat(MAX_FILENAME_LEN + 1);
        assert!(validate_upload_file(&name, b"data", 1024).is_err());
    }
}
