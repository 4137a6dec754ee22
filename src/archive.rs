//! Append-only compressed archive of raw incoming messages.
//!
//! Independent of the fax pipeline proper: a failure here is a warning for
//! the caller, never a run failure. Each appended message becomes its own
//! gzip member, so the archive stays readable after partial writes.

use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{RelayError, Result};

/// Append one raw message (plus a separating newline) to the archive.
pub fn append_message(archive: &Path, raw: &str) -> Result<()> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RelayError::ArchiveError(format!("creating {}: {e}", parent.display())))?;
    }

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive)
        .map_err(|e| RelayError::ArchiveError(format!("opening {}: {e}", archive.display())))?;

    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(raw.as_bytes())
        .and_then(|_| encoder.write_all(b"\n"))
        .map_err(|e| RelayError::ArchiveError(format!("writing archive: {e}")))?;
    encoder
        .finish()
        .map_err(|e| RelayError::ArchiveError(format!("finishing archive member: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_append_creates_and_appends_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("logs").join("mails.gz");

        append_message(&archive, "first message").unwrap();
        append_message(&archive, "second message").unwrap();

        let file = fs::File::open(&archive).unwrap();
        let mut decoder = flate2::read::MultiGzDecoder::new(file);
        let mut contents = String::new();
        decoder.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first message\nsecond message\n");
    }

    #[test]
    fn test_append_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the archive file should be.
        let archive = dir.path().join("mails.gz");
        fs::create_dir(&archive).unwrap();
        let result = append_message(&archive, "message");
        assert!(matches!(result, Err(RelayError::ArchiveError(_))));
    }
}
