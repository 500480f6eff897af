//! Crash-safe document writes
//!
//! Documents are written to a `.temp` sibling, synced, then renamed into
//! place, so a final name on disk always holds a complete document. A crash
//! leaves at most a stale `.temp` file, which [`sweep_stale_temps`] removes
//! at the next start.

use crate::output::layout::{temp_path, DocumentPath, TEMP_SUFFIX};
use crate::MirrorError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

/// How a write attempt concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was written to this path
    Stored(PathBuf),

    /// A document was already at this path; nothing was written
    AlreadyPresent(PathBuf),
}

/// A previously stored document found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingDocument {
    pub path: PathBuf,

    /// True when the document can be rescanned for links
    pub is_html: bool,
}

/// Looks for a document already stored for `doc`
///
/// Derived names are checked before the exact name, so a root URL whose
/// marker exists still resolves to the real document when it is there.
pub fn existing_document(doc: &DocumentPath) -> Option<ExistingDocument> {
    doc.candidates()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|path| {
            let is_html = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| {
                    ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
                });
            ExistingDocument { path, is_html }
        })
}

/// Stores `body` as the document for `doc`
///
/// The body goes to `<final name>.temp` first, created exclusively, then is
/// synced and moved into place without replacing an existing document. A
/// failed write leaves nothing behind: the temp file is removed when its
/// handle drops.
///
/// # Errors
///
/// * `MirrorError::TempCollision` - another writer holds the temp file
/// * `MirrorError::Filesystem` - any other IO failure
pub fn materialize(
    doc: &DocumentPath,
    extension: &str,
    body: &[u8],
) -> Result<WriteOutcome, MirrorError> {
    fs::create_dir_all(doc.dir()).map_err(|e| MirrorError::filesystem(doc.dir(), e))?;

    let final_path = doc.final_path(extension);
    if final_path.is_file() {
        return Ok(WriteOutcome::AlreadyPresent(final_path));
    }

    let temp = write_temp(doc.dir(), &final_path, body)?;

    match temp.persist_noclobber(&final_path) {
        Ok(_) => {}
        // Another URL produced the same name while we were writing
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            return Ok(WriteOutcome::AlreadyPresent(final_path));
        }
        Err(e) => return Err(MirrorError::filesystem(&final_path, e.error)),
    }

    if let Some(marker) = doc.marker_path() {
        write_marker(&marker, &final_path);
    }

    Ok(WriteOutcome::Stored(final_path))
}

fn write_temp(dir: &Path, final_path: &Path, body: &[u8]) -> Result<NamedTempFile, MirrorError> {
    let name = final_path.file_name().unwrap_or_default();
    let temp = temp_path(final_path);

    let mut file = match Builder::new()
        .prefix(name)
        .suffix(TEMP_SUFFIX)
        .rand_bytes(0)
        .tempfile_in(dir)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(MirrorError::TempCollision { path: temp })
        }
        Err(e) => return Err(MirrorError::filesystem(temp, e)),
    };

    // Temp files start out private to the owner
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| MirrorError::filesystem(&temp, e))?;
    }

    file.write_all(body)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| MirrorError::filesystem(&temp, e))?;

    Ok(file)
}

/// A missing marker only costs a refetch, so failures are logged
fn write_marker(marker: &Path, document: &Path) {
    let name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content = format!(
        "document stored as {}\n(marker file, do not delete)\n",
        name
    );

    if let Err(e) = fs::write(marker, content) {
        tracing::warn!(path = %marker.display(), error = %e, "failed to write marker file");
    }
}

/// Removes `.temp` files left under `root` by an interrupted run
///
/// Must run before any worker starts. Returns the number of files removed.
pub fn sweep_stale_temps(root: &Path) -> Result<usize, MirrorError> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| MirrorError::filesystem(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| MirrorError::filesystem(&dir, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| MirrorError::filesystem(&path, e))?;

            if file_type.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(TEMP_SUFFIX))
            {
                fs::remove_file(&path).map_err(|e| MirrorError::filesystem(&path, e))?;
                tracing::debug!(path = %path.display(), "removed stale temp file");
                removed += 1;
            }
        }
    }

    Ok(removed)
}
