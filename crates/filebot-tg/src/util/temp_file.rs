use crate::prelude::*;
use std::path::Path;
use tempfile::TempPath;

/// Reserves a unique path for a scratch file in `dir` without creating it.
/// The file, once created, is removed when the returned [`TempPath`] is
/// dropped, but prefer [`remove`] to observe the deletion errors.
pub(crate) fn unique_path(dir: &Path, prefix: &str) -> TempPath {
    let path = dir.join(format!("{prefix}_{}.tmp", nanoid::nanoid!()));
    TempPath::from_path(path)
}

/// Deletes the file if it exists. The errors are only logged.
pub(crate) fn remove(path: TempPath) {
    let path_str = path.display().to_string();

    match path.close() {
        Ok(()) => debug!(path = path_str, "Removed temporary file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => error!(
            path = path_str,
            err = tracing_err(&err),
            "Failed to remove temporary file"
        ),
    }
}
