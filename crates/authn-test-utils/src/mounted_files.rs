//! Temporary stand-ins for files Kubernetes mounts into a pod.

use std::io::Write;
use tempfile::NamedTempFile;

/// A temporary file holding `contents`. Deleted on drop.
pub fn mounted_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}
