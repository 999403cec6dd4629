//! Final assembly of the archive-executable.
//!
//! Concatenates the bootstrap header with the compressed container, repairs
//! the container's central-directory offsets to account for the prepended
//! bytes, marks the result executable, and publishes it atomically: the
//! combined file is staged under a temporary name in the output directory and
//! renamed into place only once it is complete, so a failed link never leaves
//! a half-written file at the declared path.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::container::offsets::repair_container_offsets;

/// Combine `header` and `container` into the archive-executable at `output`.
///
/// The result is valid shell (the header) and, after offset repair, a valid
/// zip container that standard tooling can list and extract.
pub fn link_archive(header: &Path, container: &Path, output: &Path) -> Result<()> {
    let header_bytes = fs::read(header)
        .with_context(|| format!("reading bootstrap header '{}'", header.display()))?;
    let container_bytes = fs::read(container)
        .with_context(|| format!("reading container '{}'", container.display()))?;

    let mut combined = header_bytes;
    let header_len = combined.len() as u64;
    combined.extend_from_slice(&container_bytes);

    repair_container_offsets(&mut combined, header_len).with_context(|| {
        format!(
            "repairing container offsets of '{}' for a {} byte header",
            container.display(),
            header_len
        )
    })?;

    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    let tmp = parent.join(tmp_name(output));

    let publish = (|| -> Result<()> {
        fs::write(&tmp, &combined)
            .with_context(|| format!("writing staged archive '{}'", tmp.display()))?;
        set_executable(&tmp)?;
        fs::rename(&tmp, output).with_context(|| {
            format!(
                "publishing archive '{}' -> '{}'",
                tmp.display(),
                output.display()
            )
        })
    })();

    if publish.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    publish
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("marking '{}' executable", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn tmp_name(output: &Path) -> String {
    let stem = output
        .file_name()
        .and_then(|part| part.to_str())
        .unwrap_or("archive");
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!(".{stem}.{n}.tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn build_parts(tmp: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let staging = tmp.join("staging");
        fs::create_dir_all(staging.join("pkg.runfiles/ws")).unwrap();
        fs::write(staging.join("pkg.runfiles/ws/a.sh"), "#!/bin/sh\necho a\n").unwrap();
        let container_path = tmp.join("pkg.zip");
        container::compress_tree(&staging, &container_path).unwrap();

        let header_path = tmp.join("pkg.header.sh");
        fs::write(&header_path, "#!/bin/sh\n# launcher\nexit 113\n").unwrap();
        (header_path, container_path)
    }

    #[test]
    fn linked_archive_is_shell_and_container_at_once() {
        let tmp = TempDir::new().unwrap();
        let (header, container_path) = build_parts(tmp.path());
        let output = tmp.path().join("pkg.run");

        link_archive(&header, &container_path, &output).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"#!/bin/sh\n"), "header must lead the file");

        let names = container::list(&output).unwrap();
        assert_eq!(names, vec!["pkg.runfiles/ws/a.sh".to_string()]);
    }

    #[test]
    fn linked_archive_is_executable() {
        let tmp = TempDir::new().unwrap();
        let (header, container_path) = build_parts(tmp.path());
        let output = tmp.path().join("pkg.run");

        link_archive(&header, &container_path, &output).unwrap();
        let mode = fs::metadata(&output).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn failed_repair_leaves_no_output_behind() {
        let tmp = TempDir::new().unwrap();
        let header = tmp.path().join("pkg.header.sh");
        fs::write(&header, "#!/bin/sh\n").unwrap();
        let bogus = tmp.path().join("pkg.zip");
        fs::write(&bogus, "definitely not a container").unwrap();
        let output = tmp.path().join("pkg.run");

        assert!(link_archive(&header, &bogus, &output).is_err());
        assert!(!output.exists());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
