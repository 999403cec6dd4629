//! Destination-path layout for bundled files.
//!
//! Every dependency file ends up under a "runfiles" tree next to the entry
//! stub, so a file's build-relative path is reachable at a stable location
//! once the archive is unpacked:
//!
//! ```text
//! <archive-name>.runfiles/<workspace>/<build-relative-path>
//! ```
//!
//! The mapping is deterministic and injective: two distinct build-relative
//! paths can never collapse onto the same destination, because the prefix is
//! constant per archive.

use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// Suffix of the runfiles directory placed next to the entry stub.
pub const RUNFILES_SUFFIX: &str = ".runfiles";

/// Name of the runfiles directory for an archive, e.g. `hello.runfiles`.
pub fn runfiles_root(archive_name: &str) -> String {
    format!("{archive_name}{RUNFILES_SUFFIX}")
}

/// Destination path of a dependency file inside the assembled tree.
///
/// `rel` is the file's build-relative path as declared in the manifest.
/// Callers are expected to have validated the inputs via [`validate_name`]
/// and [`validate_rel_path`]; this function only assembles the layout.
pub fn dest_path(archive_name: &str, workspace: &str, rel: &Path) -> PathBuf {
    PathBuf::from(runfiles_root(archive_name))
        .join(workspace)
        .join(rel)
}

/// Validate an archive or workspace name: a single safe path segment.
pub fn validate_name(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{kind} must not be empty");
    }
    if value.contains('/') || value.contains('\\') {
        bail!("{kind} must not contain path separators: '{value}'");
    }
    if value == "." || value == ".." {
        bail!("{kind} must not be '.' or '..'");
    }
    Ok(())
}

/// Validate a build-relative path: relative, normal components only.
pub fn validate_rel_path(rel: &Path) -> Result<()> {
    if rel.as_os_str().is_empty() {
        bail!("build-relative path must not be empty");
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {
                bail!("build-relative path '{}' must not contain '.'", rel.display())
            }
            Component::ParentDir => {
                bail!(
                    "build-relative path '{}' must not contain '..'",
                    rel.display()
                )
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("build-relative path '{}' must be relative", rel.display())
            }
        }
    }
    Ok(())
}

/// Render a path with forward slashes for use as a container entry name or
/// inside generated shell text. Fails on non-UTF-8 components.
pub fn unix_path_string(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        let Some(part) = component.as_os_str().to_str() else {
            bail!("path '{}' is not valid UTF-8", path.display());
        };
        parts.push(part);
    }
    Ok(parts.join("/"))
}
