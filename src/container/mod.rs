//! Zip container codec wrapper.
//!
//! The container format is zip throughout: it supports per-entry timestamp
//! overrides (reproducible builds), unix permission bits, extraction by
//! scanning for the end-of-central-directory record from the file end (which
//! is what lets `unzip` open a file with a shell preamble), and an offset
//! repair that keeps the central directory valid after bytes are prepended
//! (see [`offsets`]).
//!
//! Compression is deterministic: entries are written in sorted order with a
//! constant timestamp, so identical input trees produce identical containers
//! regardless of build wall-clock time.

pub mod offsets;

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Constant timestamp stamped on every container entry.
///
/// The zip epoch (1980-01-01 00:00:00) plays the role msdos timestamps allow;
/// wall-clock build time never reaches the output bytes.
fn fixed_entry_time() -> zip::DateTime {
    zip::DateTime::default()
}

/// Compress the contents of `root` into a zip container at `output`.
///
/// Symbolic links are dereferenced: the staging tree is a tree of links into
/// the build workspace, and the container must carry the real bytes so the
/// bundle is self-contained on a different machine. Returns the number of
/// file entries written.
pub fn compress_tree(root: &Path, output: &Path) -> Result<usize> {
    // Collect file paths deterministically, sorted by their entry name.
    let mut entries: Vec<(String, std::path::PathBuf)> = Vec::new();
    for ent in WalkDir::new(root).follow_links(true) {
        let ent = ent.with_context(|| format!("walking staging tree '{}'", root.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = ent
            .path()
            .strip_prefix(root)
            .unwrap_or(ent.path())
            .to_path_buf();
        let name = crate::runfiles::unix_path_string(&rel)?;
        entries.push((name, ent.path().to_path_buf()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if entries.is_empty() {
        bail!("staging tree '{}' contains no files", root.display());
    }

    let out = File::create(output)
        .with_context(|| format!("creating container '{}'", output.display()))?;
    let mut writer = ZipWriter::new(out);

    for (name, path) in &entries {
        let md = fs::metadata(path)
            .with_context(|| format!("reading metadata of '{}'", path.display()))?;
        if md.len() >= u64::from(u32::MAX) {
            bail!(
                "'{}' is too large for a 32-bit container entry; zip64 archives are \
                 not supported",
                path.display()
            );
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(fixed_entry_time())
            .unix_permissions(entry_mode(&md));

        writer
            .start_file(name.as_str(), options)
            .with_context(|| format!("starting container entry '{name}'"))?;
        let mut f = File::open(path)
            .with_context(|| format!("opening source file '{}'", path.display()))?;
        io::copy(&mut f, &mut writer)
            .with_context(|| format!("compressing '{}' into '{}'", path.display(), output.display()))?;
    }

    writer
        .finish()
        .with_context(|| format!("finalizing container '{}'", output.display()))?;
    Ok(entries.len())
}

#[cfg(unix)]
fn entry_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn entry_mode(_md: &fs::Metadata) -> u32 {
    0o644
}

/// Extract a container (or an archive-executable with a trailing container)
/// into `dest`, restoring unix permissions.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("opening container '{}'", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("reading container '{}'", archive.display()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("reading entry {i} of '{}'", archive.display()))?;
        // Entries with traversal components are skipped rather than extracted.
        let Some(rel) = entry.enclosed_name() else {
            continue;
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating directory '{}'", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("creating '{}'", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting '{}'", target.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                .with_context(|| format!("setting permissions on '{}'", target.display()))?;
        }
    }

    Ok(())
}

/// List the entry names of a container (or archive-executable).
pub fn list(archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)
        .with_context(|| format!("opening container '{}'", archive.display()))?;
    let zip = ZipArchive::new(file)
        .with_context(|| format!("reading container '{}'", archive.display()))?;
    Ok(zip.file_names().map(|n| n.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("pkg.runfiles/ws/tools")).unwrap();
        fs::write(root.join("pkg.runfiles/ws/tools/a.sh"), "#!/bin/sh\necho a\n").unwrap();
        fs::write(root.join("pkg.runfiles/ws/data.txt"), "payload").unwrap();
        fs::set_permissions(
            root.join("pkg.runfiles/ws/tools/a.sh"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();
    }

    #[test]
    fn compress_then_extract_roundtrips_the_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("staging");
        populate(&root);

        let container = tmp.path().join("pkg.zip");
        let count = compress_tree(&root, &container).unwrap();
        assert_eq!(count, 2);

        let dest = tmp.path().join("out");
        extract(&container, &dest).unwrap();

        let script = dest.join("pkg.runfiles/ws/tools/a.sh");
        assert_eq!(fs::read(&script).unwrap(), b"#!/bin/sh\necho a\n");
        assert_eq!(
            fs::read(dest.join("pkg.runfiles/ws/data.txt")).unwrap(),
            b"payload"
        );
        let mode = fs::metadata(&script).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn compression_dereferences_symlinks() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real.txt");
        fs::write(&real, "real bytes").unwrap();

        let root = tmp.path().join("staging");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&real, root.join("linked.txt")).unwrap();

        let container = tmp.path().join("c.zip");
        compress_tree(&root, &container).unwrap();

        let dest = tmp.path().join("out");
        extract(&container, &dest).unwrap();
        let extracted = dest.join("linked.txt");
        assert!(!extracted.is_symlink());
        assert_eq!(fs::read(&extracted).unwrap(), b"real bytes");
    }

    #[test]
    fn compression_is_byte_reproducible() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("staging");
        populate(&root);

        let first = tmp.path().join("first.zip");
        let second = tmp.path().join("second.zip");
        compress_tree(&root, &first).unwrap();
        // Touch the tree between builds; mtimes must not leak into the bytes.
        fs::write(root.join("pkg.runfiles/ws/data.txt"), "payload").unwrap();
        compress_tree(&root, &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn list_reports_sorted_entry_names() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("staging");
        populate(&root);

        let container = tmp.path().join("c.zip");
        compress_tree(&root, &container).unwrap();

        let names = list(&container).unwrap();
        assert_eq!(
            names,
            vec![
                "pkg.runfiles/ws/data.txt".to_string(),
                "pkg.runfiles/ws/tools/a.sh".to_string(),
            ]
        );
    }

    #[test]
    fn empty_tree_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("staging");
        fs::create_dir_all(&root).unwrap();
        let err = compress_tree(&root, &tmp.path().join("c.zip")).unwrap_err();
        assert!(err.to_string().contains("no files"), "{err}");
    }
}
