//! Archive build orchestration.
//!
//! Drives one archive build end to end: manifest -> closure -> generated
//! shell artifacts -> staging/compression -> linked archive-executable, plus
//! a small JSON build record for downstream tooling. Configuration errors
//! (bad manifest, entry-point ambiguity, destination collisions) abort before
//! any output file is written.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bootstrap;
use crate::linker;
use crate::manifest::Manifest;
use crate::runfiles;
use crate::staging::StagingTree;

/// Paths of the files one archive build produces.
#[derive(Debug)]
pub struct BuildOutputs {
    /// Entrypoint stub; runnable in place next to an unpacked runfiles tree.
    pub stub: PathBuf,
    /// Bootstrap header, kept for inspection and relinking.
    pub header: PathBuf,
    /// Standalone compressed container.
    pub container: PathBuf,
    /// The combined archive-executable.
    pub archive: PathBuf,
    /// JSON build record.
    pub record: PathBuf,
}

/// Build record written next to the archive. The record is a sidecar: it
/// carries wall-clock time and therefore does not participate in archive
/// reproducibility.
#[derive(Debug, Serialize)]
struct BuildRecord<'a> {
    name: &'a str,
    workspace: &'a str,
    archive: String,
    sha256: String,
    size_bytes: u64,
    entries: usize,
    created_at_unix: u64,
}

/// Build the archive described by the manifest at `manifest_path`, placing
/// all outputs under `out_dir`.
pub fn build_archive(manifest_path: &Path, out_dir: &Path) -> Result<BuildOutputs> {
    let manifest = Manifest::load(manifest_path)?;
    build_from_manifest(&manifest, out_dir)
}

/// Build from an already-loaded manifest.
pub fn build_from_manifest(manifest: &Manifest, out_dir: &Path) -> Result<BuildOutputs> {
    // Validate everything before touching the output directory.
    let closure = manifest.resolve_closure()?;
    let name = closure.name();

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory '{}'", out_dir.display()))?;

    let outputs = BuildOutputs {
        stub: out_dir.join(name),
        header: out_dir.join(format!("{name}.header.sh")),
        container: out_dir.join(format!("{name}.zip")),
        archive: out_dir.join(format!("{name}.run")),
        record: out_dir.join(format!("{name}.build.json")),
    };

    let entry_rel = runfiles::unix_path_string(&closure.entry().rel)?;
    let stub_text = bootstrap::render_entry_stub(closure.workspace(), &entry_rel)?;
    write_executable(&outputs.stub, &stub_text)?;

    let header_text = bootstrap::render_bootstrap_header(name)?;
    fs::write(&outputs.header, &header_text)
        .with_context(|| format!("writing bootstrap header '{}'", outputs.header.display()))?;

    // The staging tree is removed when `tree` drops, even if compression or
    // linking fails below.
    let tree = StagingTree::assemble(&closure, &outputs.stub, manifest.strategy)?;
    let entries = tree.compress_to(&outputs.container)?;
    drop(tree);

    linker::link_archive(&outputs.header, &outputs.container, &outputs.archive)?;

    write_record(&outputs, &closure, entries)?;
    Ok(outputs)
}

fn write_record(
    outputs: &BuildOutputs,
    closure: &crate::closure::DependencyClosure,
    entries: usize,
) -> Result<()> {
    let (sha256, size_bytes) = sha256_file(&outputs.archive)?;
    let record = BuildRecord {
        name: closure.name(),
        workspace: closure.workspace(),
        archive: outputs
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256,
        size_bytes,
        entries,
        created_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    };
    let json = serde_json::to_vec_pretty(&record).context("encoding build record")?;
    fs::write(&outputs.record, json)
        .with_context(|| format!("writing build record '{}'", outputs.record.display()))
}

fn write_executable(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .with_context(|| format!("writing entry stub '{}'", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("marking '{}' executable", path.display()))?;
    }
    Ok(())
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
