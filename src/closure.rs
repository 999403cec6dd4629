//! Dependency-closure data model.
//!
//! A closure is the flat, already-resolved set of files one archive needs at
//! runtime. Resolution of the dependency graph happens upstream; this module
//! only validates the flat list (unique destinations, well-formed paths) and
//! selects the entry point.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::runfiles;

/// Script suffix used when inferring the entry point from the archive name.
pub const SCRIPT_SUFFIX: &str = ".sh";

/// Origin of a file in the closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The script executed at startup.
    Entry,
    /// Explicitly declared source dependency.
    Source,
    /// Opaque data file.
    Data,
    /// Pulled in transitively from a dependency target.
    Transitive,
}

/// One input artifact of an archive build.
#[derive(Debug, Clone)]
pub struct DependencyFile {
    /// Where the real bytes live on the build machine.
    pub source: PathBuf,
    /// Build-relative path; becomes the path under the runfiles root.
    pub rel: PathBuf,
    pub kind: FileKind,
}

/// Validated, immutable set of files for one archive build.
#[derive(Debug)]
pub struct DependencyClosure {
    name: String,
    workspace: String,
    files: Vec<DependencyFile>,
    entry_index: usize,
}

impl DependencyClosure {
    /// Validate the flat file list and select the entry point.
    ///
    /// Destination collisions and entry-point ambiguity are fatal
    /// configuration errors; nothing downstream runs after either.
    ///
    /// Entry selection: `entry` (a build-relative path) wins when given and
    /// must name a file in the closure. Otherwise the closure is searched for
    /// exactly one file named `<name>.sh`.
    pub fn resolve(
        name: &str,
        workspace: &str,
        entry: Option<&Path>,
        mut files: Vec<DependencyFile>,
    ) -> Result<Self> {
        runfiles::validate_name("archive name", name)?;
        runfiles::validate_name("workspace identity", workspace)?;
        if files.is_empty() {
            bail!("archive '{name}' has an empty dependency closure");
        }

        let mut seen: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        for file in &files {
            runfiles::validate_rel_path(&file.rel)
                .with_context(|| format!("invalid path for '{}'", file.source.display()))?;
            let dest = runfiles::dest_path(name, workspace, &file.rel);
            if let Some(previous) = seen.insert(dest.clone(), file.source.clone()) {
                bail!(
                    "destination collision in archive '{}': '{}' and '{}' both map to '{}'",
                    name,
                    previous.display(),
                    file.source.display(),
                    dest.display()
                );
            }
        }

        let entry_index = select_entry(name, entry, &files)?;
        files[entry_index].kind = FileKind::Entry;

        Ok(Self {
            name: name.to_string(),
            workspace: workspace.to_string(),
            files,
            entry_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn files(&self) -> &[DependencyFile] {
        &self.files
    }

    /// The distinguished file executed at startup.
    pub fn entry(&self) -> &DependencyFile {
        &self.files[self.entry_index]
    }

    /// Destination of a closure file inside the assembled tree.
    pub fn dest(&self, file: &DependencyFile) -> PathBuf {
        runfiles::dest_path(&self.name, &self.workspace, &file.rel)
    }
}

fn select_entry(name: &str, entry: Option<&Path>, files: &[DependencyFile]) -> Result<usize> {
    if let Some(entry_rel) = entry {
        return files
            .iter()
            .position(|f| f.rel == entry_rel)
            .with_context(|| {
                format!(
                    "entry point '{}' is not part of the closure of archive '{}'; \
                     declare it in srcs",
                    entry_rel.display(),
                    name
                )
            });
    }

    let wanted = format!("{name}{SCRIPT_SUFFIX}");
    let matches: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.rel.file_name().map(|n| n == wanted.as_str()) == Some(true))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [index] => Ok(*index),
        [] => bail!(
            "cannot determine entry point for archive '{name}': no explicit entry \
             was declared and no file named '{wanted}' exists in the closure"
        ),
        _ => bail!(
            "cannot determine entry point for archive '{name}': multiple files \
             named '{wanted}' exist in the closure; declare the entry explicitly"
        ),
    }
}
