//! Staging-tree assembly.
//!
//! The staging tree is an ephemeral on-disk mirror of the final runtime
//! layout, used as compression input and removed unconditionally afterwards:
//!
//! ```text
//! <tmp>/scriptpack-<name>-XXXX/
//!     <name>            -> link (or copy) of the emitted entry stub
//!     <name>.runfiles/
//!         <workspace>/
//!             <rel>     -> link (or copy) of the real source file
//! ```
//!
//! Files are placed as symlinks by default so large data files are never
//! duplicated during a build; the codec dereferences them when compressing.
//! Copy placement exists for platforms or codecs that cannot follow a tree
//! of links.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::closure::DependencyClosure;
use crate::container;

/// How dependency files are materialized into the staging tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingStrategy {
    #[default]
    Symlink,
    Copy,
}

/// Ephemeral materialization of a dependency closure.
///
/// The backing temporary directory is uniquely named, so concurrent builds of
/// different archives never collide, and it is removed when the value drops,
/// on success and failure paths alike.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
}

impl StagingTree {
    /// Materialize `closure` next to a symlink to the entry stub at
    /// `stub_path` (which must already exist as a build output).
    pub fn assemble(
        closure: &DependencyClosure,
        stub_path: &Path,
        strategy: StagingStrategy,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("scriptpack-{}-", closure.name()))
            .tempdir()
            .context("allocating staging directory")?;

        let stub_abs = fs::canonicalize(stub_path)
            .with_context(|| format!("resolving entry stub '{}'", stub_path.display()))?;
        place(strategy, &stub_abs, &dir.path().join(closure.name()))?;

        for file in closure.files() {
            let source = fs::canonicalize(&file.source).with_context(|| {
                format!("resolving closure source file '{}'", file.source.display())
            })?;
            let dest = dir.path().join(closure.dest(file));
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("creating staging directory '{}'", parent.display())
                })?;
            }
            place(strategy, &source, &dest)?;
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Compress the staging tree into a container at `output`.
    ///
    /// Returns the number of container entries. The tree stays alive until
    /// the `StagingTree` drops, whatever this returns.
    pub fn compress_to(&self, output: &Path) -> Result<usize> {
        container::compress_tree(self.path(), output).with_context(|| {
            format!(
                "compressing staging tree '{}' into '{}'",
                self.path().display(),
                output.display()
            )
        })
    }
}

fn place(strategy: StagingStrategy, source: &Path, dest: &Path) -> Result<()> {
    match strategy {
        StagingStrategy::Symlink => {
            #[cfg(unix)]
            std::os::unix::fs::symlink(source, dest).with_context(|| {
                format!(
                    "linking '{}' into staging as '{}'",
                    source.display(),
                    dest.display()
                )
            })?;
            #[cfg(not(unix))]
            anyhow::bail!("symlink staging is only supported on unix; use the copy strategy");
        }
        StagingStrategy::Copy => {
            fs::copy(source, dest).with_context(|| {
                format!(
                    "copying '{}' into staging as '{}'",
                    source.display(),
                    dest.display()
                )
            })?;
        }
    }
    Ok(())
}
