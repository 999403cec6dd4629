//! Bundle manifest loading.
//!
//! A build is described by a small TOML file; the host build system (or a
//! human) writes one per archive with the already-resolved flat file list:
//!
//! ```toml
//! name = "hello"
//! workspace = "ws"
//! entry = "tools/hello.sh"        # optional; inferred from `name` otherwise
//! srcs = ["tools/hello.sh", "tools/lib.sh"]
//! data = ["assets/motd.txt"]
//! deps = ["vendor/json.sh"]       # files pulled in from dependency targets
//! strategy = "symlink"            # or "copy"
//! ```
//!
//! All paths are build-relative and resolve against the manifest's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::closure::{DependencyClosure, DependencyFile, FileKind};
use crate::staging::StagingStrategy;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Archive name; also the stub filename and the runfiles-root prefix.
    pub name: String,
    /// Workspace identity: the directory under the runfiles root.
    pub workspace: String,
    /// Explicit entry point, build-relative. Optional.
    #[serde(default)]
    pub entry: Option<PathBuf>,
    /// Explicitly declared script dependencies.
    #[serde(default)]
    pub srcs: Vec<PathBuf>,
    /// Opaque data files.
    #[serde(default)]
    pub data: Vec<PathBuf>,
    /// Transitive files contributed by dependency targets.
    #[serde(default)]
    pub deps: Vec<PathBuf>,
    /// Staging placement strategy.
    #[serde(default)]
    pub strategy: StagingStrategy,

    /// Directory the relative paths resolve against (the manifest's own).
    #[serde(skip)]
    root: PathBuf,
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        let mut manifest: Manifest = toml::from_str(&text)
            .with_context(|| format!("parsing manifest '{}'", path.display()))?;
        manifest.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Ok(manifest)
    }

    /// Build and validate the dependency closure this manifest declares.
    pub fn resolve_closure(&self) -> Result<DependencyClosure> {
        let mut files = Vec::new();
        for (list, kind) in [
            (&self.srcs, FileKind::Source),
            (&self.data, FileKind::Data),
            (&self.deps, FileKind::Transitive),
        ] {
            for rel in list {
                files.push(DependencyFile {
                    source: self.root.join(rel),
                    rel: rel.clone(),
                    kind,
                });
            }
        }
        DependencyClosure::resolve(&self.name, &self.workspace, self.entry.as_deref(), files)
            .with_context(|| format!("resolving closure of archive '{}'", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(tmp: &Path, body: &str) -> PathBuf {
        let path = tmp.join("pack.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_a_full_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(
            tmp.path(),
            r#"
name = "hello"
workspace = "ws"
entry = "tools/hello.sh"
srcs = ["tools/hello.sh", "tools/lib.sh"]
data = ["assets/motd.txt"]
deps = ["vendor/json.sh"]
strategy = "copy"
"#,
        );

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.name, "hello");
        assert_eq!(manifest.strategy, StagingStrategy::Copy);
        let closure = manifest.resolve_closure().unwrap();
        assert_eq!(closure.files().len(), 4);
        assert_eq!(closure.entry().rel, PathBuf::from("tools/hello.sh"));
        assert_eq!(
            closure.entry().source,
            tmp.path().join("tools/hello.sh"),
            "sources resolve against the manifest directory"
        );
    }

    #[test]
    fn strategy_defaults_to_symlink() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(
            tmp.path(),
            "name = \"hello\"\nworkspace = \"ws\"\nsrcs = [\"hello.sh\"]\n",
        );
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.strategy, StagingStrategy::Symlink);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(
            tmp.path(),
            "name = \"x\"\nworkspace = \"ws\"\nsrc = [\"a.sh\"]\n",
        );
        let err = Manifest::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("pack.toml"), "{err:#}");
    }

    #[test]
    fn closure_errors_surface_through_resolution() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(
            tmp.path(),
            "name = \"hello\"\nworkspace = \"ws\"\nsrcs = [\"lib.sh\"]\n",
        );
        let manifest = Manifest::load(&path).unwrap();
        let err = manifest.resolve_closure().unwrap_err();
        assert!(format!("{err:#}").contains("entry point"), "{err:#}");
    }
}
