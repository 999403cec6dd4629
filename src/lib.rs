//! Shared infrastructure for packaging scripts into self-extracting executables.
//!
//! This crate turns a script plus its declared runtime dependencies into a single
//! "archive-executable": a file that is simultaneously a runnable `/bin/sh` script
//! and a valid zip container. Copy the file to a POSIX machine with `unzip`
//! installed and run it; nothing else needs to travel with it.
//!
//! # Architecture
//!
//! ```text
//! manifest (TOML)
//!     |
//!     v
//! closure ──── destination mapping (runfiles), entry-point selection
//!     |
//!     v
//! staging ──── ephemeral tree of symlinks, one per dependency file
//!     |
//!     v
//! container ── deterministic zip (sorted entries, fixed timestamps)
//!     |
//!     v
//! linker ───── bootstrap header + container, offsets repaired, atomic publish
//! ```
//!
//! At run time the bootstrap header (see [`bootstrap`]) extracts the trailing
//! container into a private temporary directory, runs the bundled entry stub
//! with the original arguments, and removes the directory on every exit path.
//!
//! # Example
//!
//! ```rust,ignore
//! use scriptpack::build::build_archive;
//! use std::path::Path;
//!
//! let outputs = build_archive(Path::new("hello.pack.toml"), Path::new("out"))?;
//! println!("archive-executable at {}", outputs.archive.display());
//! ```

pub mod bootstrap;
pub mod build;
pub mod closure;
pub mod container;
pub mod linker;
pub mod manifest;
pub mod preflight;
pub mod runfiles;
pub mod staging;

pub use bootstrap::BOOTSTRAP_FAILURE_CODE;
pub use build::{build_archive, BuildOutputs};
pub use closure::{DependencyClosure, DependencyFile, FileKind};
pub use manifest::Manifest;
pub use staging::StagingStrategy;
