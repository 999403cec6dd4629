use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use scriptpack::{build_archive, container, preflight};

fn usage() -> &'static str {
    "Usage:\n  scriptpack build <manifest.toml> [out_dir]\n  scriptpack inspect <archive>\n  scriptpack extract <archive> <dest_dir>\n  scriptpack run <archive> [args...]"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, manifest] if cmd == "build" => build(Path::new(manifest), Path::new(".")),
        [cmd, manifest, out_dir] if cmd == "build" => {
            build(Path::new(manifest), Path::new(out_dir))
        }
        [cmd, archive] if cmd == "inspect" => inspect(Path::new(archive)),
        [cmd, archive, dest] if cmd == "extract" => extract(Path::new(archive), Path::new(dest)),
        [cmd, archive, rest @ ..] if cmd == "run" => run(Path::new(archive), rest),
        _ => bail!(usage()),
    }
}

fn build(manifest: &Path, out_dir: &Path) -> Result<()> {
    let outputs = build_archive(manifest, out_dir)
        .with_context(|| format!("building archive from '{}'", manifest.display()))?;
    println!("[scriptpack] archive-executable at {}", outputs.archive.display());
    println!("[scriptpack] entry stub at {}", outputs.stub.display());
    Ok(())
}

fn inspect(archive: &Path) -> Result<()> {
    let names = container::list(archive)
        .with_context(|| format!("inspecting '{}'", archive.display()))?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn extract(archive: &Path, dest: &Path) -> Result<()> {
    container::extract(archive, dest).with_context(|| {
        format!(
            "extracting '{}' into '{}'",
            archive.display(),
            dest.display()
        )
    })?;
    println!("[scriptpack] extracted {} to {}", archive.display(), dest.display());
    Ok(())
}

fn run(archive: &Path, script_args: &[String]) -> Result<()> {
    preflight::check_runtime_tools()?;
    if !archive.is_file() {
        bail!("archive-executable not found: {}", archive.display());
    }

    let status = Command::new("sh")
        .arg(archive)
        .args(script_args)
        .status()
        .with_context(|| format!("running archive '{}'", archive.display()))?;

    match status.code() {
        Some(code) => std::process::exit(code),
        None => {
            // Killed by a signal: report it the way a shell would.
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    std::process::exit(128 + signal);
                }
            }
            bail!(
                "archive '{}' terminated without an exit status",
                archive.display()
            )
        }
    }
}
