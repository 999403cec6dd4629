//! Generated shell artifacts: the entry stub and the self-extracting header.
//!
//! Both artifacts are pure template renders; there is no control flow beyond
//! string substitution. The header carries the runtime bootstrap: when the
//! archive-executable is invoked, it allocates a private temporary directory,
//! arranges unconditional cleanup, unpacks the container appended after the
//! header (unzip locates it by scanning from the file end), runs the bundled
//! stub with the original arguments, and passes the exit status through.

use anyhow::{bail, Result};

/// Reserved process exit code for bootstrap failures (missing unzip, corrupt
/// container, failed temp-dir allocation). Entry scripts keep every other
/// code, so callers can tell "failed to unpack" from "script ran and failed".
/// Deliberately clear of the shell's 126/127 and 128+signal bands.
pub const BOOTSTRAP_FAILURE_CODE: i32 = 113;

/// Top-level entrypoint stub, placed next to the runfiles tree.
///
/// `$0.runfiles` works both unpacked (stub and tree side by side in a build
/// output directory) and after self-extraction (the bootstrap header invokes
/// the stub from the extraction root). `exec` keeps the stub from lingering
/// as an extra process between the launcher and the script.
const ENTRY_STUB_TEMPLATE: &str = r#"#!/bin/sh
# Generated by scriptpack; do not edit.
set -u
RUNFILES_DIR="$0.runfiles"
export RUNFILES_DIR
entry="$RUNFILES_DIR/{{workspace}}/{{entry}}"
if [ ! -f "$entry" ]; then
    echo "$0: missing runfiles entry '$entry'" >&2
    exit 1
fi
if [ -x "$entry" ]; then
    exec "$entry" "$@"
fi
exec /bin/sh "$entry" "$@"
"#;

/// Self-extracting bootstrap header, prepended to the compressed container.
///
/// Must stay valid shell: the container bytes follow immediately after, and
/// the file doubles as a zip archive for inspection with `unzip -l`.
const BOOTSTRAP_HEADER_TEMPLATE: &str = r#"#!/bin/sh
# Self-extracting launcher for '{{name}}', generated by scriptpack.
# The bytes appended after this header form a zip container; inspect them
# with `unzip -l` on this very file.
set -u
spk_fail={{failcode}}
if ! command -v unzip >/dev/null 2>&1; then
    echo "{{name}}: bootstrap failed: 'unzip' not found in PATH" >&2
    exit "$spk_fail"
fi
spk_root="$(mktemp -d "${TMPDIR:-/tmp}/{{name}}.XXXXXX")" || {
    echo "{{name}}: bootstrap failed: cannot create temporary directory" >&2
    exit "$spk_fail"
}
spk_cleanup() { rm -rf "$spk_root"; }
trap spk_cleanup EXIT
trap 'spk_cleanup; trap - INT; kill -INT $$' INT
trap 'spk_cleanup; trap - TERM; kill -TERM $$' TERM
if ! unzip -q -o "$0" -d "$spk_root" >/dev/null 2>&1; then
    echo "{{name}}: bootstrap failed: cannot unpack embedded container" >&2
    exit "$spk_fail"
fi
"$spk_root/{{name}}" "$@"
exit $?
"#;

/// Render the entrypoint stub for an archive.
///
/// `entry_rel` is the entry script's build-relative path in forward-slash
/// form, exactly as mapped into the runfiles tree.
pub fn render_entry_stub(workspace: &str, entry_rel: &str) -> Result<String> {
    substitute(
        ENTRY_STUB_TEMPLATE,
        &[("workspace", workspace), ("entry", entry_rel)],
    )
}

/// Render the self-extracting bootstrap header for an archive.
pub fn render_bootstrap_header(archive_name: &str) -> Result<String> {
    let failcode = BOOTSTRAP_FAILURE_CODE.to_string();
    substitute(
        BOOTSTRAP_HEADER_TEMPLATE,
        &[("name", archive_name), ("failcode", &failcode)],
    )
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut rendered = template.to_string();
    for (key, value) in vars {
        if value.is_empty() {
            bail!("template variable '{key}' must not be empty");
        }
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    if rendered.contains("{{") {
        bail!("template left with unsubstituted variables");
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_references_the_mapped_entry_path() {
        let stub = render_entry_stub("ws", "tools/hello.sh").unwrap();
        assert!(stub.starts_with("#!/bin/sh\n"));
        assert!(stub.contains("$RUNFILES_DIR/ws/tools/hello.sh"));
        assert!(!stub.contains("{{"));
    }

    #[test]
    fn header_embeds_name_and_reserved_exit_code() {
        let header = render_bootstrap_header("hello").unwrap();
        assert!(header.starts_with("#!/bin/sh\n"));
        assert!(header.contains("spk_fail=113"));
        assert!(header.contains("\"$spk_root/hello\" \"$@\""));
        assert!(!header.contains("{{"));
    }

    #[test]
    fn empty_variables_are_config_errors() {
        assert!(render_entry_stub("", "entry.sh").is_err());
        assert!(render_entry_stub("ws", "").is_err());
        assert!(render_bootstrap_header("").is_err());
    }

    #[test]
    fn header_cleans_up_on_every_exit_path() {
        let header = render_bootstrap_header("hello").unwrap();
        assert!(header.contains("trap spk_cleanup EXIT"));
        assert!(header.contains("kill -INT $$"));
        assert!(header.contains("kill -TERM $$"));
    }
}
