//! Integration tests for the introspection providers
//!
//! The built-in provider is exercised against the procsym binary itself.
//! The objdump provider only runs where binutils is installed; those tests
//! skip quietly elsewhere so the suite stays green on minimal systems.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use procsym::inspect::{ElfInspector, ImageInspector, ObjdumpInspector};
use procsym::ProviderError;

const OWN_BINARY: &str = env!("CARGO_BIN_EXE_procsym");

fn objdump_available() -> bool {
    Command::new("objdump")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn test_builtin_inspects_own_binary() {
    let info = ElfInspector::new()
        .inspect(Path::new(OWN_BINARY))
        .expect("own binary should be inspectable");

    assert!(!info.load_segments.is_empty(), "an ELF executable has load segments");
    let rx = info
        .load_segments
        .iter()
        .find(|s| s.flags.is_rx())
        .expect("an executable has an r-x load segment");
    assert_eq!(rx.virtual_address % 0x1000, rx.file_offset % 0x1000, "congruent modulo page size");

    // unstripped dev build: the C entry point is in the symbol table
    assert!(
        procsym::symbol_offset(&info.symbols, "main").is_some(),
        "main should be a defined symbol in a dev build"
    );
}

#[test]
fn test_builtin_rejects_non_elf() {
    let mut garbage = tempfile::NamedTempFile::new().expect("tempfile");
    garbage.write_all(b"definitely not an object file").expect("write");
    let err = ElfInspector::new().inspect(garbage.path()).err().expect("garbage should not parse");
    assert!(matches!(err, ProviderError::ImageUnparsable { .. }), "got {err}");
}

#[test]
fn test_builtin_read_cap_is_enforced() {
    let err = ElfInspector::new()
        .with_read_cap(64)
        .inspect(Path::new(OWN_BINARY))
        .err()
        .expect("a 64-byte cap rejects any real binary");
    assert!(matches!(err, ProviderError::ImageTooLarge { cap: 64, .. }), "got {err}");
}

#[test]
fn test_objdump_provider_agrees_with_builtin() {
    if !objdump_available() {
        eprintln!("objdump not installed; skipping cross-check");
        return;
    }
    let builtin = ElfInspector::new()
        .inspect(Path::new(OWN_BINARY))
        .expect("own binary should be inspectable");
    let external = ObjdumpInspector::new()
        .inspect(Path::new(OWN_BINARY))
        .expect("objdump should handle the own binary");

    assert_eq!(builtin.load_segments, external.load_segments);
    assert_eq!(
        procsym::symbol_offset(&builtin.symbols, "main"),
        procsym::symbol_offset(&external.symbols, "main"),
        "both providers should agree on the address of main"
    );
}

#[test]
fn test_objdump_timeout_kills_wedged_tool() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("wedged-objdump");
    std::fs::write(&script, "#!/bin/sh\nsleep 5\n").expect("write script");
    let mut perms = std::fs::metadata(&script).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).expect("chmod script");

    let err = ObjdumpInspector::new()
        .with_tool(&script)
        .with_timeout(Duration::from_millis(100))
        .inspect(Path::new(OWN_BINARY))
        .err()
        .expect("a wedged tool should time out");
    assert!(matches!(err, ProviderError::ToolTimedOut { .. }), "got {err}");
}

#[test]
fn test_objdump_reports_tool_failure_on_garbage_input() {
    if !objdump_available() {
        eprintln!("objdump not installed; skipping");
        return;
    }
    let mut garbage = tempfile::NamedTempFile::new().expect("tempfile");
    garbage.write_all(b"definitely not an object file").expect("write");
    let err = ObjdumpInspector::new()
        .inspect(garbage.path())
        .err()
        .expect("objdump should reject garbage");
    assert!(matches!(err, ProviderError::ToolFailed { .. }), "got {err}");
}

#[test]
fn test_live_libc_resolution_when_mapped() {
    #[allow(clippy::cast_possible_wrap)]
    let pid = std::process::id() as i32;
    let segments = procsym::maps::read_segments(pid).expect("own maps are readable");
    if procsym::maps::locate_image(segments, procsym::LIBC_IMAGE).is_none() {
        eprintln!("no libc mapping in this environment (static binary?); skipping");
        return;
    }

    let malloc = procsym::find_libc_function(pid, "malloc")
        .expect("malloc should resolve against a mapped libc");
    assert_ne!(malloc, 0);

    let owner = procsym::find_image_for_address(pid, malloc)
        .expect("a resolved address should reverse-resolve");
    assert!(owner.contains("libc"), "malloc resolved into {owner}");
}
