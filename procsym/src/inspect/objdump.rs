//! External-tool introspection via binutils objdump
//!
//! Runs `objdump -p`, `-tT` and `-rR` against the image and parses the
//! printed tables. The table formats are stable but only loosely documented,
//! so each parser keys on the leading columns it needs and skips everything
//! else. Lines whose size column is not numeric (the versioned `*UND*`
//! entries of a dynamic symbol table) are skipped the same way a
//! field-count-checked scanf parser skips them.
//!
//! One caveat carried over from the tool: `objdump -R` prints versioned
//! import names (`free@GLIBC_2.2.5`), so exact-name relocation lookups
//! against glibc images want the built-in provider instead.
//!
//! Every invocation runs under a deadline. Output is drained on a separate
//! thread while the child is polled, so a child that wedges or floods the
//! pipe is killed and reported instead of hanging the caller.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::SplitWhitespace;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use super::{ImageInfo, ImageInspector, LoadFlags, LoadSegment, RelocationRecord, SymbolRecord};
use crate::errors::ProviderError;

const DEFAULT_TOOL: &str = "objdump";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Introspection provider backed by the objdump executable.
pub struct ObjdumpInspector {
    tool: PathBuf,
    timeout: Duration,
}

impl ObjdumpInspector {
    /// Provider using whatever `objdump` resolves to on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self { tool: PathBuf::from(DEFAULT_TOOL), timeout: DEFAULT_TIMEOUT }
    }

    /// Use a specific objdump binary.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Deadline for each objdump invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn tool_name(&self) -> String {
        self.tool.display().to_string()
    }

    /// Run `objdump <flag> <image>` to completion under the deadline and
    /// return its stdout.
    fn run(&self, flag: &str, image: &Path) -> Result<String, ProviderError> {
        let mut child = Command::new(&self.tool)
            .arg(flag)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProviderError::ToolSpawn { tool: self.tool_name(), source })?;

        let Some(mut stdout) = child.stdout.take() else {
            return Err(ProviderError::ToolFailed {
                tool: self.tool_name(),
                detail: "stdout was not captured".to_string(),
            });
        };
        // Drain on a separate thread: a symbol table bigger than the pipe
        // buffer would otherwise block the child forever and turn every
        // large image into a timeout.
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    reap(&mut child, &reader);
                    return Err(ProviderError::ToolTimedOut {
                        tool: self.tool_name(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(WAIT_POLL),
                Err(source) => {
                    reap(&mut child, &reader);
                    return Err(ProviderError::ToolFailed {
                        tool: self.tool_name(),
                        detail: format!("wait failed: {source}"),
                    });
                }
            }
        };

        let output = match reader.join() {
            Ok(Ok(buf)) => buf,
            Ok(Err(source)) => {
                return Err(ProviderError::ToolFailed {
                    tool: self.tool_name(),
                    detail: format!("reading output failed: {source}"),
                })
            }
            Err(_) => {
                return Err(ProviderError::ToolFailed {
                    tool: self.tool_name(),
                    detail: "output reader panicked".to_string(),
                })
            }
        };
        if !status.success() {
            return Err(ProviderError::ToolFailed {
                tool: self.tool_name(),
                detail: format!("{flag} exited with {status}"),
            });
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

/// Kill a child that will not be waited on normally, then let its pipe
/// close so the reader thread finishes too.
fn reap(child: &mut Child, reader: &thread::JoinHandle<io::Result<Vec<u8>>>) {
    let _ = child.kill();
    let _ = child.wait();
    while !reader.is_finished() {
        thread::sleep(WAIT_POLL);
    }
}

impl Default for ObjdumpInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageInspector for ObjdumpInspector {
    fn inspect(&self, path: &Path) -> Result<ImageInfo, ProviderError> {
        let headers = self.run("-p", path)?;
        let symbols = self.run("-tT", path)?;
        let relocations = self.run("-rR", path)?;
        let info = ImageInfo {
            load_segments: parse_load_segments(&headers),
            symbols: parse_symbols(&symbols),
            relocations: parse_relocations(&relocations),
        };
        debug!(
            "objdump inspected {}: {} load segments, {} symbols, {} relocations",
            path.display(),
            info.load_segments.len(),
            info.symbols.len(),
            info.relocations.len()
        );
        Ok(info)
    }
}

/// Parse the `Program Header:` section of `objdump -p`.
///
/// A loadable entry spans two lines:
///
/// ```text
///     LOAD off    0x0000000000029000 vaddr 0x0000000000029000 paddr ... align 2**12
///          filesz 0x00000000001bb759 memsz 0x00000000001bb759 flags r-x
/// ```
fn parse_load_segments(output: &str) -> Vec<LoadSegment> {
    let mut segments = Vec::new();
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("LOAD") {
            continue;
        }
        let Some(file_offset) = keyed_hex(&mut fields, "off") else { continue };
        let Some(virtual_address) = keyed_hex(&mut fields, "vaddr") else { continue };
        let Some(continuation) = lines.next() else { break };
        let Some(flags) = parse_flags_line(continuation) else { continue };
        segments.push(LoadSegment { file_offset, virtual_address, flags });
    }
    segments
}

/// `filesz 0x... memsz 0x... flags r-x`
fn parse_flags_line(line: &str) -> Option<LoadFlags> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "filesz" {
        return None;
    }
    let _filesz = fields.next()?;
    if fields.next()? != "memsz" {
        return None;
    }
    let _memsz = fields.next()?;
    if fields.next()? != "flags" {
        return None;
    }
    let flags = fields.next()?.as_bytes();
    if flags.len() < 3 {
        return None;
    }
    Some(LoadFlags { read: flags[0] == b'r', write: flags[1] == b'w', execute: flags[2] == b'x' })
}

fn keyed_hex(fields: &mut SplitWhitespace<'_>, key: &str) -> Option<u64> {
    if fields.next()? != key {
        return None;
    }
    parse_hex(fields.next()?)
}

fn parse_hex(field: &str) -> Option<u64> {
    let digits = field.strip_prefix("0x").unwrap_or(field);
    u64::from_str_radix(digits, 16).ok()
}

/// Parse the symbol tables printed by `objdump -tT`.
fn parse_symbols(output: &str) -> Vec<SymbolRecord> {
    output.lines().filter_map(parse_symbol_line).collect()
}

/// One symbol-table row. Rows carry six columns, or seven when a version
/// string sits between size and name:
///
/// ```text
/// 0000000000012e40 g     F .text  00000000000000c5              malloc
/// 0000000000043c90 g    DF .text  00000000000000c5  GLIBC_2.2.5 malloc
/// ```
///
/// The fifth column must be the numeric size; rows where a version string
/// lands there instead (unflagged `*UND*` imports) are not symbol
/// definitions and are skipped.
fn parse_symbol_line(line: &str) -> Option<SymbolRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let address = parse_hex(fields.first().copied()?)?;
    parse_hex(fields.get(4).copied()?)?;
    let name = match fields.len() {
        0..=5 => return None,
        6 => fields[5],
        _ => fields[6],
    };
    Some(SymbolRecord { address, name: name.to_owned() })
}

/// Parse the record table printed by `objdump -rR`.
fn parse_relocations(output: &str) -> Vec<RelocationRecord> {
    output.lines().filter_map(parse_reloc_line).collect()
}

/// `0000000000003fd8 R_X86_64_JUMP_SLOT  malloc@GLIBC_2.2.5`
fn parse_reloc_line(line: &str) -> Option<RelocationRecord> {
    let mut fields = line.split_whitespace();
    let address = parse_hex(fields.next()?)?;
    let _kind = fields.next()?;
    let name = fields.next()?;
    Some(RelocationRecord { address, name: name.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM_HEADERS: &str = "\
/usr/lib/x86_64-linux-gnu/libc.so.6:     file format elf64-x86-64

Program Header:
    PHDR off    0x0000000000000040 vaddr 0x0000000000000040 paddr 0x0000000000000040 align 2**3
         filesz 0x00000000000002d8 memsz 0x00000000000002d8 flags r--
  INTERP off    0x0000000000028bb0 vaddr 0x0000000000028bb0 paddr 0x0000000000028bb0 align 2**4
         filesz 0x000000000000001c memsz 0x000000000000001c flags r--
    LOAD off    0x0000000000000000 vaddr 0x0000000000000000 paddr 0x0000000000000000 align 2**12
         filesz 0x0000000000028e50 memsz 0x0000000000028e50 flags r--
    LOAD off    0x0000000000029000 vaddr 0x0000000000029000 paddr 0x0000000000029000 align 2**12
         filesz 0x00000000001bb759 memsz 0x00000000001bb759 flags r-x
    LOAD off    0x000000000023ef20 vaddr 0x000000000023ff20 paddr 0x000000000023ff20 align 2**12
         filesz 0x0000000000005f80 memsz 0x0000000000012bd8 flags rw-
 DYNAMIC off    0x00000000001e8b80 vaddr 0x00000000001e9b80 paddr 0x00000000001e9b80 align 2**3
         filesz 0x00000000000001e0 memsz 0x00000000000001e0 flags rw-
";

    const SYMBOL_TABLES: &str = "\
/usr/bin/app:     file format elf64-x86-64

SYMBOL TABLE:
0000000000000000 l    df *ABS*  0000000000000000              crt1.c
0000000000001040 l     F .text  0000000000000000              _start
0000000000012e40 g     F .text  00000000000000c5              malloc
0000000000012f10 g     F .text  0000000000000031              main

DYNAMIC SYMBOL TABLE:
0000000000000000      DF *UND*  0000000000000000  GLIBC_2.2.5 free
0000000000000000  w   DF *UND*  0000000000000000  GLIBC_2.2.5 __cxa_finalize
0000000000043c90 g    DF .text  00000000000000c5  GLIBC_2.2.5 malloc
";

    const RELOCATIONS: &str = "\
/usr/bin/app:     file format elf64-x86-64

DYNAMIC RELOCATION RECORDS
OFFSET           TYPE              VALUE
0000000000003df0 R_X86_64_GLOB_DAT __libc_start_main@GLIBC_2.34
0000000000003fd0 R_X86_64_JUMP_SLOT free@GLIBC_2.2.5
0000000000003fd8 R_X86_64_JUMP_SLOT malloc@GLIBC_2.2.5
";

    #[test]
    fn test_parse_load_segments_keeps_only_load_entries() {
        let segments = parse_load_segments(PROGRAM_HEADERS);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].file_offset, 0);
        assert_eq!(segments[0].virtual_address, 0);
        assert!(!segments[0].flags.execute);
        assert_eq!(segments[2].file_offset, 0x0023_ef20);
        assert_eq!(segments[2].virtual_address, 0x0023_ff20);
        assert!(segments[2].flags.write);
    }

    #[test]
    fn test_parse_load_segments_first_rx_is_the_code_segment() {
        let segments = parse_load_segments(PROGRAM_HEADERS);
        let rx = segments.iter().find(|s| s.flags.is_rx()).expect("an r-x segment exists");
        assert_eq!(rx.file_offset, 0x29000);
        assert_eq!(rx.virtual_address, 0x29000);
    }

    #[test]
    fn test_parse_symbols_handles_both_column_layouts() {
        let symbols = parse_symbols(SYMBOL_TABLES);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["crt1.c", "_start", "malloc", "main", "__cxa_finalize", "malloc"]);
        // the last malloc row is the versioned seven-column one
        assert_eq!(symbols.last().map(|s| s.address), Some(0x43c90));
    }

    #[test]
    fn test_parse_symbols_skips_rows_without_numeric_size_column() {
        // the unflagged *UND* free row puts its version string where the
        // size belongs and must not become a record
        let symbols = parse_symbols(SYMBOL_TABLES);
        assert!(!symbols.iter().any(|s| s.name == "free"));
    }

    #[test]
    fn test_parse_relocations_skips_headers() {
        let relocations = parse_relocations(RELOCATIONS);
        assert_eq!(relocations.len(), 3);
        assert_eq!(relocations[1].address, 0x3fd0);
    }

    #[test]
    fn test_parse_relocations_keeps_version_decoration() {
        // objdump prints the versioned name; it is carried verbatim, which
        // is why exact-name lookups against glibc prefer the built-in
        // provider
        let relocations = parse_relocations(RELOCATIONS);
        assert_eq!(relocations[1].name, "free@GLIBC_2.2.5");
    }

    #[test]
    fn test_parse_hex_accepts_optional_prefix() {
        assert_eq!(parse_hex("0x1f"), Some(0x1f));
        assert_eq!(parse_hex("1f"), Some(0x1f));
        assert_eq!(parse_hex("OFFSET"), None);
        assert_eq!(parse_hex(""), None);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let err = ObjdumpInspector::new()
            .with_tool("/nonexistent/objdump")
            .inspect(Path::new("/usr/bin/true"))
            .err()
            .expect("missing tool should fail");
        assert!(matches!(err, ProviderError::ToolSpawn { .. }));
    }
}
