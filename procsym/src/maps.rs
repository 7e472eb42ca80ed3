//! Process memory-map snapshots
//!
//! Reads `/proc/<pid>/maps` and turns each line into a [`MemorySegment`].
//! A maps line has the shape
//!
//! ```text
//! 7f8a10000000-7f8a101c3000 r-xp 00028000 08:01 1048602 /usr/lib/x86_64-linux-gnu/libc.so.6
//! ```
//!
//! with the path column absent for anonymous mappings and pseudo-entries such
//! as `[heap]`, `[stack]` and `[vdso]` carried through verbatim. Lines that
//! do not match the minimum shape are skipped, not fatal: the kernel has
//! grown columns before and the scan must survive entries it does not
//! understand.
//!
//! The listing is a snapshot. Every resolution re-reads it, so results
//! reflect the target's mappings at call time and two calls may disagree if
//! the target maps or unmaps images in between.

#![allow(clippy::struct_excessive_bools)] // the mapping flag bits are independent

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use log::{debug, trace};

use crate::errors::ResolveError;

/// Permission flags of one mapped segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    /// `true` for shared (`s`) mappings, `false` for private (`p`) ones.
    pub shared: bool,
}

impl Permissions {
    /// True for segments that are both readable and executable, the filter
    /// used when locating the code mapping of an image.
    #[must_use]
    pub fn is_rx(self) -> bool {
        self.read && self.execute
    }

    fn parse(field: &str) -> Option<Self> {
        let bytes = field.as_bytes();
        if bytes.len() < 4 {
            return None;
        }
        Some(Self {
            read: bytes[0] == b'r',
            write: bytes[1] == b'w',
            execute: bytes[2] == b'x',
            shared: bytes[3] == b's',
        })
    }
}

/// One mapped region of a process's virtual address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySegment {
    /// First address of the mapping.
    pub start: u64,
    /// Address one past the mapping in kernel terms; see [`Self::contains`]
    /// for how lookups treat it.
    pub end: u64,
    pub perms: Permissions,
    /// Backing file, if any. Anonymous mappings carry `None`.
    pub path: Option<String>,
}

impl MemorySegment {
    /// Range test used by reverse lookup. Inclusive at both ends: an address
    /// equal to `end` still matches, and when two segments are adjacent the
    /// earlier one claims the shared boundary because the scan runs in map
    /// order.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr <= self.end
    }
}

/// Parse one maps line into a segment.
///
/// Returns `None` when the line lacks the five leading columns, the address
/// range is not hex, or the range is empty or inverted. Column separation
/// tolerates any run of whitespace.
#[must_use]
pub fn parse_maps_line(line: &str) -> Option<MemorySegment> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = Permissions::parse(fields.next()?)?;
    let _offset = fields.next()?;
    let _device = fields.next()?;
    let _inode = fields.next()?;
    let path = fields.next().map(str::to_owned);

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if start >= end {
        return None;
    }
    Some(MemorySegment { start, end, perms, path })
}

/// Lazy segment sequence over an owned handle to one process's maps file.
///
/// Each iterator owns its reader, so nested or concurrent scans of the same
/// process never share cursor state. The sequence is finite and
/// non-restartable: unparsable lines are skipped and a read error mid-stream
/// ends it early.
pub struct SegmentIter {
    lines: Lines<BufReader<File>>,
}

impl Iterator for SegmentIter {
    type Item = MemorySegment;

    fn next(&mut self) -> Option<MemorySegment> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(segment) = parse_maps_line(&line) {
                        trace!("segment {:x}-{:x} {:?}", segment.start, segment.end, segment.path);
                        return Some(segment);
                    }
                    debug!("skipping unparsable maps line: {line}");
                }
                Err(err) => {
                    debug!("maps read ended early: {err}");
                    return None;
                }
            }
        }
    }
}

/// Open a process's map listing for iteration, in kernel (ascending start
/// address) order.
///
/// # Errors
///
/// [`ResolveError::ProcessUnavailable`] when `/proc/<pid>/maps` cannot be
/// opened, either because no such process exists or because access to it was
/// denied.
pub fn read_segments(pid: i32) -> Result<SegmentIter, ResolveError> {
    let maps_path = format!("/proc/{pid}/maps");
    let file = File::open(&maps_path)
        .map_err(|source| ResolveError::ProcessUnavailable { pid, source })?;
    Ok(SegmentIter { lines: BufReader::new(file).lines() })
}

/// Find the code mapping of an image by name.
///
/// Scans in map order and selects the first readable and executable segment
/// whose path contains `name` as a substring; earlier mappings shadow later
/// ones. Returns the full mapped path together with the segment's start
/// address, the raw mapped base.
#[must_use]
pub fn locate_image<I>(segments: I, name: &str) -> Option<(String, u64)>
where
    I: IntoIterator<Item = MemorySegment>,
{
    for segment in segments {
        if !segment.perms.is_rx() {
            continue;
        }
        let Some(path) = segment.path else { continue };
        if path.contains(name) {
            debug!("image '{name}' is {path} mapped at {:#x}", segment.start);
            return Some((path, segment.start));
        }
    }
    None
}

/// Reverse lookup: the image whose mapping contains an address.
///
/// Scans in map order and returns the path of the first file-backed segment
/// containing `addr`. Anonymous segments never match; the scan continues
/// past one even when its range covers the address.
#[must_use]
pub fn image_for_address<I>(segments: I, addr: u64) -> Option<String>
where
    I: IntoIterator<Item = MemorySegment>,
{
    segments
        .into_iter()
        .find_map(|segment| if segment.contains(addr) { segment.path } else { None })
}
