//! Static image introspection
//!
//! The resolution pipeline does not parse binaries itself. It consumes three
//! ordered record lists extracted from an on-disk image by an
//! [`ImageInspector`]:
//!
//! - [`LoadSegment`]s, the loadable program headers,
//! - [`SymbolRecord`]s, the defined symbols with link-time addresses,
//! - [`RelocationRecord`]s, the import slots of the dynamic section.
//!
//! Two providers ship. [`ElfInspector`] parses the image in place with the
//! `object` crate and is the default. [`ObjdumpInspector`] shells out to
//! binutils objdump and parses the tables it prints, useful where matching
//! the behavior of objdump-based tooling matters more than avoiding a
//! subprocess. The pipeline treats both identically, and tests substitute
//! synthetic fixtures through the same trait.

pub mod elf;
pub mod objdump;

pub use elf::ElfInspector;
pub use objdump::ObjdumpInspector;

use std::path::Path;

use crate::errors::ProviderError;

/// Permission flags of one loadable segment, as recorded on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadFlags {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl LoadFlags {
    /// The executable-code filter; mirrors the one applied to live mappings.
    #[must_use]
    pub fn is_rx(self) -> bool {
        self.read && self.execute
    }
}

/// One loadable program header of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    /// Offset of the segment within the image file.
    pub file_offset: u64,
    /// Address the segment wants at the image's link-time address zero.
    pub virtual_address: u64,
    pub flags: LoadFlags,
}

/// One defined-symbol entry. The address is link-time, relative to the
/// image's virtual-address zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub address: u64,
    pub name: String,
}

/// One import-relocation entry, in the same coordinate space as
/// [`SymbolRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationRecord {
    pub address: u64,
    pub name: String,
}

/// Everything the pipeline needs to know about one on-disk image.
///
/// All three lists preserve the provider's enumeration order. Resolution
/// semantics are defined over that order: the first r-x load segment anchors
/// the bias computation and name lookups keep the last match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub load_segments: Vec<LoadSegment>,
    pub symbols: Vec<SymbolRecord>,
    pub relocations: Vec<RelocationRecord>,
}

/// Capability interface for static binary introspection.
///
/// Implementations return freshly owned data on every call; the pipeline
/// relies on per-call ownership for reentrancy. They are also expected to
/// bound their own execution (read caps, tool deadlines) instead of blocking
/// indefinitely on a corrupt image or a wedged tool.
pub trait ImageInspector {
    /// Extract the load segments, symbols and relocations of the image at
    /// `path`.
    ///
    /// # Errors
    ///
    /// Any failure to read, parse or bound the extraction surfaces as a
    /// [`ProviderError`]; no partial lists are produced.
    fn inspect(&self, path: &Path) -> Result<ImageInfo, ProviderError>;
}
