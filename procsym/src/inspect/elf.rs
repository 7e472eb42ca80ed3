//! Built-in introspection via the `object` crate
//!
//! Reads the image from disk and walks its program headers, symbol tables
//! and dynamic relocations in place. Enumeration order matches what objdump
//! prints for the same image: program headers in header order, `.symtab`
//! entries before `.dynsym` entries, dynamic relocations in section order.

use std::fs;
use std::io::Read;
use std::path::Path;

use log::debug;
use object::elf::{PF_R, PF_W, PF_X};
use object::{
    Object, ObjectSegment, ObjectSymbol, ObjectSymbolTable, RelocationTarget, SegmentFlags,
};

use super::{ImageInfo, ImageInspector, LoadFlags, LoadSegment, RelocationRecord, SymbolRecord};
use crate::errors::ProviderError;

/// Images larger than this are refused rather than read into memory.
const DEFAULT_READ_CAP: u64 = 512 * 1024 * 1024;

/// In-process ELF introspection provider.
pub struct ElfInspector {
    read_cap: u64,
}

impl ElfInspector {
    #[must_use]
    pub fn new() -> Self {
        Self { read_cap: DEFAULT_READ_CAP }
    }

    /// Cap the number of bytes read from an image file. Larger images fail
    /// with [`ProviderError::ImageTooLarge`] instead of exhausting memory.
    #[must_use]
    pub fn with_read_cap(mut self, bytes: u64) -> Self {
        self.read_cap = bytes;
        self
    }

    fn read_bounded(&self, path: &Path) -> Result<Vec<u8>, ProviderError> {
        let unreadable = |source| ProviderError::ImageUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(unreadable)?;
        let len = file.metadata().map_err(unreadable)?.len();
        if len > self.read_cap {
            return Err(ProviderError::ImageTooLarge {
                path: path.to_path_buf(),
                cap: self.read_cap,
            });
        }
        let mut data = Vec::new();
        // take() keeps the bound hard even if the file grows mid-read
        file.take(self.read_cap).read_to_end(&mut data).map_err(unreadable)?;
        Ok(data)
    }
}

impl Default for ElfInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageInspector for ElfInspector {
    fn inspect(&self, path: &Path) -> Result<ImageInfo, ProviderError> {
        let data = self.read_bounded(path)?;
        let image = object::File::parse(&*data).map_err(|err| ProviderError::ImageUnparsable {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

        let info = ImageInfo {
            load_segments: load_segments(&image),
            symbols: symbol_records(&image),
            relocations: relocation_records(&image),
        };
        debug!(
            "inspected {}: {} load segments, {} symbols, {} relocations",
            path.display(),
            info.load_segments.len(),
            info.symbols.len(),
            info.relocations.len()
        );
        Ok(info)
    }
}

/// Loadable program headers in on-disk order.
fn load_segments(image: &object::File<'_>) -> Vec<LoadSegment> {
    image
        .segments()
        .map(|segment| {
            let (file_offset, _) = segment.file_range();
            LoadSegment {
                file_offset,
                virtual_address: segment.address(),
                flags: load_flags(segment.flags()),
            }
        })
        .collect()
}

fn load_flags(flags: SegmentFlags) -> LoadFlags {
    match flags {
        SegmentFlags::Elf { p_flags } => LoadFlags {
            read: p_flags & PF_R != 0,
            write: p_flags & PF_W != 0,
            execute: p_flags & PF_X != 0,
        },
        _ => LoadFlags::default(),
    }
}

/// Merged symbol tables: `.symtab` entries first, then `.dynsym`, each in
/// table order. Unnamed entries are dropped.
fn symbol_records(image: &object::File<'_>) -> Vec<SymbolRecord> {
    let mut records = Vec::new();
    for symbol in image.symbols().chain(image.dynamic_symbols()) {
        let Ok(name) = symbol.name() else { continue };
        if name.is_empty() {
            continue;
        }
        records.push(SymbolRecord { address: symbol.address(), name: name.to_owned() });
    }
    records
}

/// Dynamic relocations with their import names. Entries targeting anything
/// other than a named dynamic symbol are dropped.
fn relocation_records(image: &object::File<'_>) -> Vec<RelocationRecord> {
    let Some(dynamic_symbols) = image.dynamic_symbol_table() else {
        return Vec::new();
    };
    let Some(relocations) = image.dynamic_relocations() else {
        return Vec::new();
    };
    let mut records = Vec::new();
    for (address, relocation) in relocations {
        let RelocationTarget::Symbol(index) = relocation.target() else {
            continue;
        };
        let Ok(symbol) = dynamic_symbols.symbol_by_index(index) else {
            continue;
        };
        let Ok(name) = symbol.name() else { continue };
        if name.is_empty() {
            continue;
        }
        records.push(RelocationRecord { address, name: name.to_owned() });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_flags_from_elf_bits() {
        let flags = load_flags(SegmentFlags::Elf { p_flags: PF_R | PF_X });
        assert!(flags.read);
        assert!(!flags.write);
        assert!(flags.execute);
        assert!(flags.is_rx());
    }

    #[test]
    fn test_load_flags_from_foreign_format_are_empty() {
        let flags = load_flags(SegmentFlags::None);
        assert_eq!(flags, LoadFlags::default());
    }

    #[test]
    fn test_missing_image_is_unreadable() {
        let err = ElfInspector::new()
            .inspect(Path::new("/nonexistent/image.so"))
            .err()
            .expect("missing file should fail");
        assert!(matches!(err, ProviderError::ImageUnreadable { .. }));
    }
}
