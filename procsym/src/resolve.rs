//! Address resolution pipeline
//!
//! Three coordinate systems meet here:
//!
//! - link-time addresses, what symbol tables and relocation records store,
//!   relative to the image's virtual-address zero;
//! - the raw mapped base, the start of the image's first r-x mapping as the
//!   kernel placed it;
//! - runtime addresses, what a debugger or injector actually dereferences in
//!   the target.
//!
//! The load bias converts between them: it is the runtime address of the
//! image's virtual-address zero, so `runtime = bias + link_time`. For images
//! whose code segment starts at file offset zero the bias and the raw base
//! coincide; modern toolchains place the code segment deeper into the file
//! and the two differ exactly by `virtual_address - file_offset` of that
//! segment.
//!
//! Every operation re-reads the target's map listing and re-inspects the
//! image, trading repeated work for freedom from stale state: the answers
//! are correct for the moment of the call even while the target keeps
//! loading libraries.

use std::path::Path;

use log::debug;

use crate::errors::ResolveError;
use crate::inspect::{
    ElfInspector, ImageInspector, LoadSegment, RelocationRecord, SymbolRecord,
};
use crate::maps::{self, image_for_address, locate_image};

/// Image-name filter selecting the C library. Matching on the substring
/// keeps it stable across `libc.so.6`, `libc-2.31.so` and musl-style names
/// while the leading slash keeps it off `libcrypto` and friends.
pub const LIBC_IMAGE: &str = "/libc";

/// Runtime address of an image's virtual-address zero.
///
/// The first readable+executable load segment mirrors the live mapping the
/// locator matched; its on-disk placement says how far that mapping sits
/// above address zero, so `bias = raw_base - (virtual_address -
/// file_offset)`. Images without an r-x load segment keep the raw base.
#[must_use]
pub fn load_bias(raw_base: u64, load_segments: &[LoadSegment]) -> u64 {
    for segment in load_segments {
        if segment.flags.is_rx() {
            let slide = segment.virtual_address.wrapping_sub(segment.file_offset);
            return raw_base.wrapping_sub(slide);
        }
    }
    raw_base
}

/// Link-time address of the named defined symbol, or `None`.
///
/// The scan never stops early: when several records carry the name, the last
/// one in provider order wins. An address of zero, the placeholder an
/// undefined import carries, reports as absent rather than as a resolvable
/// symbol at the image base.
#[must_use]
pub fn symbol_offset(records: &[SymbolRecord], name: &str) -> Option<u64> {
    last_exact_match(records.iter().map(|r| (r.address, r.name.as_str())), name)
}

/// Link-time address of the relocation slot for the named import, or
/// `None`. Same scan rules as [`symbol_offset`].
#[must_use]
pub fn relocation_offset(records: &[RelocationRecord], name: &str) -> Option<u64> {
    last_exact_match(records.iter().map(|r| (r.address, r.name.as_str())), name)
}

fn last_exact_match<'a, I>(records: I, name: &str) -> Option<u64>
where
    I: IntoIterator<Item = (u64, &'a str)>,
{
    let mut found = 0u64;
    for (address, record_name) in records {
        if record_name == name {
            found = address;
        }
    }
    (found != 0).then_some(found)
}

/// External address resolver for a chosen introspection provider.
///
/// The resolver holds no per-process state and borrows nothing between
/// calls, so one instance can serve concurrent lookups against different
/// processes.
pub struct Resolver<I = ElfInspector> {
    inspector: I,
}

impl Resolver<ElfInspector> {
    /// Resolver backed by the built-in ELF provider.
    #[must_use]
    pub fn new() -> Self {
        Self { inspector: ElfInspector::new() }
    }
}

impl Default for Resolver<ElfInspector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ImageInspector> Resolver<I> {
    /// Resolver over a caller-chosen introspection provider.
    #[must_use]
    pub fn with_inspector(inspector: I) -> Self {
        Self { inspector }
    }

    /// Locate the named image in the target and return its mapped path and
    /// raw mapped base.
    ///
    /// `image` is matched as a substring of mapping paths; only readable and
    /// executable mappings are considered and the first match in map order
    /// wins. The returned base is the raw start of that mapping, not the
    /// bias-corrected address zero; [`load_bias`] converts between the two.
    ///
    /// # Errors
    ///
    /// [`ResolveError::ProcessUnavailable`] when the target's maps cannot be
    /// read, [`ResolveError::ImageNotMapped`] when nothing matches.
    pub fn find_image_address(&self, pid: i32, image: &str) -> Result<(String, u64), ResolveError> {
        let segments = maps::read_segments(pid)?;
        locate_image(segments, image)
            .ok_or_else(|| ResolveError::ImageNotMapped { pid, name: image.to_owned() })
    }

    /// Reverse lookup: the path of the image whose mapping contains `addr`.
    ///
    /// # Errors
    ///
    /// [`ResolveError::ProcessUnavailable`] when the target's maps cannot be
    /// read, [`ResolveError::AddressNotMapped`] when no file-backed mapping
    /// contains the address.
    pub fn find_image_for_address(&self, pid: i32, addr: u64) -> Result<String, ResolveError> {
        let segments = maps::read_segments(pid)?;
        image_for_address(segments, addr).ok_or(ResolveError::AddressNotMapped { pid, addr })
    }

    /// Runtime address of the named function in the named image, plus the
    /// mapped path it was found in.
    ///
    /// # Errors
    ///
    /// Everything [`Self::find_image_address`] returns, plus
    /// [`ResolveError::ProviderFailure`] when the image cannot be inspected
    /// and [`ResolveError::SymbolNotFound`] when no usable defined symbol
    /// carries the name.
    pub fn find_function(
        &self,
        pid: i32,
        image: &str,
        name: &str,
    ) -> Result<(u64, String), ResolveError> {
        let (path, raw_base) = self.find_image_address(pid, image)?;
        let info = self.inspector.inspect(Path::new(&path))?;
        let bias = load_bias(raw_base, &info.load_segments);
        debug!("{path}: raw base {raw_base:#x}, load bias {bias:#x}");
        let offset = symbol_offset(&info.symbols, name).ok_or_else(|| {
            ResolveError::SymbolNotFound { name: name.to_owned(), image: path.clone() }
        })?;
        Ok((bias.wrapping_add(offset), path))
    }

    /// Runtime address of the relocation slot (GOT or PLT entry) for the
    /// named import in the named image.
    ///
    /// # Errors
    ///
    /// Everything [`Self::find_image_address`] returns, plus
    /// [`ResolveError::ProviderFailure`] when the image cannot be inspected
    /// and [`ResolveError::RelocationNotFound`] when no usable relocation
    /// record carries the name.
    pub fn find_relocation(&self, pid: i32, image: &str, name: &str) -> Result<u64, ResolveError> {
        let (path, raw_base) = self.find_image_address(pid, image)?;
        let info = self.inspector.inspect(Path::new(&path))?;
        let bias = load_bias(raw_base, &info.load_segments);
        debug!("{path}: raw base {raw_base:#x}, load bias {bias:#x}");
        let offset = relocation_offset(&info.relocations, name).ok_or_else(|| {
            ResolveError::RelocationNotFound { name: name.to_owned(), image: path.clone() }
        })?;
        Ok(bias.wrapping_add(offset))
    }

    /// Runtime address of a C-library function in the target.
    ///
    /// Shorthand for [`Self::find_function`] against [`LIBC_IMAGE`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::find_function`].
    pub fn find_libc_function(&self, pid: i32, name: &str) -> Result<u64, ResolveError> {
        self.find_function(pid, LIBC_IMAGE, name).map(|(address, _path)| address)
    }
}

/// See [`Resolver::find_image_address`]; uses the built-in provider.
///
/// # Errors
///
/// Same as [`Resolver::find_image_address`].
pub fn find_image_address(pid: i32, image: &str) -> Result<(String, u64), ResolveError> {
    Resolver::new().find_image_address(pid, image)
}

/// See [`Resolver::find_image_for_address`]; uses the built-in provider.
///
/// # Errors
///
/// Same as [`Resolver::find_image_for_address`].
pub fn find_image_for_address(pid: i32, addr: u64) -> Result<String, ResolveError> {
    Resolver::new().find_image_for_address(pid, addr)
}

/// See [`Resolver::find_function`]; uses the built-in provider.
///
/// # Errors
///
/// Same as [`Resolver::find_function`].
pub fn find_function(pid: i32, image: &str, name: &str) -> Result<(u64, String), ResolveError> {
    Resolver::new().find_function(pid, image, name)
}

/// See [`Resolver::find_relocation`]; uses the built-in provider.
///
/// # Errors
///
/// Same as [`Resolver::find_relocation`].
pub fn find_relocation(pid: i32, image: &str, name: &str) -> Result<u64, ResolveError> {
    Resolver::new().find_relocation(pid, image, name)
}

/// See [`Resolver::find_libc_function`]; uses the built-in provider.
///
/// # Errors
///
/// Same as [`Resolver::find_libc_function`].
pub fn find_libc_function(pid: i32, name: &str) -> Result<u64, ResolveError> {
    Resolver::new().find_libc_function(pid, name)
}
