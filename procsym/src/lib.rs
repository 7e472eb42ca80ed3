//! # procsym
//!
//! Resolve the runtime addresses of functions, symbols and relocation slots
//! in another running process, from the outside, without attaching to it.
//!
//! Given a pid, an image-name fragment and a symbol name, the crate answers
//! the question "where does that function live in that process right now",
//! accounting for ASLR and position-independent executables. It works purely
//! from two inputs the kernel and the filesystem already provide:
//!
//! 1. the target's memory-map listing (`/proc/<pid>/maps`), which says where
//!    each image is mapped,
//! 2. the image file on disk, whose program headers and symbol tables say
//!    where each function sits relative to the image's own address zero.
//!
//! Combining the two is a single addition once the load bias is known:
//!
//! ```text
//! maps -> locate image -> raw mapped base
//!                              |                 first r-x load segment
//!                              +--> load bias <-- from the image file
//! symbol table -> link-time offset ----+
//!                                      +--> runtime address = bias + offset
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let pid = 1234;
//! let malloc = procsym::find_libc_function(pid, "malloc")?;
//! let (write_addr, image) = procsym::find_function(pid, "/libssl", "SSL_write")?;
//! let slot = procsym::find_relocation(pid, &image, "malloc")?;
//! let owner = procsym::find_image_for_address(pid, malloc)?;
//! ```
//!
//! The free functions use the built-in ELF provider. [`Resolver`] exposes
//! the same operations over a caller-chosen [`ImageInspector`], including
//! the objdump-backed one.
//!
//! ## Modules
//!
//! - [`maps`]: memory-map snapshots and the image locator
//! - [`inspect`]: static introspection providers and their record types
//! - [`resolve`]: bias computation, name lookups and the composed pipeline
//! - [`errors`]: the failure taxonomy
//! - [`cli`]: argument definitions for the `procsym` binary
//!
//! ## Scope
//!
//! Linux and ELF only. The crate never writes to the target, never attaches
//! ptrace, and never reads the target's memory; everything comes from the
//! map listing and the on-disk image. Reading another user's maps is still
//! subject to the usual ptrace access rules, so expect to need privileges
//! for processes you do not own.

pub mod cli;
pub mod errors;
pub mod inspect;
pub mod maps;
pub mod resolve;

pub use errors::{ProviderError, ResolveError};
pub use inspect::{
    ElfInspector, ImageInfo, ImageInspector, LoadFlags, LoadSegment, ObjdumpInspector,
    RelocationRecord, SymbolRecord,
};
pub use maps::{MemorySegment, Permissions, SegmentIter};
pub use resolve::{
    find_function, find_image_address, find_image_for_address, find_libc_function,
    find_relocation, load_bias, relocation_offset, symbol_offset, Resolver, LIBC_IMAGE,
};
