//! Structured error types for procsym
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every failure in the resolution pipeline is returned to the caller as one
//! of these values; nothing is logged-and-swallowed, retried, or reported as
//! a partial result.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the resolution pipeline.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The process's map listing could not be opened; the process does not
    /// exist or access was denied.
    #[error("cannot read memory maps of process {pid}")]
    ProcessUnavailable {
        pid: i32,
        #[source]
        source: io::Error,
    },

    /// No readable+executable mapping matched the image-name substring.
    #[error("no r-x mapping matching '{name}' in process {pid}")]
    ImageNotMapped { pid: i32, name: String },

    /// The static-introspection provider could not produce the segment,
    /// symbol and relocation lists for an image.
    #[error(transparent)]
    ProviderFailure(#[from] ProviderError),

    /// No usable defined symbol with the exact name.
    #[error("symbol '{name}' not found in {image}")]
    SymbolNotFound { name: String, image: String },

    /// No usable relocation record with the exact name.
    #[error("relocation '{name}' not found in {image}")]
    RelocationNotFound { name: String, image: String },

    /// Reverse lookup exhausted the map listing without a containing,
    /// file-backed segment.
    #[error("address 0x{addr:016x} is not mapped to an image in process {pid}")]
    AddressNotMapped { pid: i32, addr: u64 },
}

/// Failures from a static-introspection provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The image file could not be opened or read.
    #[error("cannot read image {}", .path.display())]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The image file is larger than the provider is willing to read.
    #[error("image {} exceeds the {cap}-byte read cap", .path.display())]
    ImageTooLarge { path: PathBuf, cap: u64 },

    /// The image data is not parsable as an ELF object.
    #[error("cannot parse image {}: {detail}", .path.display())]
    ImageUnparsable { path: PathBuf, detail: String },

    /// The external introspection tool could not be started.
    #[error("cannot spawn {tool}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The external tool ran but produced no usable output.
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    /// The external tool overran its deadline and was killed.
    #[error("{tool} did not finish within {timeout:?}")]
    ToolTimedOut { tool: String, timeout: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_not_found_display() {
        let err = ResolveError::SymbolNotFound {
            name: "malloc".to_string(),
            image: "/lib/libc.so.6".to_string(),
        };
        assert_eq!(err.to_string(), "symbol 'malloc' not found in /lib/libc.so.6");
    }

    #[test]
    fn test_address_not_mapped_formats_hex() {
        let err = ResolveError::AddressNotMapped { pid: 42, addr: 0x7f00_0000_1000 };
        assert!(err.to_string().contains("0x00007f0000001000"));
        assert!(err.to_string().contains("process 42"));
    }

    #[test]
    fn test_provider_failure_wraps_transparently() {
        let err = ResolveError::from(ProviderError::ImageTooLarge {
            path: PathBuf::from("/tmp/huge.so"),
            cap: 16,
        });
        assert_eq!(err.to_string(), "image /tmp/huge.so exceeds the 16-byte read cap");
    }

    #[test]
    fn test_process_unavailable_keeps_io_source() {
        let err = ResolveError::ProcessUnavailable {
            pid: 1,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = std::error::Error::source(&err).expect("source should be attached");
        assert!(source.to_string().contains("denied"));
    }
}
