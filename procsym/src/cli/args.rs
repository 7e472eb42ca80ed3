//! CLI argument definitions using clap

use clap::Parser;

/// Resolve function and symbol addresses in a running process.
#[derive(Parser, Debug)]
#[command(
    name = "procsym",
    version,
    about = "Resolve function and symbol addresses in a running process",
    after_help = "EXAMPLES:
    procsym --pid 1234 malloc                  Runtime address of malloc in the target's libc
    procsym --pid 1234 --image /libssl read    Runtime address of read in another image
    procsym --pid 1234 --image /libssl         Mapped base of an image, no symbol lookup
    procsym --pid 1234 --reloc free            Relocation slot (GOT/PLT) for an imported name
    procsym --pid 1234 --addr 0x7f0000001000   Image containing a runtime address

Reading another process's maps may require privileges (CAP_SYS_PTRACE
or the same uid, subject to ptrace_scope)."
)]
pub struct Args {
    /// Process to inspect
    #[arg(short, long)]
    pub pid: i32,

    /// Function or symbol name to resolve; omit to report the image base
    #[arg(value_name = "SYMBOL")]
    pub symbol: Option<String>,

    /// Image-name substring matched against mapping paths
    #[arg(short, long, default_value = "/libc")]
    pub image: String,

    /// Resolve the relocation slot of an imported name instead of a defined symbol
    #[arg(long, requires = "symbol")]
    pub reloc: bool,

    /// Reverse lookup: report the image containing this runtime address (hex)
    #[arg(long, value_name = "ADDR", value_parser = parse_address,
          conflicts_with_all = ["symbol", "reloc"])]
    pub addr: Option<u64>,

    /// Inspect images by spawning objdump instead of the built-in ELF reader
    #[arg(long)]
    pub objdump: bool,
}

fn parse_address(field: &str) -> Result<u64, String> {
    let digits = field.strip_prefix("0x").unwrap_or(field);
    u64::from_str_radix(digits, 16).map_err(|err| format!("not a hex address: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_accepts_optional_prefix() {
        assert_eq!(parse_address("0x7f0000001000"), Ok(0x7f00_0000_1000));
        assert_eq!(parse_address("7f0000001000"), Ok(0x7f00_0000_1000));
        assert!(parse_address("stack").is_err());
    }

    #[test]
    fn test_symbol_lookup_invocation() {
        let args = Args::parse_from(["procsym", "--pid", "1234", "malloc"]);
        assert_eq!(args.pid, 1234);
        assert_eq!(args.symbol.as_deref(), Some("malloc"));
        assert_eq!(args.image, "/libc");
        assert!(!args.reloc);
        assert!(!args.objdump);
    }

    #[test]
    fn test_reloc_requires_symbol() {
        assert!(Args::try_parse_from(["procsym", "--pid", "1", "--reloc"]).is_err());
        let args = Args::parse_from(["procsym", "--pid", "1", "--reloc", "free"]);
        assert!(args.reloc);
    }

    #[test]
    fn test_addr_conflicts_with_symbol() {
        assert!(Args::try_parse_from(["procsym", "--pid", "1", "--addr", "0x1000", "malloc"])
            .is_err());
        let args = Args::parse_from(["procsym", "--pid", "1", "--addr", "0x1000"]);
        assert_eq!(args.addr, Some(0x1000));
    }
}
