//! procsym entry point
//!
//! Thin wrapper over the library: parse arguments, pick an inspector,
//! dispatch one resolution, print one line. All diagnostics go to stderr so
//! the stdout line stays scriptable.

use std::io::ErrorKind;

use anyhow::Result;
use clap::Parser;

use procsym::cli::Args;
use procsym::inspect::{ElfInspector, ImageInspector, ObjdumpInspector};
use procsym::{ResolveError, Resolver};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
/// Mirrors the automake SKIP convention; scripts can tell "needs
/// privileges" apart from "not found".
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    let args = Args::parse();
    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ResolveError>() {
        Some(ResolveError::ProcessUnavailable { source, .. })
            if source.kind() == ErrorKind::PermissionDenied =>
        {
            EXIT_NOPERM
        }
        _ => EXIT_ERROR,
    }
}

fn run(args: &Args) -> Result<()> {
    if args.objdump {
        execute(args, &Resolver::with_inspector(ObjdumpInspector::new()))
    } else {
        execute(args, &Resolver::with_inspector(ElfInspector::new()))
    }
}

fn execute<I: ImageInspector>(args: &Args, resolver: &Resolver<I>) -> Result<()> {
    if let Some(addr) = args.addr {
        let path = resolver.find_image_for_address(args.pid, addr)?;
        println!("{path}");
        return Ok(());
    }
    match &args.symbol {
        Some(symbol) if args.reloc => {
            let address = resolver.find_relocation(args.pid, &args.image, symbol)?;
            println!("{address:#018x}");
        }
        Some(symbol) => {
            let (address, path) = resolver.find_function(args.pid, &args.image, symbol)?;
            println!("{address:#018x} {path}");
        }
        None => {
            let (path, base) = resolver.find_image_address(args.pid, &args.image)?;
            println!("{base:#018x} {path}");
        }
    }
    Ok(())
}
