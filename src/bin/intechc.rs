//! the intech compiler driver. takes a `.intech` source file and, by
//! default, writes its three-address-code listing and its x86-64
//! assembly next to it.
//!
//! run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use intech::common::Platform;
use intech::driver::{self, Emit};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the `.intech` source file to compile
    file: PathBuf,
    /// which stage's output to produce
    #[arg(value_enum, long, default_value_t = Emit::Asm)]
    emit: Emit,
    /// which calling convention the assembly targets
    #[arg(value_enum, long, default_value_t = Platform::Sysv)]
    target: Platform,
    /// keep the `.interm` TAC listing once assembly has been written
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    keep_interm: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match driver::compile_file(&args.file, args.emit, args.target, args.keep_interm) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
