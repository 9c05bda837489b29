//! dirpart CLI entry point
//!
//! Parses arguments and hands off to `cli::run`. Errors are reported on
//! stdout as a JSON envelope by the CLI layer; the exit code is non-zero
//! on failure.

use dirpart::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
