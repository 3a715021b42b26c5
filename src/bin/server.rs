//! Vocalis server binary.
//! Run with: cargo run --bin vocalis-server

use std::process::ExitCode;

use vocalis::start_vocalis;

fn main() -> ExitCode {
    start_vocalis::run()
}
