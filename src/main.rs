mod cli;

use std::process::ExitCode;

/// Exit status for errors that stop the whole run.
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[!] {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
