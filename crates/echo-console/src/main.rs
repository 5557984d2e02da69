//! Echo console test executable
//!
//! The standard child program for exercising the console wrapper: by default
//! it echoes every stdin line back to stdout, and it can instead exit
//! immediately, flood stdout with `ping`, or fail on start.

use std::io::{self, BufRead, Write};

use anyhow::bail;
use clap::{Parser, ValueEnum};

/// Behavior on start
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Echo every stdin line back to stdout
    Echo,
    /// Exit immediately with success
    Exit,
    /// Write `ping` to stdout forever
    Flood,
    /// Fail on start
    Fail,
}

/// Echo console test executable
#[derive(Parser)]
#[command(name = "echo-console")]
struct Args {
    /// Behavior on start
    #[arg(value_enum, default_value_t = Mode::Echo)]
    mode: Mode,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.mode {
        Mode::Exit => Ok(()),
        Mode::Fail => bail!("this failure was requested by the caller"),
        Mode::Flood => loop {
            writeln!(out, "ping")?;
        },
        Mode::Echo => {
            for line in io::stdin().lock().lines() {
                writeln!(out, "{}", line?)?;
            }
            Ok(())
        }
    }
}
