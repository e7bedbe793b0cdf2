use std::env;
use std::process::ExitCode;

use crate::cwl::runfile::{run_file, RunOptions};

pub mod cwl;

const USAGE: &str = "Usage: cwl <file> [--execute|-e] [--dump|-d]";

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let mut file = None;
    let mut options = RunOptions::default();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--execute" | "-e" => options.execute = true,
            "--dump" | "-d" => options.dump = true,
            path if file.is_none() && !path.starts_with('-') => file = Some(path.to_owned()),
            _ => {
                eprintln!("{}", USAGE);
                return ExitCode::FAILURE;
            }
        }
    }
    match file {
        Some(file) => run_file(&file, options),
        None => {
            eprintln!("{}", USAGE);
            ExitCode::FAILURE
        }
    }
}
