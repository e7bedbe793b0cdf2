use std::fs;
use std::path::Path;
use std::process::ExitCode;

use crate::cwl::common::error::report;
use crate::cwl::pipeline::{compile, run, Compilation};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct RunOptions {
    /// Run the program after it compiled cleanly.
    pub execute: bool,
    /// Write `<file>_CST.txt` and `<file>_AST.txt` next to the source.
    pub dump: bool,
}

pub fn run_file(file: &str, options: RunOptions) -> ExitCode {
    let source = match fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            println!("[ERROR] Cannot open file '{}': {}", file, e);
            return ExitCode::FAILURE;
        }
    };
    if source.trim().is_empty() {
        println!("[ERROR] Input file is empty.");
        return ExitCode::FAILURE;
    }

    println!("--- COMPILING: {} ---", file);
    let compilation = compile(&source);
    if options.dump {
        dump(file, &compilation);
    }
    for diagnostic in &compilation.diagnostics {
        println!("{}", report(diagnostic.as_ref()));
    }
    let program = match &compilation.ast {
        Some(program) => program,
        None => {
            println!("[ERROR] Compilation failed with {} error(s).", compilation.diagnostics.len());
            return ExitCode::FAILURE;
        }
    };
    println!("[INFO] Static semantics check: SUCCESS");

    if !options.execute {
        return ExitCode::SUCCESS;
    }
    println!("--- EXECUTION ---");
    match run(program) {
        Ok(()) => {
            println!("[INFO] Execution completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", report(&e));
            ExitCode::FAILURE
        }
    }
}

fn dump(file: &str, compilation: &Compilation) {
    let trees = [
        ("CST", compilation.cst.as_ref().map(|cst| cst.serialize())),
        ("AST", compilation.ast_text.clone()),
    ];
    for (suffix, text) in trees {
        let Some(text) = text else { continue };
        let path = format!("{}_{}.txt", file, suffix);
        match fs::write(Path::new(&path), text) {
            Ok(()) => println!("{} written to: {}", suffix, path),
            Err(e) => tracing::warn!(path = %path, error = %e, "could not write tree dump"),
        }
    }
}
