// arkc - Bytecode compiler CLI for the Ark programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use ark_compiler::Compiler;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("arkc v{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let mut input = None;
    let mut output = None;
    let mut debug: u16 = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                match args.get(i) {
                    Some(path) => output = Some(path.clone()),
                    None => usage("-o needs a path"),
                }
            }
            "--debug" => {
                i += 1;
                match args.get(i).and_then(|n| n.parse::<u16>().ok()) {
                    Some(level) => debug = level,
                    None => usage("--debug needs a number"),
                }
            }
            arg if arg.starts_with('-') => usage(&format!("unknown option '{}'", arg)),
            arg => {
                if input.is_some() {
                    usage("only one input file is supported");
                }
                input = Some(arg.to_string());
            }
        }
        i += 1;
    }

    let Some(input) = input else {
        usage("no input file");
    };

    if let Err(e) = compile_file(&input, output.as_deref(), debug) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn usage(message: &str) -> ! {
    eprintln!("error: {}", message);
    eprintln!("usage: arkc <file.ark> [-o <file.arkc>] [--debug <level>]");
    process::exit(2);
}

/// Compile a single source file to a bytecode artifact.
fn compile_file(input: &str, output: Option<&str>, debug: u16) -> Result<(), String> {
    let path = Path::new(input);
    match path.extension().and_then(|e| e.to_str()) {
        Some("ark") => {}
        Some(ext) => {
            return Err(format!(
                "error: unsupported file extension '.{}' for '{}' (expected .ark)",
                ext, input
            ));
        }
        None => {
            return Err(format!(
                "error: file '{}' has no extension (expected .ark)",
                input
            ));
        }
    }

    let source =
        fs::read_to_string(path).map_err(|e| format!("error reading '{}': {}", input, e))?;

    let output = match output {
        Some(path) => path.to_string(),
        None => path.with_extension("arkc").to_string_lossy().into_owned(),
    };

    let mut compiler = Compiler::new(debug, 0);
    compiler.feed(&source, input).map_err(|e| e.to_string())?;
    compiler.compile().map_err(|e| e.to_string())?;
    compiler.save_to(&output).map_err(|e| e.to_string())?;

    Ok(())
}
