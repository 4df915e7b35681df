//! Print the property tree and messages for a media file
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};

use zenchunk_parse::{FormatKind, Severity};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <file>", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let mut f = BufReader::new(File::open(path).expect("Failed to open file"));
    let mut magic = [0u8; 12];
    let n = f.read(&mut magic).expect("Failed to read file");
    let Some(kind) = FormatKind::detect(&magic[..n]) else {
        eprintln!("{path}: unrecognized format");
        std::process::exit(1);
    };

    let file = File::open(path).expect("Failed to open file");
    match zenchunk_parse::analyze_reader(kind, BufReader::new(file)) {
        Ok(result) => {
            println!("File: {path}");
            println!("Format: {kind}");
            println!("Well-formed: {:?}", result.well_formed());
            println!("Valid: {:?}", result.valid());
            println!("Byte order: {:?}", result.state().byte_order);
            print!("{}", result.properties());
            let errors = result.messages_of(Severity::Malformed).count();
            for message in result.messages() {
                println!("{message}");
            }
            if errors > 0 {
                std::process::exit(2);
            }
        },
        Err(e) => {
            eprintln!("Parse error: {e}");
            std::process::exit(1);
        },
    }
}
