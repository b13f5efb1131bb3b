// Reads a scenario in the text format from a file argument or stdin, runs it
// and prints one line per answered query.
//
// Usage:
//   ls3d-sim < input.txt
//   ls3d-sim scenarios/line.txt --verbose

use std::env;
use std::io::{self, Read};

use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

use ls3d_rust::{ConsoleSink, Scenario};

fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Warn).env().init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    let input = args.iter().find(|a| !a.starts_with('-'));

    let scenario = match input {
        Some(path) => Scenario::from_file(path),
        None => {
            let mut text = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut text) {
                eprintln!("Failed to read stdin: {}", e);
                std::process::exit(1);
            }
            Scenario::parse_text(&text)
        }
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load scenario: {}", e);
        std::process::exit(1);
    });

    match scenario.run(Box::new(ConsoleSink::new(verbose))) {
        Ok(summary) => info!(
            "finished at t={} after {} events ({} errors)",
            summary.final_time, summary.events_triggered, summary.errors
        ),
        Err(e) => {
            eprintln!("Simulation aborted: {}", e);
            std::process::exit(2);
        }
    }
}
