// Scenario Runner - Load and execute scenario files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/line_publish_query.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml/.txt files in directory)
//   cargo run --bin scenario_runner scenarios/grid.yaml --verbose --csv trace.csv

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simple_logger::SimpleLogger;

use ls3d_rust::{ConsoleSink, CsvSink, MultiSink, ObservationSink, Scenario};

struct Options {
    verbose: bool,
    csv: Option<PathBuf>,
}

fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Warn).env().init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--verbose] [--csv FILE]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/line_publish_query.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/grid.yaml --csv trace.csv", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let options = Options {
        verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
        csv: args
            .iter()
            .position(|a| a == "--csv")
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from),
    };

    if path.is_file() {
        run_scenario_file(path, &options);
    } else if path.is_dir() {
        run_scenario_directory(path, &options);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, options: &Options) {
    let mut scenarios = Vec::new();

    // Find all scenario files
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("yaml") | Some("yml") | Some("txt")
            ) {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No scenario files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        // one CSV file would be overwritten by every scenario
        let per_file = Options {
            verbose: options.verbose,
            csv: None,
        };
        run_scenario_file(scenario_path, &per_file);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
}

fn run_scenario_file(path: &Path, options: &Options) {
    println!("Loading scenario from: {}", path.display());

    let scenario = Scenario::from_file(path).unwrap_or_else(|e| {
        eprintln!("Failed to load {}: {}", path.display(), e);
        std::process::exit(1);
    });

    // Print scenario header
    let title = scenario.meta.name.clone().unwrap_or_else(|| {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unnamed");
        format!("Scenario: {}", stem)
    });
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {}{}║", title, " ".repeat(54_usize.saturating_sub(title.len())));
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    println!("Configuration:");
    match scenario.topology.node_count() {
        Ok(nodes) => println!("  Nodes:             {}", nodes),
        Err(e) => println!("  Nodes:             {}", e),
    }
    println!("  Topology:          {:?}", scenario.topology);
    println!("  Duration:          {}", scenario.duration);
    println!("  Hop delay:         {}", scenario.config.hop_delay);
    println!("  Duplicate hilltop: {:?}", scenario.config.duplicate_hilltop);
    println!("  Publishes:         {}", scenario.publishes.len());
    println!("  Subscribes:        {}\n", scenario.subscribes.len());

    let sink = build_sink(options);
    match scenario.run(sink) {
        Ok(summary) => {
            println!();
            summary.print_summary();
        }
        Err(e) => {
            eprintln!("Scenario {} failed: {}", path.display(), e);
            std::process::exit(2);
        }
    }
}

fn build_sink(options: &Options) -> Box<dyn ObservationSink> {
    let console = Box::new(ConsoleSink::new(options.verbose));
    let Some(ref csv_path) = options.csv else {
        return console;
    };

    match CsvSink::create(csv_path) {
        Ok(csv) => {
            println!("Writing observations to {}\n", csv_path.display());
            let mut multi = MultiSink::new();
            multi.add_sink(console);
            multi.add_sink(Box::new(csv));
            Box::new(multi)
        }
        Err(e) => {
            eprintln!("Failed to create {}: {}", csv_path.display(), e);
            std::process::exit(1);
        }
    }
}
