// Basic Simulation Example
//
// Builds a 4x4 grid by hand, publishes two proxies and queries them from the
// far corners, then prints the per-node densities and proxy records.
//
//   cargo run --example basic_simulation

use log::LevelFilter;
use simple_logger::SimpleLogger;

use ls3d_rust::{ConsoleSink, Ls3dNode, SimConfig, SimError, Simulation};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 4;

fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).env().init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    if let Err(e) = run() {
        eprintln!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let mut sim =
        Simulation::new(SimConfig::default()).with_sink(Box::new(ConsoleSink::new(false)));

    sim.add_nodes(WIDTH * HEIGHT)?;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let id = y * WIDTH + x;
            if x + 1 < WIDTH {
                sim.connect(id, id + 1)?;
            }
            if y + 1 < HEIGHT {
                sim.connect(id, id + WIDTH)?;
            }
        }
    }
    sim.fix_topology();

    println!("Densities:");
    for y in 0..HEIGHT {
        let row: Vec<String> = (0..WIDTH)
            .map(|x| {
                sim.node(y * WIDTH + x)
                    .and_then(|n| n.handler_as::<Ls3dNode>())
                    .map_or_else(|| "-".to_string(), |h| format!("{:>3}", h.density()))
            })
            .collect();
        println!("  {}", row.join(" "));
    }
    println!();

    sim.seed_publish(0, 0, 100)?;
    sim.seed_publish(0, 15, 115)?;
    sim.seed_query(500, 3, 0)?;
    sim.seed_query(500, 12, 15)?;
    sim.seed_query(500, 5, 7)?;

    let summary = sim.run(10_000)?;

    println!("\nProxy records:");
    for id in sim.node_ids() {
        if let Some(node) = sim.node(id).and_then(|n| n.handler_as::<Ls3dNode>()) {
            for (host, proxy) in node.store().iter() {
                println!("  node {:>2}: host {} -> proxy {}", id, host, proxy);
            }
        }
    }
    println!();

    summary.print_summary();
    Ok(())
}
