use std::hash::BuildHasher;
use std::hash::RandomState;

use clap::Parser;
use robin_ring::RobinHoodTable;
use robin_ring::table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Maximum load factor in percent: 50, 80 or 95.
    #[arg(short = 'l', long = "load_factor", default_value_t = 80)]
    load_factor: usize,

    /// Percentage of values to erase after filling, leaving tombstones.
    #[arg(short = 'e', long = "erase_percent", default_value_t = 0)]
    erase_percent: usize,
}

fn run<const LOAD_FACTOR: usize>(args: &Args) {
    let state = RandomState::new();

    println!(
        "Creating RobinHoodTable with target capacity {} and load factor {}%",
        args.target_capacity, LOAD_FACTOR
    );

    let mut table: RobinHoodTable<u64, LOAD_FACTOR> =
        RobinHoodTable::with_capacity(args.target_capacity);

    println!("Actual capacity: {}", table.capacity());
    println!("Table size: {}", table.table_size());
    println!("Filling table with u64 values...");

    let num_values = table.capacity() as u64;
    for value in 0..num_values {
        match table.entry(state.hash_one(value), |&v| v == value) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(_) => {
                panic!("Value already exists in table: {}", value);
            }
        }
    }

    let to_erase = num_values * args.erase_percent.min(100) as u64 / 100;
    for value in 0..to_erase {
        table.remove(state.hash_one(value), |&v| v == value);
    }

    println!("Table holds {} values", table.len());
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.table_size().max(1) as f64) * 100.0
    );

    println!("=== Probe Distance Histogram ===");
    let hist = table.probe_histogram();
    let peak = hist.iter().copied().max().unwrap_or(0).max(1);
    for (distance, &count) in hist.iter().enumerate() {
        let bar = "#".repeat(count * 50 / peak);
        println!("{distance:>4}: {count:>8} {bar}");
    }

    table.debug_stats().print();
}

fn main() {
    let args = Args::parse();

    match args.load_factor {
        50 => run::<50>(&args),
        80 => run::<80>(&args),
        95 => run::<95>(&args),
        other => {
            eprintln!("unsupported load factor {other}; choose 50, 80 or 95");
            std::process::exit(2);
        }
    }
}
