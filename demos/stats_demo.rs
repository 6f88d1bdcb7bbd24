use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use robin_map::HashTable;
use robin_map::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    /// Number of values the table should hold before it would grow
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Remove-then-insert rounds to run after filling, to show how backward
    /// shifting keeps the probe distribution stable under churn
    #[arg(short = 'r', long = "churn_rounds", default_value_t = 0)]
    churn_rounds: usize,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn insert(table: &mut HashTable<u64>, value: u64) {
    match table.entry(hash_u64(value), |&v| v == value) {
        Entry::Vacant(entry) => {
            entry.insert(value);
        }
        Entry::Occupied(_) => {
            panic!("Value already exists in table: {}", value);
        }
    }
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64> = HashTable::with_capacity(args.target_capacity);

    println!(
        "Actual capacity: {} slots, grows past {} values",
        table.capacity(),
        table.max_load()
    );
    println!("Filling table with u64 values...");

    let num_values = table.max_load() as u64;
    for value in 0..num_values {
        insert(&mut table, value);
    }

    println!("Inserted {} values into table", table.len());
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );

    table.probe_histogram().print();
    table.debug_stats().print();

    if args.churn_rounds == 0 {
        return;
    }

    println!("Running {} churn rounds...", args.churn_rounds);
    let mut oldest = 0u64;
    let mut next = num_values;
    for _ in 0..args.churn_rounds {
        if table.remove(hash_u64(oldest), |&v| v == oldest).is_none() {
            panic!("Value missing from table: {}", oldest);
        }
        oldest += 1;

        insert(&mut table, next);
        next += 1;
    }

    table.check_invariants();
    table.probe_histogram().print();
    table.debug_stats().print();
}
