use std::time::Duration;

use clap::Parser;
use rehash_dict::Dict;
use rehash_dict::DictConfig;
use rehash_dict::HashKeys;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "keys", default_value_t = 100_000)]
    keys: u64,

    /// Delete this share of the keys (in percent) and shrink afterwards.
    #[arg(short = 'd', long = "delete_percent", default_value_t = 90)]
    delete_percent: u64,

    #[arg(short = 's', long = "seed", default_value_t = 7)]
    seed: u64,
}

fn main() {
    let args = Args::parse();

    let config = DictConfig::default().with_rng_seed(args.seed);
    let mut dict: Dict<u64, u64, _> = Dict::with_config(HashKeys::new(), (), config);

    println!("Inserting {} keys...", args.keys);
    let mut rehashing_inserts = 0u64;
    for k in 0..args.keys {
        if dict.is_rehashing() {
            rehashing_inserts += 1;
        }
        if let Err(err) = dict.insert(k, k) {
            eprintln!("insert {k} failed: {err}");
            return;
        }
    }
    println!(
        "Inserted {} keys, {} of them while a rehash was in progress",
        dict.len(),
        rehashing_inserts
    );
    print!("{}", dict.stats());

    let doomed = args.keys * args.delete_percent.min(100) / 100;
    println!("Deleting {doomed} keys...");
    for k in 0..doomed {
        if let Err(err) = dict.delete(&k) {
            eprintln!("delete {k} failed: {err}");
            return;
        }
    }

    match dict.resize() {
        Ok(outcome) => println!("Shrink requested: {outcome:?}"),
        Err(err) => {
            eprintln!("resize failed: {err}");
            return;
        }
    }
    dict.table_stats().print();

    let mut slices = 0;
    while dict.rehash_for(Duration::from_micros(100)) {
        slices += 1;
    }
    println!("Rehash finished after {slices} time slices");
    dict.table_stats().print();

    let sample: Vec<u64> = dict.get_some_keys(5).iter().map(|e| *e.key()).collect();
    println!("Sampled keys: {sample:?}");
}
