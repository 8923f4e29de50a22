#[macro_use]
extern crate log;

use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use ramssd::*;

pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = match SsdConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            info!(
                "config file {} not found ({}), using default values",
                args.config, e
            );
            SsdConfig::default()
        }
    };
    if let Some(protocol) = args.protocol {
        cfg.bus_protocol = protocol;
    }

    print!("{}", cfg);
    if args.print_config {
        return Ok(());
    }

    let trace_path = match args.trace {
        Some(path) => path,
        None => {
            info!("no trace file given, nothing to do");
            return Ok(());
        }
    };

    let mut ssd = Ssd::new(cfg);
    let trace = File::open(&trace_path)
        .with_context(|| format!("opening trace file {}", trace_path))?;

    println!("STARTING TRACE");
    let start = Instant::now();
    let stats = replay(&mut ssd, BufReader::new(trace))?;
    let elapsed = start.elapsed();
    info!(
        "replayed {} in {} ms",
        trace_path,
        elapsed.as_micros() as f64 / 1000f64
    );

    println!("Num reads : {}", stats.num_reads);
    println!("Num writes: {}", stats.num_writes);
    println!("Failures  : {}", stats.failures);
    println!("Avg read time : {} ns", stats.avg_read_ns());
    println!("Avg write time: {} ns", stats.avg_write_ns());
    Ok(())
}
