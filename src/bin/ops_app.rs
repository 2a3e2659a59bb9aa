use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;

use order_pipeline::{Config, MetricsSnapshot, Order, Pipeline};

/// How the pipeline is terminated after submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Graceful drain, every accepted order is delivered
    Shutdown,
    /// Forced cancel, queued orders are abandoned
    Cancel,
    /// Alias for cancel
    ShutdownNow,
}

#[derive(Parser, Debug)]
#[command(version, about = "Drive the order pipeline and print its metrics")]
struct Args {
    /// Number of orders to submit
    #[arg(default_value_t = 500)]
    orders_count: u64,

    /// Termination mode
    #[arg(value_enum, default_value_t = Mode::Shutdown)]
    mode: Mode,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(&args) {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}

fn run(args: &Args) -> Result<()> {
    let started = Instant::now();

    let pipeline = Pipeline::new(Config::default()).context("building pipeline")?;
    pipeline.start().context("starting pipeline")?;
    info!("submitting {} orders", args.orders_count);

    let mut ok = 0u64;
    let mut failed = 0u64;
    for id in 1..=args.orders_count {
        match pipeline.submit(Order::new(id)) {
            Ok(()) => ok += 1,
            Err(_) => failed += 1,
        }
    }

    match args.mode {
        Mode::Shutdown => pipeline.shutdown(),
        Mode::Cancel | Mode::ShutdownNow => pipeline.shutdown_now(),
    }

    let metrics = pipeline.metrics();
    let delivered = pipeline.delivered_orders();
    let wall = started.elapsed();

    println!("Mode:                 {:?}", args.mode);
    println!("Requested:            {}", args.orders_count);
    println!("Submitted OK:         {ok}");
    println!("Submit failed:        {failed}");
    println!("Pipeline state:       {:?}", pipeline.state());
    println!("Accepted:             {}", metrics.accepted);
    println!("Prepared:             {}", metrics.prepared);
    println!("Packed:               {}", metrics.packed);
    println!("Delivered:            {}", metrics.delivered);
    println!("Delivered vector:     {}", delivered.len());
    println!("Submit timeouts:      {}", metrics.submit_timeouts);
    println!(
        "Workers used:         prepare={} pack={} deliver={}",
        metrics.prepare_workers, metrics.pack_workers, metrics.deliver_workers
    );
    println!(
        "q_in push/pop/max:      {}/{}/{}",
        metrics.q_in.pushes, metrics.q_in.pops, metrics.q_in.max_len
    );
    println!(
        "q_prepare push/pop/max: {}/{}/{}",
        metrics.q_prepare.pushes, metrics.q_prepare.pops, metrics.q_prepare.max_len
    );
    println!(
        "q_pack push/pop/max:    {}/{}/{}",
        metrics.q_pack.pushes, metrics.q_pack.pops, metrics.q_pack.max_len
    );
    println!("Total lead time (ms): {}", metrics.total_lead_time.as_millis());
    println!("Wall time (ms):       {}", wall.as_millis());

    for warning in check_invariants(&metrics, delivered.len(), args.mode) {
        println!("WARNING: {warning}");
    }

    Ok(())
}

/// Invariant checks mirroring what the pipeline guarantees after
/// termination; any hit is a bug worth reporting
fn check_invariants(metrics: &MetricsSnapshot, delivered_len: usize, mode: Mode) -> Vec<String> {
    let mut warnings = Vec::new();

    if !(metrics.delivered <= metrics.packed
        && metrics.packed <= metrics.prepared
        && metrics.prepared <= metrics.accepted)
    {
        warnings.push(format!(
            "stage counters are not a chain: {} <= {} <= {} <= {} violated",
            metrics.delivered, metrics.packed, metrics.prepared, metrics.accepted
        ));
    }

    if delivered_len as u64 != metrics.delivered {
        warnings.push(format!(
            "delivered vector holds {} orders but delivered_count is {}",
            delivered_len, metrics.delivered
        ));
    }

    if mode == Mode::Shutdown {
        for (name, counters, stage_count) in [
            ("q_in", &metrics.q_in, metrics.accepted),
            ("q_prepare", &metrics.q_prepare, metrics.prepared),
            ("q_pack", &metrics.q_pack, metrics.packed),
        ] {
            if counters.pushes != counters.pops || counters.pushes != stage_count {
                warnings.push(format!(
                    "{name} accounting mismatch after graceful drain: push={} pop={} stage={stage_count}",
                    counters.pushes, counters.pops
                ));
            }
        }
    }

    warnings
}
