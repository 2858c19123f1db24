use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use log::error;

use md5_tunnel::report::{write_outputs, OutputOptions};
use md5_tunnel::{CollisionFinder, CollisionResult, HexArgs, SearchConfig};

/// Tunnels that can be switched off from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tunnel {
    Q4,
    Q9,
    Q10,
    Q13,
    Q14,
    Q20,
    /// The Q9 tunnel of the second block
    #[value(name = "b2-q9")]
    B2Q9,
}

/// Create an MD5 collision using the tunneling method by V. Klima.
///
/// Give 1 hex value for the seed, 4 for a custom IV, or 5 for the seed
/// followed by the IV.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Seed and/or IV words in hex
    #[arg(value_name = "HEX")]
    hex: Vec<String>,

    /// Give up after this many attempts per block
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Independent searches to run in parallel, seeded seed, seed+1, ...
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Directory for the summary and message files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Do not append the summary file
    #[arg(long)]
    no_summary: bool,

    /// Do not write the message binaries
    #[arg(long)]
    no_write: bool,

    /// Walk only the empty mask of this tunnel (repeatable)
    #[arg(long, value_enum)]
    disable_tunnel: Vec<Tunnel>,

    /// More log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn build_config(args: &Args) -> CollisionResult<SearchConfig> {
    let (seed, iv) = HexArgs::parse(&args.hex)?.resolve();
    let mut config = SearchConfig::new(seed, iv).with_max_attempts(args.max_attempts);
    for tunnel in &args.disable_tunnel {
        let tunnels = &mut config.block1_tunnels;
        match tunnel {
            Tunnel::Q4 => tunnels.q4 = false,
            Tunnel::Q9 => tunnels.q9 = false,
            Tunnel::Q10 => tunnels.q10 = false,
            Tunnel::Q13 => tunnels.q13 = false,
            Tunnel::Q14 => tunnels.q14 = false,
            Tunnel::Q20 => tunnels.q20 = false,
            Tunnel::B2Q9 => config.block2_q9_tunnel = false,
        }
    }
    Ok(config)
}

fn run(args: Args) -> CollisionResult<()> {
    let config = build_config(&args)?;
    let iv = config.iv;
    println!(
        "Init vector : 0x{:08X},0x{:08X},0x{:08X},0x{:08X}",
        iv.a, iv.b, iv.c, iv.d
    );
    println!("\nSeed set to 0x{:08X}\n", config.seed);

    let finder = CollisionFinder::new(config)?;
    let report = if args.workers > 1 {
        finder.find_parallel(args.workers)?
    } else {
        finder.find()?
    };
    let collision = &report.collision;

    println!(
        "First block collision took  : {:.6} sec",
        report.block1.elapsed.as_secs_f64()
    );
    println!(
        "Second block collision took : {:.6} sec",
        report.block2.elapsed.as_secs_f64()
    );
    println!(
        "\nFirst and second block took together : {:.6} sec",
        report.total_elapsed().as_secs_f64()
    );
    if collision.seed != finder.config().seed {
        println!("Collision found by the worker seeded 0x{:08X}", collision.seed);
    }

    let options = OutputOptions {
        summary: !args.no_summary,
        messages: !args.no_write,
    };
    let outcomes = write_outputs(&args.output_dir, &report, options);
    if !outcomes.is_empty() {
        println!();
    }
    for outcome in &outcomes {
        println!(
            "Writing {} to disk: {} {}",
            outcome.label,
            outcome.status(),
            outcome.path.display()
        );
    }

    println!("\nColliding hash: {}", collision.digest_hex());
    println!("\nGeneration completed.");

    // The collision is already printed; a failed file still fails the run.
    match outcomes.into_iter().find_map(|outcome| outcome.result.err()) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
