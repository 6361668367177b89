// ANTAGONIST v0.4.2 -- WORST-CASE TIMING INTERFERENCE SEARCH
// TUNES CO-RUNNING ENEMY PROCESSES UNTIL THE SUT'S TAIL LATENCY IS AS BAD AS
// IT GETS, THEN RANKS AND VERIFIES WHAT WAS FOUND.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "antagonist")]
#[command(about = "ANTAGONIST -- WORST-CASE TIMING INTERFERENCE SEARCH")]
struct Cli {
    // DEBUG-LEVEL LOGGING (RUST_LOG OVERRIDES)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // RUN EVERY EXPERIMENT IN THE FILE, IN FILE ORDER
    Tune {
        experiments: PathBuf,

        // RUN ONLY THIS EXPERIMENT
        #[arg(long)]
        only: Option<String>,

        // DUMP EVERY PROGRESS ROW ON EXIT
        #[arg(long)]
        dump_log: bool,
    },

    // PARETO-AGGREGATE RANKED LISTS (REFERENCE FIRST)
    Rank {
        reference: PathBuf,

        #[arg(required = true)]
        comparisons: Vec<PathBuf>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    // REMOTE EVALUATOR FOR `tune` RUNS ON ANOTHER MACHINE
    Serve {
        #[arg(long, default_value = "0.0.0.0:7878")]
        bind: String,

        #[arg(long)]
        templates: PathBuf,

        #[arg(long, default_value = "cc")]
        compiler: String,

        // WHERE ENEMY BINARIES ARE BUILT
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    // BASELINE VS BEST-FOUND CONFIGURATION FOR EACH TUNED EXPERIMENT
    Measure {
        experiments: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        only: Option<String>,
    },

    // CONFIDENCE REPORT FOR A FILE OF WHITESPACE-SEPARATED SAMPLES
    Ci {
        samples: PathBuf,

        #[arg(long, default_value_t = 0.9)]
        quantile: f64,

        #[arg(long, default_value_t = 0.95)]
        confidence: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    match cli.command {
        Command::Tune { experiments, only, dump_log } => {
            cli::tune::run_tune(&experiments, only.as_deref(), dump_log, &SHUTDOWN)
        }
        Command::Rank { reference, comparisons, output } => {
            cli::rank::run_rank(&reference, &comparisons, output.as_deref())
        }
        Command::Serve { bind, templates, compiler, work_dir } => {
            cli::serve::run_serve(&bind, &templates, compiler, work_dir, &SHUTDOWN)
        }
        Command::Measure { experiments, output, only } => {
            cli::measure::run_measure(&experiments, &output, only.as_deref(), &SHUTDOWN)
        }
        Command::Ci { samples, quantile, confidence } => {
            cli::ci::run_ci(&samples, quantile, confidence)
        }
    }
}
