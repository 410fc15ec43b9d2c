//! adaptest CLI: run, inspect, and simulate adaptive tests.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "adaptest",
    version,
    about = "Computerized adaptive testing under the 3PL IRT model"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive (or scripted) adaptive test session
    Run {
        /// Item bank file or directory (defaults to `item_bank` from config)
        #[arg(long)]
        bank: Option<PathBuf>,

        /// Answers to submit in order, comma-separated 0/1 (default: read stdin)
        #[arg(long)]
        answers: Option<String>,

        /// Output directory for the session report
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Estimate ability from a JSON response history
    Estimate {
        /// JSON file with an array of {a, b, g, u?, answer}
        #[arg(long)]
        responses: PathBuf,

        /// Estimation method: map or eap
        #[arg(long, default_value = "map")]
        method: String,

        /// Print the estimate as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Select the next item for a given ability
    Select {
        /// Item bank file or directory (defaults to `item_bank` from config)
        #[arg(long)]
        bank: Option<PathBuf>,

        /// Current theta
        #[arg(long, allow_negative_numbers = true, default_value = "0.0")]
        theta: f64,

        /// Already administered item ids, comma-separated
        #[arg(long)]
        used: Option<String>,

        /// JSON response history used to build the posterior for EFI
        #[arg(long)]
        responses: Option<PathBuf>,

        /// Selection method: efi or mi
        #[arg(long)]
        method: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Map a theta onto the reported score scale
    Score {
        /// Final theta
        #[arg(long, allow_negative_numbers = true)]
        theta: f64,

        /// Score scale: linear or iq
        #[arg(long)]
        scale: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Simulate examinees with known abilities
    Simulate {
        /// Item bank file or directory (defaults to `item_bank` from config)
        #[arg(long)]
        bank: Option<PathBuf>,

        /// True thetas, comma-separated (e.g. "-2,-1,0,1,2")
        #[arg(long, allow_hyphen_values = true)]
        true_theta: String,

        /// Max concurrent sessions (defaults to `parallelism` from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Seed for the random answer draws
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Answer deterministically (correct iff p >= 0.5) instead of sampling
        #[arg(long, conflicts_with = "seed")]
        threshold: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a saved session report
    Report {
        /// Session report JSON written by `run`
        #[arg(long)]
        input: PathBuf,

        /// Output format: text, markdown or json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate item bank files
    Validate {
        /// Item bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Create starter config and example item bank
    Init,
}

#[tokio::main]
async fn main() {
    let directive: Directive = match "adaptest=info".parse() {
        Ok(directive) => directive,
        Err(e) => {
            eprintln!("Error: invalid log directive: {e}");
            process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            bank,
            answers,
            output,
            json,
            config,
        } => commands::run::execute(bank, answers, output, json, config).await,
        Commands::Estimate {
            responses,
            method,
            json,
            config,
        } => commands::estimate::execute(responses, method, json, config),
        Commands::Select {
            bank,
            theta,
            used,
            responses,
            method,
            config,
        } => commands::select::execute(bank, theta, used, responses, method, config),
        Commands::Score {
            theta,
            scale,
            config,
        } => commands::score::execute(theta, scale, config),
        Commands::Simulate {
            bank,
            true_theta,
            parallelism,
            seed,
            threshold,
            json,
            config,
        } => {
            commands::simulate::execute(bank, true_theta, parallelism, seed, threshold, json, config)
                .await
        }
        Commands::Report { input, format } => commands::report::execute(input, format),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
