use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the ride dispatch workspace",
    long_about = "A unified CLI for running the dispatch client, benchmarks,\n\
                  and CI checks in the ride dispatch workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the quote set for a trip
    Quote {
        #[arg(long, default_value_t = 10.0)]
        distance_km: f64,
        #[arg(long, default_value_t = 25.0)]
        duration_min: f64,
    },
    /// Run the driver simulator against the configured matching service
    Drive {
        #[arg(long, env = "RIDE_DRIVER_ID", default_value = "driver-1")]
        driver: String,
        /// Optional client config file
        #[arg(long)]
        config: Option<String>,
    },
    /// Run one simulated location acquisition
    Locate,
    /// Run Criterion benchmarks
    Bench,
    /// Compare benchmarks: stash changes, create baseline, restore, compare
    BenchCompare,
    /// Run CI checks (fmt, clippy, tests, smoke run, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Run the offline binary subcommands
    Smoke,
    /// Run benchmarks
    Bench,
    /// Run check + smoke + bench
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn spawn_status(program: &str, args: &[&str]) -> ExitStatus {
    eprintln!("+ {program} {}", args.join(" "));
    Command::new(program)
        .args(args)
        .status()
        .unwrap_or_else(|error| {
            eprintln!("failed to execute {program}: {error}");
            exit(1)
        })
}

fn run_cargo(args: &[&str]) {
    let status = spawn_status("cargo", args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_git(args: &[&str]) {
    let status = spawn_status("git", args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_dispatch(args: &[&str]) {
    let mut full = vec!["run", "-p", "ride_client", "--bin", "ride_dispatch", "--"];
    full.extend_from_slice(args);
    run_cargo(&full);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test ride_core");
    run_cargo(&["test", "-p", "ride_core"]);

    step("Test ride_client");
    run_cargo(&["test", "-p", "ride_client"]);
}

fn ci_smoke() {
    step("Quote a 10 km trip");
    run_dispatch(&["quote", "--distance-km", "10", "--duration-min", "25"]);

    step("Simulated rider acquisition");
    run_dispatch(&["locate", "--purpose", "rider"]);
}

fn ci_bench() {
    step("Run benchmarks");
    run_cargo(&["bench", "--package", "ride_core", "--bench", "performance"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Quote {
            distance_km,
            duration_min,
        } => {
            let distance = distance_km.to_string();
            let duration = duration_min.to_string();
            run_dispatch(&[
                "quote",
                "--distance-km",
                &distance,
                "--duration-min",
                &duration,
            ]);
        }
        Commands::Drive { driver, config } => {
            let mut args = vec!["drive", "--driver", driver.as_str()];
            if let Some(config) = config.as_deref() {
                args.extend_from_slice(&["--config", config]);
            }
            run_dispatch(&args);
        }
        Commands::Locate => {
            run_dispatch(&["locate", "--purpose", "driver"]);
        }
        Commands::Bench => ci_bench(),
        Commands::BenchCompare => {
            let baseline_dir = Path::new("target/criterion");
            if baseline_dir.exists() {
                step("Removing existing benchmark data");
                if let Err(error) = std::fs::remove_dir_all(baseline_dir) {
                    eprintln!("failed to remove target/criterion: {error}");
                    exit(1);
                }
            }

            step("Stashing current changes");
            run_git(&[
                "stash",
                "push",
                "-m",
                "Temporary stash for benchmark comparison",
            ]);

            step("Running benchmark to create baseline");
            run_cargo(&[
                "bench",
                "--package",
                "ride_core",
                "--bench",
                "performance",
                "--",
                "--save-baseline",
                "main",
            ]);

            step("Reapplying changes");
            run_git(&["stash", "pop"]);

            step("Running benchmark comparing against baseline");
            run_cargo(&[
                "bench",
                "--package",
                "ride_core",
                "--bench",
                "performance",
                "--",
                "--baseline",
                "main",
            ]);

            eprintln!("\nDone! Check the output above to see performance comparison.");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Smoke => ci_smoke(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_smoke();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
