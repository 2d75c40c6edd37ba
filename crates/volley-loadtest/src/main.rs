//! # Volley CLI
//!
//! Command-line front end for the Volley load-generation engine.
//!
//! ## Usage
//!
//! ```bash
//! # One round of 10 concurrent requests, 1s success timeout
//! volley round --target http://localhost:8080/health --width 10
//!
//! # Stress test to find the breaking width
//! volley stress --target http://localhost:8080/api --max-width 300
//!
//! # 50 req/s for five minutes, results saved as JSON
//! volley sustained --target http://localhost:8080/api --rps 50 --duration 300 -o sustained.json
//!
//! # Everything from a profile, with Prometheus metrics printed at the end
//! volley capacity --profile volley.toml --metrics
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volley_core::{all_bodies_identical, HttpMethod, RequestSpec};
use volley_loadtest::prelude::*;
use volley_loadtest::{is_valid_url, report, EngineMetrics, Profile};

#[derive(Parser)]
#[command(name = "volley")]
#[command(version)]
#[command(about = "Concurrent load generation against an HTTP endpoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target URL (overrides the profile's request URL)
    #[arg(short, long, global = true)]
    target: Option<String>,

    /// HTTP method
    #[arg(short, long, global = true)]
    method: Option<HttpMethod>,

    /// Request header as NAME=VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_key_val, global = true)]
    headers: Vec<(String, String)>,

    /// Request parameter as KEY=VALUE; VALUE is read as JSON when it parses (repeatable)
    #[arg(long = "param", value_parser = parse_key_val, global = true)]
    params: Vec<(String, String)>,

    /// TOML profile with [request], [driver] and per-strategy tables
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    /// Per-request transport timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    request_timeout: u64,

    /// Log every invocation
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the result as JSON to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print Prometheus metrics after the run
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// One concurrency round
    Round {
        #[arg(short, long, default_value = "10")]
        width: usize,

        /// Success timeout in milliseconds
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },

    /// One concurrency round with percentiles
    Detailed {
        #[arg(short, long, default_value = "10")]
        width: usize,
    },

    /// Widen rounds until the failure rate exceeds the acceptable rate
    Stress {
        #[arg(long)]
        start_width: Option<usize>,
        #[arg(long)]
        max_width: Option<usize>,
        #[arg(long)]
        step: Option<usize>,
        #[arg(long)]
        acceptable_fail_rate: Option<f64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Fixed request rate for a fixed duration
    Sustained {
        /// Duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Requests per second (1..=1000)
        #[arg(short, long)]
        rps: Option<u32>,
    },

    /// Normal, peak and recovery rounds
    Peak {
        #[arg(long)]
        normal_width: Option<usize>,
        #[arg(long)]
        peak_width: Option<usize>,
        #[arg(long)]
        normal_hold: Option<u64>,
        #[arg(long)]
        peak_hold: Option<u64>,
    },

    /// The same round repeated at an interval
    Stability {
        #[arg(short, long)]
        width: Option<usize>,
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Seconds between rounds
        #[arg(long)]
        interval: Option<u64>,

        /// Largest tolerated deviation of a round average from the overall mean
        #[arg(long, default_value = "0.5")]
        max_deviation: f64,
    },

    /// Widen rounds while tracking successful throughput
    Capacity {
        #[arg(long)]
        initial_width: Option<usize>,
        #[arg(long)]
        max_width: Option<usize>,
        #[arg(long)]
        increment: Option<usize>,

        /// Requests per second below which the target counts as overloaded
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Sequential requests per worker; all response bodies must match
    Safety {
        #[arg(short, long)]
        width: Option<usize>,
        #[arg(short, long)]
        iterations: Option<usize>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))
}

fn param_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn build_request(cli: &Cli, from_profile: Option<RequestSpec>) -> anyhow::Result<RequestSpec> {
    let mut request = match (&cli.target, from_profile) {
        (Some(url), Some(mut request)) => {
            request.url = url.clone();
            request
        }
        (Some(url), None) => RequestSpec::get(url.clone()),
        (None, Some(request)) => request,
        (None, None) => bail!("no target: pass --target or a profile with a [request] table"),
    };

    if let Some(method) = cli.method {
        request.method = method;
    }
    for (name, value) in &cli.headers {
        request.headers.insert(name.clone(), value.clone());
    }
    for (key, value) in &cli.params {
        request.params.insert(key.clone(), param_value(value));
    }

    if !is_valid_url(&request.target_url()) {
        bail!("invalid target URL: {}", request.url);
    }
    Ok(request)
}

fn load_profile(path: &std::path::Path) -> anyhow::Result<Profile> {
    let profile =
        Profile::load(path).with_context(|| format!("failed to load profile {}", path.display()))?;
    profile
        .validate()
        .with_context(|| format!("invalid profile {}", path.display()))?;
    Ok(profile)
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Result to save plus whether the run passed its own verdict
struct Finished {
    json: serde_json::Value,
    passed: bool,
}

impl Finished {
    fn from_result<T: serde::Serialize>(result: &T) -> anyhow::Result<Self> {
        Self::with_verdict(result, true)
    }

    fn with_verdict<T: serde::Serialize>(result: &T, passed: bool) -> anyhow::Result<Self> {
        Ok(Self {
            json: serde_json::to_value(result)?,
            passed,
        })
    }
}

async fn run(
    command: Commands,
    driver: &ConcurrencyDriver,
    request: &RequestSpec,
    mut profile: Profile,
) -> anyhow::Result<Finished> {
    match command {
        Commands::Round { width, timeout_ms } => {
            let summary = driver
                .run_round(request, width, Duration::from_millis(timeout_ms))
                .await?;
            println!("{}", summary);
            Finished::from_result(&summary)
        }
        Commands::Detailed { width } => {
            let result = driver.run_detailed(request, width).await?;
            println!("{}", report::detailed_report(&result));
            Finished::from_result(&result)
        }
        Commands::Stress {
            start_width,
            max_width,
            step,
            acceptable_fail_rate,
            timeout_ms,
        } => {
            let plan = &mut profile.stress;
            set(&mut plan.start_width, start_width);
            set(&mut plan.max_width, max_width);
            set(&mut plan.step, step);
            set(&mut plan.acceptable_fail_rate, acceptable_fail_rate);
            set(&mut plan.timeout_ms, timeout_ms);

            let trace = run_stress_test(driver, request, plan).await?;
            println!("{}", report::stress_report(&trace));
            Finished::from_result(&trace)
        }
        Commands::Sustained { duration, rps } => {
            let plan = &mut profile.sustained;
            set(&mut plan.duration_secs, duration);
            set(&mut plan.requests_per_second, rps);

            let result = run_sustained_load_test(driver, request, plan).await?;
            println!("{}", report::sustained_report(&result));
            Finished::from_result(&result)
        }
        Commands::Peak {
            normal_width,
            peak_width,
            normal_hold,
            peak_hold,
        } => {
            let plan = &mut profile.peak;
            set(&mut plan.normal_width, normal_width);
            set(&mut plan.peak_width, peak_width);
            set(&mut plan.normal_hold_secs, normal_hold);
            set(&mut plan.peak_hold_secs, peak_hold);

            let result = run_peak_load_test(driver, request, plan).await?;
            println!("{}", result);
            Finished::with_verdict(&result, result.is_resilient())
        }
        Commands::Stability {
            width,
            iterations,
            interval,
            max_deviation,
        } => {
            let plan = &mut profile.stability;
            set(&mut plan.width, width);
            set(&mut plan.iterations, iterations);
            set(&mut plan.interval_secs, interval);

            let trace = run_stability_test(driver, request, plan).await?;
            let stable = trace.is_stable(max_deviation);
            println!("{}", trace);
            println!("Response time stable within {:.0}%: {}", max_deviation * 100.0, stable);
            Finished::with_verdict(&trace, stable)
        }
        Commands::Capacity {
            initial_width,
            max_width,
            increment,
            threshold,
        } => {
            let plan = &mut profile.capacity;
            set(&mut plan.initial_width, initial_width);
            set(&mut plan.max_width, max_width);
            set(&mut plan.increment, increment);
            set(&mut plan.throughput_threshold, threshold);

            let result = run_capacity_test(driver, request, plan).await?;
            println!("{}", report::capacity_report(&result));
            Finished::from_result(&result)
        }
        Commands::Safety { width, iterations } => {
            let plan = &mut profile.safety;
            set(&mut plan.width, width);
            set(&mut plan.iterations_per_worker, iterations);

            let result = run_concurrency_safety_test(driver, request, plan, all_bodies_identical).await?;
            println!("{}", result);
            Finished::with_verdict(&result, result.consistent)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Volley load generator v{}", env!("CARGO_PKG_VERSION"));

    let mut profile = match &cli.profile {
        Some(path) => load_profile(path)?,
        None => Profile::default(),
    };
    let request = build_request(&cli, profile.request.take())?;
    profile.driver.verbose |= cli.verbose;

    let executor = Arc::new(HttpExecutor::new(Duration::from_secs(cli.request_timeout))?);

    let (interrupter, signal) = interrupt_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current round");
            interrupter.interrupt();
        }
    });

    let mut driver = ConcurrencyDriver::new(executor, profile.driver.clone()).with_interrupt(signal);
    let metrics = if cli.metrics {
        let metrics = Arc::new(EngineMetrics::new()?);
        driver = driver.with_metrics(Arc::clone(&metrics));
        Some(metrics)
    } else {
        None
    };

    info!("Target: {} {}", request.method, request.target_url());
    let finished = run(cli.command, &driver, &request, profile).await?;

    // Output JSON if requested
    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&finished.json)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Results saved to {}", path.display());
    }

    if let Some(metrics) = metrics {
        println!("{}", metrics.render()?);
    }

    if !finished.passed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("Authorization=Bearer a=b").unwrap(),
            ("Authorization".to_string(), "Bearer a=b".to_string())
        );
        assert!(parse_key_val("missing").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_request_from_flags() {
        let cli = Cli::parse_from([
            "volley",
            "round",
            "--target",
            "http://localhost:8080/api",
            "--method",
            "post",
            "--param",
            "count=3",
            "--param",
            "name=widget",
            "--header",
            "X-Trace=1",
        ]);
        let request = build_request(&cli, None).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.params["count"], serde_json::json!(3));
        assert_eq!(request.params["name"], serde_json::json!("widget"));
        assert_eq!(request.headers["X-Trace"], "1");
    }

    #[test]
    fn test_target_overrides_profile_url() {
        let cli = Cli::parse_from(["volley", "round", "-t", "http://other:9000/"]);
        let from_profile = RequestSpec::get("http://localhost:8080/").with_header("A", "b");
        let request = build_request(&cli, Some(from_profile)).unwrap();

        assert_eq!(request.url, "http://other:9000/");
        assert_eq!(request.headers["A"], "b");
    }

    #[test]
    fn test_invalid_profile_is_refused() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[capacity]\ninitial_width = 50\nmax_width = 10").unwrap();
        let err = load_profile(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("[capacity]"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[capacity]\nmax_width = 400").unwrap();
        assert_eq!(load_profile(file.path()).unwrap().capacity.max_width, 400);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let cli = Cli::parse_from(["volley", "detailed"]);
        assert!(build_request(&cli, None).is_err());
    }
}
