//! CLI for pmtud.

use clap::Parser;
use pmtud::{DiscoveryInput, PmtuDetector};
use std::process::ExitCode;
use std::time::Duration;

/// Path MTU discovery over ICMP.
#[derive(Parser, Debug)]
#[command(name = "pmtud")]
#[command(version)]
#[command(about = "Discovers the path MTU to a host, for IPv4 and IPv6")]
pub struct Args {
    /// Target hostname or IP address.
    #[arg(required = true)]
    pub target: String,

    /// Expected path MTU; probed first to speed up discovery.
    #[arg(short = 'e', long = "expected-pmtu")]
    pub expected_pmtu: Option<u16>,

    /// Timeout per probe in milliseconds.
    #[arg(long, default_value = "1000")]
    pub timeout: u64,

    /// Print compact JSON on a single line.
    #[arg(long)]
    pub compact: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    fn to_input(&self) -> DiscoveryInput {
        let mut input = DiscoveryInput::new(self.target.clone());
        input.expected_pmtu = self.expected_pmtu;
        input.probe_timeout = Some(Duration::from_millis(self.timeout));
        input
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("warn").init();
    }

    let input = args.to_input();

    tracing::debug!(
        target = %input.hostname,
        expected_pmtu = ?input.expected_pmtu,
        "starting discovery"
    );

    match PmtuDetector::new().detect(&input).await {
        Ok(result) => {
            let json = if args.compact {
                result.to_json_compact()
            } else {
                result.to_json()
            };
            match json {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize results: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("Discovery failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
