use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Gateway Integration Testing Tool")]
struct Cli {
    /// Base URL of the gateway (e.g., http://localhost:8000)
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test that a stream registers as a live session
    ConnectionTest,
    /// Publish on a channel and receive the message on a stream
    PublishRoundTrip,
    /// Queue events and check the polling stream serves them newest first
    PollingOrder,
    /// Check that clients not accepting text/event-stream get the informational page
    Negotiation,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());

    println!("{} Checking gateway health...", "→".blue());
    api_client.health().await?;
    println!("{} Gateway is up at {}", "✓".green(), cli.base_url);

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&cli.base_url, &api_client).await?);
        }
        ScenarioChoice::PublishRoundTrip => {
            results.push(scenarios::test_publish_round_trip(&cli.base_url, &api_client).await?);
        }
        ScenarioChoice::PollingOrder => {
            results.push(scenarios::test_polling_order(&cli.base_url, &api_client).await?);
        }
        ScenarioChoice::Negotiation => {
            results.push(scenarios::test_negotiation(&api_client).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&cli.base_url, &api_client).await?);
            results.push(scenarios::test_publish_round_trip(&cli.base_url, &api_client).await?);
            results.push(scenarios::test_polling_order(&cli.base_url, &api_client).await?);
            results.push(scenarios::test_negotiation(&api_client).await?);
        }
    }

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
