use colored::*;
use std::time::{Duration, Instant};

use crate::sse_client::Event;

#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    pub fn pass(scenario: &str, start: Instant) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: true,
            message: None,
            duration: start.elapsed(),
        }
    }

    pub fn fail(scenario: &str, start: Instant, message: impl Into<String>) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: false,
            message: Some(message.into()),
            duration: start.elapsed(),
        }
    }
}

pub fn print_event(label: &str, event: &Event, since: Instant) {
    println!(
        "\n[{}] {} event received after {:?}",
        label.bright_blue().bold(),
        event.event_type.yellow(),
        event.timestamp.saturating_duration_since(since)
    );

    if let Some(id) = &event.id {
        println!("   id: {}", id.dimmed());
    }
    println!("   data: {}", event.data.dimmed());
}

pub fn print_test_summary(results: &[TestResult]) {
    println!("\n{}", "=== TEST SUMMARY ===".bright_white().bold());

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    for result in results {
        let status = if result.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };

        println!("[{}] {} ({:?})", status, result.scenario, result.duration);

        if let Some(msg) = &result.message {
            println!("      {}", msg.dimmed());
        }
    }

    println!(
        "\n{}: {} passed, {} failed",
        "Results".bold(),
        passed.to_string().green(),
        failed.to_string().red()
    );
}
