use anyhow::Result;
use colored::*;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const SSE_ONLY_BODY: &str = "<!DOCTYPE html><html><title></title><body>SSE only!</body></html>";

fn unique_channel() -> String {
    format!("sse-test-{}", Uuid::new_v4())
}

pub async fn test_connection(base_url: &str, api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    let channel = unique_channel();

    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());

    println!("{} Opening stream on channel {}...", "→".blue(), channel);
    let _connection = Connection::establish(
        base_url,
        &format!("/sse/stream?channel={}", channel),
        "Listener".to_string(),
    )
    .await?;

    match api_client
        .wait_for_subscriber(&channel, Duration::from_secs(5))
        .await
    {
        Ok(()) => {
            println!("{} Gateway reports a live session on the channel", "✓".green());
            Ok(TestResult::pass("connection", start))
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            Ok(TestResult::fail("connection", start, e.to_string()))
        }
    }
}

pub async fn test_publish_round_trip(base_url: &str, api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    let channel = unique_channel();
    let message = format!("Hello world! {}", Uuid::new_v4());

    println!("\n{}", "=== TEST: Publish Round Trip ===".bright_cyan().bold());

    let mut connection = Connection::establish(
        base_url,
        &format!("/sse/stream?channel={}", channel),
        "Listener".to_string(),
    )
    .await?;
    api_client
        .wait_for_subscriber(&channel, Duration::from_secs(5))
        .await?;

    println!("{} Publishing on channel {}...", "→".blue(), channel);
    let published_at = Instant::now();
    api_client.publish(&channel, &message).await?;

    match connection
        .wait_for_data("message", &message, Duration::from_secs(5))
        .await
    {
        Ok(event) => {
            print_event(&connection.label, &event, published_at);
            println!("{} Message delivered intact", "✓".green());
            Ok(TestResult::pass("publish_round_trip", start))
        }
        Err(e) => {
            println!("{} Timeout waiting for message: {}", "✗".red(), e);
            Ok(TestResult::fail(
                "publish_round_trip",
                start,
                format!("Timeout: {}", e),
            ))
        }
    }
}

pub async fn test_polling_order(base_url: &str, api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    let run = Uuid::new_v4();
    let items: Vec<String> = (1..=3).map(|n| format!("item-{}-{}", n, run)).collect();

    println!("\n{}", "=== TEST: Polling Order ===".bright_cyan().bold());

    for item in &items {
        let queued = api_client.enqueue("message", item).await?;
        println!("{} Queued {} ({} waiting)", "✓".green(), item, queued);
    }

    let mut connection =
        Connection::establish(base_url, "/sse/poll", "Poller".to_string()).await?;

    // Newest item first, with strictly increasing ids.
    let mut last_id: Option<u64> = None;
    for item in items.iter().rev() {
        let event = match connection
            .wait_for_data("message", item, Duration::from_secs(10))
            .await
        {
            Ok(event) => event,
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                return Ok(TestResult::fail(
                    "polling_order",
                    start,
                    format!("Expected {} next: {}", item, e),
                ));
            }
        };
        print_event(&connection.label, &event, start);

        let id = event.id.as_deref().and_then(|id| id.parse::<u64>().ok());
        match (last_id, id) {
            (_, None) => {
                return Ok(TestResult::fail(
                    "polling_order",
                    start,
                    format!("Event for {} carried no numeric id", item),
                ));
            }
            (Some(previous), Some(current)) if current <= previous => {
                return Ok(TestResult::fail(
                    "polling_order",
                    start,
                    format!("Id {} did not increase past {}", current, previous),
                ));
            }
            (_, current) => last_id = current,
        }
    }

    println!("{} Items arrived newest first", "✓".green());
    Ok(TestResult::pass("polling_order", start))
}

pub async fn test_negotiation(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Negotiation ===".bright_cyan().bold());

    for accept in [None, Some("text/html")] {
        println!("{} GET /sse/stream with Accept: {:?}", "→".blue(), accept);
        let response = api_client.get_raw("/sse/stream", accept).await?;

        let is_html = response
            .content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("text/html"));

        if !response.status.is_success() || !is_html || response.body != SSE_ONLY_BODY {
            println!("{} Unexpected response: {:?}", "✗".red(), response);
            return Ok(TestResult::fail(
                "negotiation",
                start,
                format!(
                    "Accept {:?}: got {} {:?}",
                    accept, response.status, response.content_type
                ),
            ));
        }
    }

    println!("{} Non-SSE clients get the informational page", "✓".green());
    Ok(TestResult::pass("negotiation", start))
}
