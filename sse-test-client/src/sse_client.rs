use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: String,
    pub id: Option<String>,
    pub timestamp: Instant,
}

pub struct Connection {
    pub label: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Open an `EventSource` on `path` (e.g. `/sse/stream?channel=news`).
    pub async fn establish(base_url: &str, path: &str, label: String) -> Result<Self> {
        let url = format!("{}{}", base_url, path);
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .header("Accept", "text/event-stream")?
            .build();

        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        let sse_event = Event {
                            event_type: event.event_type,
                            data: event.data,
                            id: event.id,
                            timestamp: Instant::now(),
                        };

                        if tx.send(sse_event).is_err() {
                            debug!("SSE receiver dropped for {}", task_label);
                            break;
                        }
                    }
                    Some(Ok(es::SSE::Comment(comment))) => {
                        trace!("Keep-alive comment for {}: {}", task_label, comment);
                    }
                    Some(Err(e)) => {
                        warn!("SSE error for {}: {}", task_label, e);
                    }
                    None => {
                        debug!("SSE stream ended for {}", task_label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            event_rx: rx,
            _handle: handle,
        })
    }

    pub async fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", event_type);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.event_type == event_type => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Wrong event type, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("SSE connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", event_type);
                }
            }
        }
    }

    /// Wait for an event of `event_type` whose data equals `data`, skipping any other traffic.
    pub async fn wait_for_data(
        &mut self,
        event_type: &str,
        data: &str,
        timeout: Duration,
    ) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self.wait_for_event(event_type, remaining).await?;
            if event.data == data {
                return Ok(event);
            }
            debug!("{} skipping unrelated {} event", self.label, event_type);
        }
    }
}
