use crate::controller::ApiResponse;
use crate::params::sse::{EnqueueParams, PublishParams, StreamParams};
use crate::{AppState, Error};
use ::sse::session::negotiate;
use ::sse::{Envelope, SessionStream, StreamSource};
use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::Json;
use futures::{Stream, StreamExt};
use log::*;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use utoipa::ToSchema;

/// Page that opens an `EventSource` on the default channel and prints every message.
const DEMO_PAGE: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <title>SSE</title>
    </head>
    <body>
      <h1>Getting server updates</h1>
      <div id="result"></div>
      <script>
          if (typeof(EventSource) !== "undefined") {
              const evtSource = new EventSource("/sse/stream");
              evtSource.addEventListener("message", function(event) {
                  console.log(event.data);
                  try {
                      console.log(JSON.parse(event.data));
                  } catch (e) {
                      document.getElementById("result").innerHTML += "ERROR: Caught: " + e.message + " --- ";
                  }
                  document.getElementById("result").innerHTML += event.data + "<br>";
              });
          } else {
              document.getElementById("result").innerHTML = "Sorry, your browser does not support server-sent events.";
          }
      </script>
    </body>
</html>
"#;

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct Queued {
    queued: usize,
}

/// Check every `Accept` header before anything touches the broker.
fn accepts_event_stream(headers: &HeaderMap) -> Result<(), Error> {
    let joined = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(", ");
    let accept = (!joined.is_empty()).then_some(joined.as_str());
    negotiate(accept).inspect_err(|_| debug!("Rejecting non-SSE request, Accept: {accept:?}"))?;
    Ok(())
}

fn to_event(envelope: &Envelope) -> Event {
    let mut event = Event::default().event(envelope.event());
    if let Some(id) = envelope.id() {
        event = event.id(id.to_string());
    }
    if let Some(retry_ms) = envelope.retry() {
        event = event.retry(Duration::from_millis(retry_ms));
    }
    event.data(envelope.data())
}

fn event_stream(
    mut session: SessionStream,
    keep_alive: Option<Duration>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream! {
        while let Some(envelope) = session.next().await {
            yield Ok::<_, Infallible>(to_event(&envelope));
        }

        debug!("SSE connection {} has no more events", session.connection_id());
    };

    let sse = Sse::new(events);
    match keep_alive {
        Some(period) => sse.keep_alive(KeepAlive::new().interval(period).text("ping")),
        None => sse,
    }
}

/// GET an SSE stream of the messages published on a channel
#[utoipa::path(
    get,
    path = "/sse/stream",
    params(StreamParams),
    responses(
        (status = 200, description = "An SSE stream of `message` events, or an informational page when text/event-stream is not accepted", content_type = "text/event-stream"),
        (status = 502, description = "The broker could not be reached")
    )
)]
pub async fn stream(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, Error> {
    accepts_event_stream(&headers)?;

    let channel = params
        .channel
        .unwrap_or_else(|| app_state.config.default_channel().to_string());
    debug!("GET SSE stream for channel {channel}");

    let manager = app_state.sse_manager_ref();
    let stream = manager.open_stream(StreamSource::Channel(channel)).await?;

    Ok(event_stream(stream, manager.settings().keep_alive))
}

/// GET an SSE stream fed from the shared polling queue
#[utoipa::path(
    get,
    path = "/sse/poll",
    responses(
        (status = 200, description = "An SSE stream of queued events, newest first, each with an id and a retry hint", content_type = "text/event-stream")
    )
)]
pub async fn poll(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Error> {
    accepts_event_stream(&headers)?;

    debug!("GET SSE polling stream");

    let manager = app_state.sse_manager_ref();
    let stream = manager.open_stream(StreamSource::PollingQueue).await?;

    Ok(event_stream(stream, manager.settings().keep_alive))
}

/// GET publish a message on a channel
#[utoipa::path(
    get,
    path = "/sse/publish",
    params(PublishParams),
    responses(
        (status = 200, description = "The message was handed to the broker"),
        (status = 502, description = "The broker could not be reached")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    Query(params): Query<PublishParams>,
) -> Result<impl IntoResponse, Error> {
    let channel = params
        .channel
        .unwrap_or_else(|| app_state.config.default_channel().to_string());
    let message = params
        .message
        .unwrap_or_else(|| app_state.config.publish_message().to_string());

    debug!("GET publish to channel {channel}");

    app_state.sse_manager.publish(&channel, &message).await?;

    Ok(StatusCode::OK)
}

/// POST append an event to the polling queue
#[utoipa::path(
    post,
    path = "/sse/queue",
    request_body = EnqueueParams,
    responses(
        (status = 202, description = "The event was queued", body = Queued),
        (status = 422, description = "The body is malformed or the event name contains a line break")
    )
)]
pub async fn enqueue(
    State(app_state): State<AppState>,
    Json(params): Json<EnqueueParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST queue {} event", params.event);

    let queued = app_state
        .sse_manager
        .enqueue(&params.event, &params.data)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), Queued { queued })),
    ))
}

/// GET a demo page that prints messages from the default channel
#[utoipa::path(
    get,
    path = "/sse/demo",
    responses(
        (status = 200, description = "HTML page consuming /sse/stream", content_type = "text/html")
    )
)]
pub async fn demo() -> impl IntoResponse {
    Html(DEMO_PAGE)
}
