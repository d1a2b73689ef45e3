use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for opening a channel stream
///
/// # Fields
///
/// * `channel` - The broker channel to stream; the configured default channel when absent
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct StreamParams {
    pub(crate) channel: Option<String>,
}

/// Query parameters for publishing a message on a channel
///
/// # Fields
///
/// * `channel` - The broker channel to publish on; the configured default channel when absent
/// * `message` - The text payload to publish; the configured default message when absent
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct PublishParams {
    pub(crate) channel: Option<String>,
    pub(crate) message: Option<String>,
}

/// Request body for appending an event to the polling queue
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct EnqueueParams {
    #[serde(default = "default_event")]
    #[schema(default = "message")]
    pub(crate) event: String,
    pub(crate) data: String,
}

fn default_event() -> String {
    ::sse::envelope::MESSAGE_EVENT.to_string()
}
