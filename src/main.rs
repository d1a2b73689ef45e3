use log::*;
use service::{config::Config, init_broker, logging::Logger, AppState};
use std::process;

#[tokio::main]
async fn main() {
    let config = Config::new();

    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start the logger: {e}");
        process::exit(1);
    }

    info!("Starting SSE gateway in {} mode", config.runtime_env());

    let broker = match init_broker(&config).await {
        Ok(broker) => broker,
        Err(e) => {
            error!("Unable to connect to the pub/sub broker: {e}");
            process::exit(1);
        }
    };

    let app_state = AppState::new(config, broker);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server failed: {e}");
        process::exit(1);
    }

    info!("SSE gateway stopped");
}
