use rpc_calls::{
    config::get_config, demo::run_demo, error::ClientError, logging, transport::grpc::GrpcConnector,
    VERSION,
};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // parse config
    let config = get_config()?;

    // setup logging
    logging::init(&config.log_level)?;
    log::info!("Starting rpc-calls client v{VERSION}");

    let connector = GrpcConnector::from_config(&config)?;
    log::debug!("Connecting to {}", config.grpc_url);

    // dropping the demo future on interrupt cancels the call in flight
    tokio::select! {
        result = run_demo(config.demo, connector, config.demo_settings()) => {
            result?;
            log::info!("Demo finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::warn!("Interrupted, cancelling the call in flight");
        }
    }

    Ok(())
}
