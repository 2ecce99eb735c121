use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};

use crate::{calculator, error::StatusError, greet, transport::grpc::GrpcConnector};

/// Scripted demonstration the binary runs against a live server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Demo {
    /// Greet: unary
    Greet,
    /// GreetManyTimes: server streaming
    GreetManyTimes,
    /// LongGreet: client streaming
    LongGreet,
    /// GreetEveryone: bidirectional streaming
    GreetEveryone,
    /// GreetWithDeadline with a 5 s and then a 1 s deadline
    #[default]
    GreetWithDeadline,
    /// Sum: unary
    Sum,
    /// PrimeNumberDecomposition: server streaming
    PrimeNumberDecomposition,
    /// ComputeAverage: client streaming
    ComputeAverage,
    /// FindMaximum: bidirectional streaming
    FindMaximum,
    /// SquareRoot of a valid and of a negative number
    SquareRoot,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DemoSettings {
    /// Deadline applied to every call that does not set its own.
    pub deadline: Option<Duration>,
    /// Pause between streamed requests.
    pub send_interval: Duration,
}

/// Yields `items` one at a time, at most one per `interval`.
pub fn paced<T>(items: Vec<T>, interval: Duration) -> impl Stream<Item = T> + Send + 'static
where
    T: Send + 'static,
{
    tokio_stream::iter(items).throttle(interval)
}

pub async fn run_demo(
    demo: Demo,
    connector: GrpcConnector,
    settings: DemoSettings,
) -> Result<(), StatusError> {
    info!("Running {demo:?} demo");
    match demo {
        Demo::Greet => greet::run_unary(&greet_client(connector, settings)).await,
        Demo::GreetManyTimes => {
            greet::run_server_streaming(&greet_client(connector, settings)).await
        }
        Demo::LongGreet => {
            greet::run_client_streaming(&greet_client(connector, settings), settings.send_interval)
                .await
        }
        Demo::GreetEveryone => {
            greet::run_bidi_streaming(&greet_client(connector, settings), settings.send_interval)
                .await
        }
        Demo::GreetWithDeadline => {
            let client = greet_client(connector, settings);
            greet::run_unary_with_deadline(&client, Duration::from_secs(5)).await?;
            greet::run_unary_with_deadline(&client, Duration::from_secs(1)).await
        }
        Demo::Sum => calculator::run_sum(&calculator_client(connector, settings)).await,
        Demo::PrimeNumberDecomposition => {
            calculator::run_prime_number_decomposition(&calculator_client(connector, settings))
                .await
        }
        Demo::ComputeAverage => {
            calculator::run_compute_average(&calculator_client(connector, settings)).await
        }
        Demo::FindMaximum => {
            calculator::run_find_maximum(
                &calculator_client(connector, settings),
                settings.send_interval,
            )
            .await
        }
        Demo::SquareRoot => {
            calculator::run_square_root(&calculator_client(connector, settings)).await
        }
    }
}

fn greet_client(
    connector: GrpcConnector,
    settings: DemoSettings,
) -> greet::GreetClient<GrpcConnector> {
    greet::GreetClient::new(connector).with_timeout(settings.deadline)
}

fn calculator_client(
    connector: GrpcConnector,
    settings: DemoSettings,
) -> calculator::CalculatorClient<GrpcConnector> {
    calculator::CalculatorClient::new(connector).with_timeout(settings.deadline)
}
