use std::time::Duration;

use tokio_stream::{Stream, StreamExt};

use crate::{
    call::Deadline,
    demo::paced,
    error::{StatusError, StatusKind},
    executor::CallExecutor,
    proto::calculator::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse, COMPUTE_AVERAGE, FIND_MAXIMUM,
        PRIME_NUMBER_DECOMPOSITION, SQUARE_ROOT, SUM,
    },
    streaming::{BidiCall, ResponseStream},
    transport::Connector,
};

/// Client of `calculator.CalculatorService`.
#[derive(Clone)]
pub struct CalculatorClient<C> {
    executor: CallExecutor<C>,
    timeout: Option<Duration>,
}

impl<C> CalculatorClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            executor: CallExecutor::new(connector),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn deadline(&self) -> Option<Deadline> {
        self.timeout.map(Deadline::after)
    }

    pub async fn sum(&self, request: SumRequest) -> Result<SumResponse, StatusError>
    where
        C: Connector<SumRequest, SumResponse>,
    {
        self.executor.unary(&SUM, request, self.deadline()).await
    }

    pub async fn prime_number_decomposition(
        &self,
        request: PrimeNumberDecompositionRequest,
    ) -> Result<ResponseStream<C::Transport>, StatusError>
    where
        C: Connector<PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse>,
    {
        self.executor
            .server_streaming(&PRIME_NUMBER_DECOMPOSITION, request, self.deadline())
            .await
    }

    pub async fn compute_average<S>(
        &self,
        requests: S,
    ) -> Result<ComputeAverageResponse, StatusError>
    where
        C: Connector<ComputeAverageRequest, ComputeAverageResponse>,
        S: Stream<Item = ComputeAverageRequest>,
    {
        self.executor
            .client_streaming_from(&COMPUTE_AVERAGE, requests, self.deadline())
            .await
    }

    pub async fn find_maximum<S>(&self, requests: S) -> Result<BidiCall<C::Transport>, StatusError>
    where
        C: Connector<FindMaximumRequest, FindMaximumResponse>,
        S: Stream<Item = FindMaximumRequest> + Send + 'static,
    {
        self.executor
            .bidi_streaming(&FIND_MAXIMUM, requests, self.deadline())
            .await
    }

    pub async fn square_root(
        &self,
        request: SquareRootRequest,
    ) -> Result<SquareRootResponse, StatusError>
    where
        C: Connector<SquareRootRequest, SquareRootResponse>,
    {
        self.executor
            .unary(&SQUARE_ROOT, request, self.deadline())
            .await
    }
}

pub async fn run_sum<C>(client: &CalculatorClient<C>) -> Result<(), StatusError>
where
    C: Connector<SumRequest, SumResponse>,
{
    info!("Starting to do a sum Unary RPC...");
    let response = client
        .sum(SumRequest {
            first_number: 123,
            second_number: 123,
        })
        .await?;
    info!("Response: {}", response.sum_result);
    Ok(())
}

pub async fn run_prime_number_decomposition<C>(
    client: &CalculatorClient<C>,
) -> Result<(), StatusError>
where
    C: Connector<PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse>,
{
    info!("Starting to do a PrimeDecomposition Server Streaming RPC...");
    let mut stream = client
        .prime_number_decomposition(PrimeNumberDecompositionRequest { number: 12 })
        .await?;
    while let Some(response) = stream.message().await? {
        info!("Response: {}", response.prime_factor);
    }
    Ok(())
}

pub async fn run_compute_average<C>(client: &CalculatorClient<C>) -> Result<(), StatusError>
where
    C: Connector<ComputeAverageRequest, ComputeAverageResponse>,
{
    info!("Starting to do a ComputeAverage Client Streaming RPC...");
    let requests = tokio_stream::iter([3, 5, 9, 54, 23]).map(|number| {
        info!("Sending number: {number}");
        ComputeAverageRequest { number }
    });
    let response = client.compute_average(requests).await?;
    info!("The average is: {}", response.average);
    Ok(())
}

pub async fn run_find_maximum<C>(
    client: &CalculatorClient<C>,
    send_interval: Duration,
) -> Result<(), StatusError>
where
    C: Connector<FindMaximumRequest, FindMaximumResponse>,
{
    info!("Starting to do a FindMaximum BiDi Streaming RPC...");
    let requests = paced(vec![4, 7, 2, 19, 4, 6, 32], send_interval).map(|number| {
        info!("Sending Number: {number}");
        FindMaximumRequest { number }
    });
    let mut call = client.find_maximum(requests).await?;
    loop {
        match call.message().await {
            Ok(Some(response)) => info!("Received a new maximum of...: {}", response.maximum),
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!("Problem while reading server stream: {err}");
                return Err(err);
            }
        }
    }
}

/// Asks for the square root of 10 and then of -2. The server rejects the
/// latter with `InvalidArgument`, which is reported and not treated as a failure.
pub async fn run_square_root<C>(client: &CalculatorClient<C>) -> Result<(), StatusError>
where
    C: Connector<SquareRootRequest, SquareRootResponse>,
{
    info!("Starting to do a SquareRoot Unary RPC...");
    for number in [10, -2] {
        match client.square_root(SquareRootRequest { number }).await {
            Ok(response) => {
                info!("Result of square root of {number}: {}", response.number_root);
            }
            Err(err) if err.kind() == StatusKind::InvalidArgument => {
                info!("Error message from server: {}", err.message());
                info!("We probably sent a negative number!");
            }
            Err(err) => {
                error!("Error calling SquareRoot: {err}");
                return Err(err);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, MemoryServer};

    #[tokio::test]
    async fn test_sum() {
        let connector = MemoryConnector::new(
            |_call, mut server: MemoryServer<SumRequest, SumResponse>| async move {
                if let Some(request) = server.recv().await {
                    server.send(SumResponse {
                        sum_result: request.first_number + request.second_number,
                    });
                }
            },
        );
        let client = CalculatorClient::new(connector.clone());

        let response = client
            .sum(SumRequest {
                first_number: 123,
                second_number: 123,
            })
            .await
            .unwrap();
        assert_eq!(response.sum_result, 246);
        run_sum(&client).await.unwrap();
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition() {
        let connector = MemoryConnector::new(
            |_call,
             mut server: MemoryServer<
                PrimeNumberDecompositionRequest,
                PrimeNumberDecompositionResponse,
            >| async move {
                let Some(request) = server.recv().await else {
                    return;
                };
                let mut number = request.number;
                let mut divisor = 2;
                while number > 1 {
                    if number % divisor == 0 {
                        server.send(PrimeNumberDecompositionResponse {
                            prime_factor: divisor,
                        });
                        number /= divisor;
                    } else {
                        divisor += 1;
                    }
                }
            },
        );
        let client = CalculatorClient::new(connector);

        let factors: Vec<_> = client
            .prime_number_decomposition(PrimeNumberDecompositionRequest { number: 120 })
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|response| response.prime_factor)
            .collect();
        assert_eq!(factors, vec![2, 2, 2, 3, 5]);
        run_prime_number_decomposition(&client).await.unwrap();
    }

    #[tokio::test]
    async fn test_compute_average() {
        let connector = MemoryConnector::new(
            |_call, mut server: MemoryServer<ComputeAverageRequest, ComputeAverageResponse>| async move {
                let (mut total, mut count) = (0, 0);
                while let Some(request) = server.recv().await {
                    total += request.number;
                    count += 1;
                }
                server.send(ComputeAverageResponse {
                    average: f64::from(total) / f64::from(count),
                });
            },
        );
        let client = CalculatorClient::new(connector.clone());

        let requests =
            tokio_stream::iter([3, 5, 9, 54, 23]).map(|number| ComputeAverageRequest { number });
        let response = client.compute_average(requests).await.unwrap();
        assert!((response.average - 18.8).abs() < f64::EPSILON);

        run_compute_average(&client).await.unwrap();
        assert_eq!(connector.last_call().unwrap().sent(), 5);
    }

    #[tokio::test]
    async fn test_find_maximum() {
        let connector = MemoryConnector::new(
            |_call, mut server: MemoryServer<FindMaximumRequest, FindMaximumResponse>| async move {
                let mut maximum = None;
                while let Some(request) = server.recv().await {
                    if maximum.map_or(true, |maximum| request.number > maximum) {
                        maximum = Some(request.number);
                        server.send(FindMaximumResponse {
                            maximum: request.number,
                        });
                    }
                }
            },
        );
        let client = CalculatorClient::new(connector.clone());

        let requests = paced(vec![4, 7, 2, 19, 4, 6, 32], Duration::ZERO)
            .map(|number| FindMaximumRequest { number });
        let maxima: Vec<_> = client
            .find_maximum(requests)
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap()
            .into_iter()
            .map(|response| response.maximum)
            .collect();
        assert_eq!(maxima, vec![4, 7, 19, 32]);

        run_find_maximum(&client, Duration::ZERO).await.unwrap();
        let stats = connector.last_call().unwrap();
        assert_eq!(stats.sent(), 7);
        assert_eq!(stats.closes(), 1);
    }

    fn square_roots() -> MemoryConnector<SquareRootRequest, SquareRootResponse> {
        MemoryConnector::new(
            |_call, mut server: MemoryServer<SquareRootRequest, SquareRootResponse>| async move {
                let Some(request) = server.recv().await else {
                    return;
                };
                if request.number < 0 {
                    server.fail(StatusError::invalid_argument(format!(
                        "Received a negative number: {}",
                        request.number
                    )));
                } else {
                    server.send(SquareRootResponse {
                        number_root: f64::from(request.number).sqrt(),
                    });
                }
            },
        )
    }

    #[tokio::test]
    async fn test_square_root() {
        let connector = square_roots();
        let client = CalculatorClient::new(connector.clone());

        let response = client
            .square_root(SquareRootRequest { number: 10 })
            .await
            .unwrap();
        assert!((response.number_root - 10f64.sqrt()).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_square_root_of_negative_number() {
        let connector = square_roots();
        let client = CalculatorClient::new(connector.clone());

        let err = client
            .square_root(SquareRootRequest { number: -2 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
        assert_eq!(err.message(), "Received a negative number: -2");
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_square_root_demo_tolerates_invalid_argument() {
        let connector = square_roots();
        let client = CalculatorClient::new(connector.clone());

        run_square_root(&client).await.unwrap();
        assert_eq!(connector.calls(), 2);
    }
}
