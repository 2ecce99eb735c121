use std::time::Duration;

use tokio_stream::{Stream, StreamExt};

use crate::{
    call::Deadline,
    demo::paced,
    error::{StatusError, StatusKind},
    executor::CallExecutor,
    proto::greet::{
        Greeting, GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
        GreetWithDeadlineResponse, LongGreetRequest, LongGreetResponse, GREET, GREET_EVERYONE,
        GREET_MANY_TIMES, GREET_WITH_DEADLINE, LONG_GREET,
    },
    streaming::{BidiCall, ResponseStream},
    transport::Connector,
};

const CROWD: [&str; 5] = ["Marprr", "John", "Step", "Gal", "Ann"];

/// Client of `greet.GreetService`.
#[derive(Clone)]
pub struct GreetClient<C> {
    executor: CallExecutor<C>,
    timeout: Option<Duration>,
}

impl<C> GreetClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            executor: CallExecutor::new(connector),
            timeout: None,
        }
    }

    /// Deadline applied to every call, counted from the moment the call starts.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn deadline(&self) -> Option<Deadline> {
        self.timeout.map(Deadline::after)
    }

    pub async fn greet(&self, request: GreetRequest) -> Result<GreetResponse, StatusError>
    where
        C: Connector<GreetRequest, GreetResponse>,
    {
        self.executor.unary(&GREET, request, self.deadline()).await
    }

    pub async fn greet_many_times(
        &self,
        request: GreetManyTimesRequest,
    ) -> Result<ResponseStream<C::Transport>, StatusError>
    where
        C: Connector<GreetManyTimesRequest, GreetManyTimesResponse>,
    {
        self.executor
            .server_streaming(&GREET_MANY_TIMES, request, self.deadline())
            .await
    }

    pub async fn long_greet<S>(&self, requests: S) -> Result<LongGreetResponse, StatusError>
    where
        C: Connector<LongGreetRequest, LongGreetResponse>,
        S: Stream<Item = LongGreetRequest>,
    {
        self.executor
            .client_streaming_from(&LONG_GREET, requests, self.deadline())
            .await
    }

    pub async fn greet_everyone<S>(
        &self,
        requests: S,
    ) -> Result<BidiCall<C::Transport>, StatusError>
    where
        C: Connector<GreetEveryoneRequest, GreetEveryoneResponse>,
        S: Stream<Item = GreetEveryoneRequest> + Send + 'static,
    {
        self.executor
            .bidi_streaming(&GREET_EVERYONE, requests, self.deadline())
            .await
    }

    /// Unary greet bounded by `timeout` instead of the client-wide deadline.
    pub async fn greet_with_deadline(
        &self,
        request: GreetWithDeadlineRequest,
        timeout: Duration,
    ) -> Result<GreetWithDeadlineResponse, StatusError>
    where
        C: Connector<GreetWithDeadlineRequest, GreetWithDeadlineResponse>,
    {
        self.executor
            .unary(
                &GREET_WITH_DEADLINE,
                request,
                Some(Deadline::after(timeout)),
            )
            .await
    }
}

fn greeting(first_name: &str, last_name: &str) -> Option<Greeting> {
    Some(Greeting {
        first_name: first_name.into(),
        last_name: last_name.into(),
    })
}

pub async fn run_unary<C>(client: &GreetClient<C>) -> Result<(), StatusError>
where
    C: Connector<GreetRequest, GreetResponse>,
{
    info!("Starting to do a Unary RPC...");
    let response = client
        .greet(GreetRequest {
            greeting: greeting("Mar", "M123"),
        })
        .await
        .map_err(|err| {
            error!("Error in request greet: {err}");
            err
        })?;
    info!("Response: {}", response.result);
    Ok(())
}

pub async fn run_server_streaming<C>(client: &GreetClient<C>) -> Result<(), StatusError>
where
    C: Connector<GreetManyTimesRequest, GreetManyTimesResponse>,
{
    info!("Starting to do a Server Streaming RPC...");
    let mut stream = client
        .greet_many_times(GreetManyTimesRequest {
            greeting: greeting("Marr", "mefka1323"),
        })
        .await?;
    while let Some(response) = stream.message().await? {
        info!("Response from GreetManyTimes: {}", response.result);
    }
    Ok(())
}

pub async fn run_client_streaming<C>(
    client: &GreetClient<C>,
    send_interval: Duration,
) -> Result<(), StatusError>
where
    C: Connector<LongGreetRequest, LongGreetResponse>,
{
    info!("Starting to do a Client Streaming RPC...");
    let requests = CROWD
        .iter()
        .map(|name| LongGreetRequest {
            greeting: greeting(name, ""),
        })
        .collect();
    let requests = paced(requests, send_interval).map(|request| {
        info!("Sending req: {request:?}");
        request
    });
    let response = client.long_greet(requests).await?;
    info!("LongGreet Response: {}", response.result);
    Ok(())
}

pub async fn run_bidi_streaming<C>(
    client: &GreetClient<C>,
    send_interval: Duration,
) -> Result<(), StatusError>
where
    C: Connector<GreetEveryoneRequest, GreetEveryoneResponse>,
{
    info!("Starting to do a BiDi Streaming RPC...");
    let requests = CROWD
        .iter()
        .map(|name| GreetEveryoneRequest {
            greeting: greeting(name, ""),
        })
        .collect();
    let requests = paced(requests, send_interval).map(|request| {
        info!("Sending message: {request:?}");
        request
    });
    let mut call = client.greet_everyone(requests).await?;
    while let Some(response) = call.message().await? {
        info!("Received: {}", response.result);
    }
    Ok(())
}

/// A deadline hit is an expected outcome here and is reported, not returned.
pub async fn run_unary_with_deadline<C>(
    client: &GreetClient<C>,
    timeout: Duration,
) -> Result<(), StatusError>
where
    C: Connector<GreetWithDeadlineRequest, GreetWithDeadlineResponse>,
{
    info!("Starting to do a UnaryWithDeadline RPC ({timeout:?})...");
    let request = GreetWithDeadlineRequest {
        greeting: greeting("Mar", "M123"),
    };
    match client.greet_with_deadline(request, timeout).await {
        Ok(response) => {
            info!("Response: {}", response.result);
            Ok(())
        }
        Err(err) if err.kind() == StatusKind::DeadlineExceeded => {
            info!("Timeout has hit! Deadline was exceeded!");
            Ok(())
        }
        Err(err) => {
            error!("Unexpected error: {err}");
            Err(err)
        }
    }
}
