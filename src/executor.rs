use tokio::select;
use tokio_stream::Stream;

use crate::{
    active::ActiveCall,
    call::{expired, CallDescriptor, CallInput, CallOutput, CallResult, CallShape, Deadline},
    error::StatusError,
    streaming::{BidiCall, ClientStreamCall, ResponseStream},
    transport::Connector,
};

/// Runs calls of all four shapes over transports opened by a [`Connector`].
///
/// No retries are performed here; every failure is returned to the caller as
/// it was classified.
#[derive(Clone)]
pub struct CallExecutor<C> {
    connector: C,
}

impl<C> CallExecutor<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// One request, one response.
    pub async fn unary<Req, Res>(
        &self,
        call: &CallDescriptor,
        request: Req,
        deadline: Option<Deadline>,
    ) -> Result<Res, StatusError>
    where
        C: Connector<Req, Res>,
    {
        let active = self.open(call, CallShape::Unary, deadline).await?;
        active.send(request).await?;
        active.close_send();
        active.single_response().await
    }

    /// One request, then a lazily consumed sequence of responses.
    pub async fn server_streaming<Req, Res>(
        &self,
        call: &CallDescriptor,
        request: Req,
        deadline: Option<Deadline>,
    ) -> Result<ResponseStream<C::Transport>, StatusError>
    where
        C: Connector<Req, Res>,
    {
        let active = self.open(call, CallShape::ServerStream, deadline).await?;
        active.send(request).await?;
        active.close_send();
        Ok(ResponseStream::new(active))
    }

    /// Opens a client-streaming call whose requests the caller pushes.
    pub async fn client_streaming<Req, Res>(
        &self,
        call: &CallDescriptor,
        deadline: Option<Deadline>,
    ) -> Result<ClientStreamCall<C::Transport>, StatusError>
    where
        C: Connector<Req, Res>,
    {
        let active = self.open(call, CallShape::ClientStream, deadline).await?;
        Ok(ClientStreamCall::new(active))
    }

    /// Sends everything `requests` yields, half-closes and waits for the response.
    pub async fn client_streaming_from<Req, Res, S>(
        &self,
        call: &CallDescriptor,
        requests: S,
        deadline: Option<Deadline>,
    ) -> Result<Res, StatusError>
    where
        C: Connector<Req, Res>,
        S: Stream<Item = Req>,
    {
        let mut stream = self.client_streaming(call, deadline).await?;
        stream.send_all(requests).await?;
        stream.close_and_receive().await
    }

    /// Starts a bidirectional call: `requests` is sent by a separate task while
    /// the returned handle drains the responses.
    pub async fn bidi_streaming<Req, Res, S>(
        &self,
        call: &CallDescriptor,
        requests: S,
        deadline: Option<Deadline>,
    ) -> Result<BidiCall<C::Transport>, StatusError>
    where
        C: Connector<Req, Res>,
        Req: Send + 'static,
        S: Stream<Item = Req> + Send + 'static,
    {
        let active = self.open(call, CallShape::BidiStream, deadline).await?;
        Ok(BidiCall::start(active, requests))
    }

    /// Runs `call` to completion with the shape its descriptor declares.
    ///
    /// A failing response stream yields only the error here; responses that
    /// arrived before it are logged with their count but not returned. Use
    /// [`server_streaming`](Self::server_streaming) or
    /// [`bidi_streaming`](Self::bidi_streaming) to consume them.
    pub async fn invoke<Req, Res>(
        &self,
        call: &CallDescriptor,
        input: CallInput<Req>,
        deadline: Option<Deadline>,
    ) -> CallResult<Res>
    where
        C: Connector<Req, Res>,
        Req: Send + 'static,
    {
        match (call.shape(), input) {
            (CallShape::Unary, CallInput::Single(request)) => self
                .unary(call, request, deadline)
                .await
                .map(CallOutput::Single),
            (CallShape::ServerStream, CallInput::Single(request)) => self
                .server_streaming(call, request, deadline)
                .await?
                .collect_all()
                .await
                .map(CallOutput::Sequence),
            (CallShape::ClientStream, CallInput::Sequence(requests)) => self
                .client_streaming_from(call, tokio_stream::iter(requests), deadline)
                .await
                .map(CallOutput::Single),
            (CallShape::BidiStream, CallInput::Sequence(requests)) => self
                .bidi_streaming(call, tokio_stream::iter(requests), deadline)
                .await?
                .collect_all()
                .await
                .map(CallOutput::Sequence),
            (shape, CallInput::Single(_)) => Err(StatusError::invalid_state(format!(
                "{shape} call {} takes a request sequence",
                call.path()
            ))),
            (shape, CallInput::Sequence(_)) => Err(StatusError::invalid_state(format!(
                "{shape} call {} takes a single request",
                call.path()
            ))),
        }
    }

    async fn open<Req, Res>(
        &self,
        call: &CallDescriptor,
        shape: CallShape,
        deadline: Option<Deadline>,
    ) -> Result<ActiveCall<C::Transport>, StatusError>
    where
        C: Connector<Req, Res>,
    {
        if call.shape() != shape {
            return Err(StatusError::invalid_state(format!(
                "{} is a {} method, not {shape}",
                call.path(),
                call.shape()
            )));
        }
        if deadline.is_some_and(|deadline| deadline.is_expired()) {
            return Err(StatusError::deadline_exceeded(format!(
                "deadline for {} expired before the call started",
                call.path()
            )));
        }
        debug!("Opening call {call}");
        let transport = select! {
            biased;
            () = expired(deadline) => {
                warn!("Deadline exceeded while opening call {call}");
                return Err(StatusError::deadline_exceeded(format!(
                    "deadline exceeded while opening {}",
                    call.path()
                )));
            }
            opened = self.connector.open(call, deadline) => opened?,
        };
        Ok(ActiveCall::new(call.clone(), transport, deadline))
    }
}
