//! Handles for calls that stay open while the caller streams.

use std::sync::Arc;

use tokio::{select, task::JoinHandle};
use tokio_stream::{Stream, StreamExt};

use crate::{active::ActiveCall, call::expired, error::StatusError, transport::Transport};

/// Lazy sequence of responses of a server-streaming call.
///
/// Each response is handed out as soon as it is received; nothing is buffered
/// beyond what the transport holds. Dropping the stream before its end cancels
/// the call.
pub struct ResponseStream<T: Transport> {
    call: ActiveCall<T>,
    received: usize,
}

impl<T: Transport> ResponseStream<T> {
    pub(crate) fn new(call: ActiveCall<T>) -> Self {
        Self { call, received: 0 }
    }

    /// Next response, `Ok(None)` once the remote ended the stream.
    pub async fn message(&mut self) -> Result<Option<T::Response>, StatusError> {
        let was_open = !self.call.is_terminal();
        match self.call.receive().await {
            Ok(Some(message)) => {
                self.received += 1;
                trace!(
                    "Received response #{} on {}",
                    self.received,
                    self.call.descriptor()
                );
                Ok(Some(message))
            }
            Ok(None) => {
                if was_open {
                    debug!(
                        "Response stream {} ended after {} responses",
                        self.call.descriptor(),
                        self.received
                    );
                }
                self.call.finish();
                Ok(None)
            }
            Err(err) => {
                if was_open {
                    error!(
                        "Response stream {} failed after {} responses: {err}",
                        self.call.descriptor(),
                        self.received
                    );
                }
                Err(err)
            }
        }
    }

    /// Responses delivered so far; they stay valid whatever happens next.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_terminal(&self) -> bool {
        self.call.is_terminal()
    }

    /// Stops the call; later `message` calls return the cancellation.
    pub fn cancel(&self) {
        self.call.cancel();
    }

    /// Drains the remaining responses.
    pub async fn collect_all(mut self) -> Result<Vec<T::Response>, StatusError> {
        let mut responses = Vec::new();
        while let Some(message) = self.message().await? {
            responses.push(message);
        }
        Ok(responses)
    }
}

/// Request side of a client-streaming call.
///
/// Requests are sent at the caller's pace. [`close_send`](Self::close_send)
/// half-closes the call, after which exactly one response is expected.
pub struct ClientStreamCall<T: Transport> {
    call: ActiveCall<T>,
    half_closed: bool,
    sent: usize,
}

impl<T: Transport> ClientStreamCall<T> {
    pub(crate) fn new(call: ActiveCall<T>) -> Self {
        Self {
            call,
            half_closed: false,
            sent: 0,
        }
    }

    pub async fn send(&mut self, message: T::Request) -> Result<(), StatusError> {
        if self.half_closed {
            return Err(StatusError::invalid_state(format!(
                "send on {} after half-close",
                self.call.descriptor().path()
            )));
        }
        self.call.send_before_half_close(message).await?;
        self.sent += 1;
        trace!("Sent request #{} on {}", self.sent, self.call.descriptor());
        Ok(())
    }

    /// Sends every request `requests` yields, waiting for it under the call's
    /// deadline.
    pub async fn send_all<S>(&mut self, requests: S) -> Result<(), StatusError>
    where
        S: Stream<Item = T::Request>,
    {
        tokio::pin!(requests);
        loop {
            let next = select! {
                biased;
                err = self.call.aborted() => return Err(err),
                () = expired(self.call.deadline()) => return Err(self.call.deadline_exceeded()),
                err = self.call.premature_response() => return Err(err),
                next = requests.next() => next,
            };
            match next {
                Some(message) => self.send(message).await?,
                None => return Ok(()),
            }
        }
    }

    /// Signals that no more requests follow. Idempotent.
    ///
    /// Fails the call instead if the remote already answered: a response is
    /// only accepted after half-close.
    pub async fn close_send(&mut self) -> Result<(), StatusError> {
        if self.half_closed {
            return Ok(());
        }
        self.call.ensure_no_premature_response().await?;
        self.half_closed = true;
        self.call.close_send();
        Ok(())
    }

    /// Requests sent so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn cancel(&self) {
        self.call.cancel();
    }

    /// Half-closes if needed and waits for the single response.
    pub async fn close_and_receive(mut self) -> Result<T::Response, StatusError> {
        self.close_send().await?;
        debug!(
            "Sent {} requests on {}, waiting for the response",
            self.sent,
            self.call.descriptor()
        );
        self.call.single_response().await
    }
}

/// A bidirectional-streaming call.
///
/// Requests are driven by a spawned task from the stream given at open time,
/// which half-closes the call once that stream is exhausted. Responses are
/// drained by the owner through [`message`](Self::message). A failure on either
/// side aborts both; the call succeeds once the response stream has ended and
/// the send driver is done.
pub struct BidiCall<T: Transport> {
    call: Arc<ActiveCall<T>>,
    driver: Option<JoinHandle<Result<usize, StatusError>>>,
    received: usize,
}

impl<T: Transport> BidiCall<T> {
    pub(crate) fn start<S>(call: ActiveCall<T>, requests: S) -> Self
    where
        S: Stream<Item = T::Request> + Send + 'static,
    {
        let call = Arc::new(call);
        let driver = tokio::spawn(drive_requests(Arc::clone(&call), requests));
        Self {
            call,
            driver: Some(driver),
            received: 0,
        }
    }

    /// Next response, `Ok(None)` once both directions are done.
    pub async fn message(&mut self) -> Result<Option<T::Response>, StatusError> {
        match self.call.receive().await {
            Ok(Some(message)) => {
                self.received += 1;
                trace!(
                    "Received response #{} on {}",
                    self.received,
                    self.call.descriptor()
                );
                Ok(Some(message))
            }
            Ok(None) => {
                self.join_driver().await?;
                self.call.finish();
                Ok(None)
            }
            Err(err) => {
                if let Some(driver) = self.driver.take() {
                    error!(
                        "Call {} failed after {} responses: {err}",
                        self.call.descriptor(),
                        self.received
                    );
                    driver.abort();
                }
                Err(err)
            }
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_terminal(&self) -> bool {
        self.call.is_terminal()
    }

    pub fn cancel(&self) {
        self.call.cancel();
    }

    /// Drains the remaining responses.
    pub async fn collect_all(mut self) -> Result<Vec<T::Response>, StatusError> {
        let mut responses = Vec::new();
        while let Some(message) = self.message().await? {
            responses.push(message);
        }
        Ok(responses)
    }

    async fn join_driver(&mut self) -> Result<(), StatusError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        if !driver.is_finished() {
            debug!(
                "Responses on {} ended before all requests were sent, stopping the send driver",
                self.call.descriptor()
            );
            driver.abort();
        }
        match driver.await {
            Ok(Ok(sent)) => {
                debug!(
                    "Call {} done: {sent} requests sent, {} responses received",
                    self.call.descriptor(),
                    self.received
                );
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(self.call.abort(StatusError::unknown(format!(
                "send driver for {} failed: {err}",
                self.call.descriptor().path()
            )))),
        }
    }
}

impl<T: Transport> Drop for BidiCall<T> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.call.cancel();
    }
}

async fn drive_requests<T, S>(call: Arc<ActiveCall<T>>, requests: S) -> Result<usize, StatusError>
where
    T: Transport,
    S: Stream<Item = T::Request>,
{
    tokio::pin!(requests);
    let mut sent = 0;
    loop {
        let next = select! {
            biased;
            err = call.aborted() => return Err(err),
            () = expired(call.deadline()) => return Err(call.deadline_exceeded()),
            next = requests.next() => next,
        };
        let Some(message) = next else {
            call.close_send();
            return Ok(sent);
        };
        call.send(message).await?;
        sent += 1;
        trace!("Sent request #{sent} on {}", call.descriptor());
    }
}
