//! In-process transport.
//!
//! Every [`MemoryConnector::open`] spawns the connector's handler with the
//! remote half of the call ([`MemoryServer`]), so tests can script a remote
//! that answers, interleaves, fails or stays silent. Each call records how
//! often it was aborted and closed in [`TransportStats`].

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::{
    call::{CallDescriptor, Deadline},
    error::{StatusError, StatusKind},
    transport::{Connector, Transport},
};

type Inbound<Res> = Result<Res, StatusError>;
type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Handler<Req, Res> =
    Arc<dyn Fn(CallDescriptor, MemoryServer<Req, Res>) -> HandlerFuture + Send + Sync>;

/// Counters shared by both halves of a memory call.
#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicUsize,
    half_closed: AtomicBool,
    aborts: AtomicUsize,
    closes: AtomicUsize,
    abort_kind: Mutex<Option<StatusKind>>,
    remote_outcome: Mutex<Option<Result<(), StatusError>>>,
}

impl TransportStats {
    /// Messages accepted by `send`.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }

    pub fn half_closed(&self) -> bool {
        self.half_closed.load(Ordering::Acquire)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::Acquire)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }

    /// Kind passed to the first `abort`.
    pub fn abort_kind(&self) -> Option<StatusKind> {
        self.abort_kind.lock().ok().and_then(|kind| *kind)
    }

    fn aborted(&self) -> bool {
        self.aborts() > 0
    }

    /// How the remote ended the call, once it did.
    fn remote_outcome(&self) -> Option<Result<(), StatusError>> {
        self.remote_outcome
            .lock()
            .ok()
            .and_then(|outcome| outcome.clone())
    }

    fn set_remote_outcome(&self, outcome: Result<(), StatusError>) {
        if let Ok(mut slot) = self.remote_outcome.lock() {
            slot.get_or_insert(outcome);
        }
    }
}

/// Client half of an in-process call.
pub struct MemoryTransport<Req, Res> {
    outbound: Mutex<Option<mpsc::UnboundedSender<Req>>>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Inbound<Res>>>,
    stats: Arc<TransportStats>,
}

/// Remote half of an in-process call.
pub struct MemoryServer<Req, Res> {
    requests: mpsc::UnboundedReceiver<Req>,
    responses: mpsc::UnboundedSender<Inbound<Res>>,
    stats: Arc<TransportStats>,
}

/// Creates both halves of one call.
pub fn pair<Req, Res>() -> (MemoryTransport<Req, Res>, MemoryServer<Req, Res>) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let stats = Arc::new(TransportStats::default());
    let transport = MemoryTransport {
        outbound: Mutex::new(Some(request_tx)),
        inbound: AsyncMutex::new(response_rx),
        stats: Arc::clone(&stats),
    };
    let server = MemoryServer {
        requests: request_rx,
        responses: response_tx,
        stats,
    };
    (transport, server)
}

impl<Req, Res> MemoryTransport<Req, Res> {
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    fn drop_outbound(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }
}

#[tonic::async_trait]
impl<Req, Res> Transport for MemoryTransport<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type Request = Req;
    type Response = Res;

    async fn send(&self, message: Req) -> Result<(), StatusError> {
        if self.stats.aborted() {
            return Err(StatusError::invalid_state("send on an aborted transport"));
        }
        let outbound = self
            .outbound
            .lock()
            .map_err(|_| StatusError::unknown("outbound lock poisoned"))?;
        let Some(tx) = outbound.as_ref() else {
            return Err(StatusError::invalid_state("send after half-close"));
        };
        if tx.send(message).is_err() {
            // the remote is gone; how it ended decides what the caller sees
            return match self.stats.remote_outcome() {
                Some(Err(status)) => Err(status),
                Some(Ok(())) => Ok(()),
                None => Err(StatusError::unavailable("remote stopped reading requests")),
            };
        }
        self.stats.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close_send(&self) {
        self.stats.half_closed.store(true, Ordering::Release);
        self.drop_outbound();
    }

    async fn receive(&self) -> Result<Option<Res>, StatusError> {
        if self.stats.aborted() {
            return Err(StatusError::invalid_state("receive on an aborted transport"));
        }
        match self.inbound.lock().await.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    fn abort(&self, kind: StatusKind) {
        if self.stats.aborts.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Ok(mut abort_kind) = self.stats.abort_kind.lock() {
                *abort_kind = Some(kind);
            }
        }
        self.drop_outbound();
        if let Ok(mut inbound) = self.inbound.try_lock() {
            inbound.close();
        }
    }

    fn close(&self) {
        self.stats.closes.fetch_add(1, Ordering::AcqRel);
        self.drop_outbound();
    }
}

impl<Req, Res> MemoryServer<Req, Res> {
    /// Next request from the client; `None` once the client half-closed or went away.
    pub async fn recv(&mut self) -> Option<Req> {
        self.requests.recv().await
    }

    /// Sends a response. Returns `false` if the client is gone.
    pub fn send(&self, response: Res) -> bool {
        self.responses.send(Ok(response)).is_ok()
    }

    /// Terminates the call with `err`.
    pub fn fail(self, err: StatusError) {
        self.stats.set_remote_outcome(Err(err.clone()));
        let _ = self.responses.send(Err(err));
    }

    /// Ends the response stream normally.
    pub fn finish(self) {}

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }
}

impl<Req, Res> Drop for MemoryServer<Req, Res> {
    fn drop(&mut self) {
        self.stats.set_remote_outcome(Ok(()));
    }
}

/// Connector whose every call is served by an in-process handler.
pub struct MemoryConnector<Req, Res> {
    handler: Option<Handler<Req, Res>>,
    calls: Arc<Mutex<Vec<Arc<TransportStats>>>>,
}

impl<Req, Res> Clone for MemoryConnector<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<Req, Res> MemoryConnector<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(CallDescriptor, MemoryServer<Req, Res>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<Req, Res> =
            Arc::new(move |call, server| -> HandlerFuture { Box::pin(handler(call, server)) });
        Self {
            handler: Some(handler),
            calls: Arc::default(),
        }
    }

    /// A connector whose endpoint cannot be reached.
    pub fn unreachable() -> Self {
        Self {
            handler: None,
            calls: Arc::default(),
        }
    }

    /// Number of calls opened so far.
    pub fn calls(&self) -> usize {
        self.calls.lock().map_or(0, |calls| calls.len())
    }

    /// Stats of the most recently opened call.
    pub fn last_call(&self) -> Option<Arc<TransportStats>> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.last().cloned())
    }
}

#[tonic::async_trait]
impl<Req, Res> Connector<Req, Res> for MemoryConnector<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type Transport = MemoryTransport<Req, Res>;

    async fn open(
        &self,
        call: &CallDescriptor,
        _deadline: Option<Deadline>,
    ) -> Result<MemoryTransport<Req, Res>, StatusError> {
        let Some(handler) = &self.handler else {
            return Err(StatusError::unavailable(format!(
                "no in-process endpoint serves {}",
                call.path()
            )));
        };
        let (transport, server) = pair();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(transport.stats());
        }
        tokio::spawn(handler(call.clone(), server));
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_and_responses_flow() {
        let (transport, mut server) = pair::<u32, String>();

        transport.send(1).await.unwrap();
        transport.send(2).await.unwrap();
        transport.close_send();
        assert_eq!(server.recv().await, Some(1));
        assert_eq!(server.recv().await, Some(2));
        assert_eq!(server.recv().await, None);

        assert!(server.send("three".into()));
        server.finish();
        assert_eq!(transport.receive().await.unwrap(), Some("three".into()));
        assert_eq!(transport.receive().await.unwrap(), None);
        assert_eq!(transport.stats().sent(), 2);
        assert!(transport.stats().half_closed());
    }

    #[tokio::test]
    async fn test_send_after_half_close_is_invalid_state() {
        let (transport, _server) = pair::<u32, u32>();
        transport.close_send();
        transport.close_send();
        let err = transport.send(1).await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidState);
    }

    #[tokio::test]
    async fn test_remote_failure_is_delivered() {
        let (transport, server) = pair::<u32, u32>();
        server.fail(StatusError::invalid_argument("negative"));
        let err = transport.receive().await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_send_after_remote_failure_reports_its_status() {
        let (transport, server) = pair::<u32, u32>();
        server.fail(StatusError::invalid_argument("negative"));
        let err = transport.send(1).await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
        assert_eq!(transport.stats().sent(), 0);
    }

    #[tokio::test]
    async fn test_send_after_remote_finished_is_dropped() {
        let (transport, server) = pair::<u32, u32>();
        server.finish();
        transport.send(1).await.unwrap();
        assert_eq!(transport.stats().sent(), 0);
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_abort_and_close_are_counted() {
        let (transport, mut server) = pair::<u32, u32>();
        transport.abort(StatusKind::DeadlineExceeded);
        transport.abort(StatusKind::Cancelled);
        transport.close();
        transport.close();

        let stats = server.stats();
        assert_eq!(stats.aborts(), 2);
        assert_eq!(stats.abort_kind(), Some(StatusKind::DeadlineExceeded));
        assert_eq!(stats.closes(), 2);
        assert_eq!(server.recv().await, None);
        assert_eq!(
            transport.send(1).await.unwrap_err().kind(),
            StatusKind::InvalidState
        );
    }

    #[tokio::test]
    async fn test_unreachable_connector() {
        let connector = MemoryConnector::<u32, u32>::unreachable();
        let call = CallDescriptor::unary("/test.Service/Method");
        let err = connector.open(&call, None).await.err().unwrap();
        assert_eq!(err.kind(), StatusKind::Unavailable);
        assert_eq!(connector.calls(), 0);
    }
}
