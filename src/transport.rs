//! Transport seam between the call executor and whatever carries the messages.
//!
//! A [`Connector`] opens one [`Transport`] per call attempt. The transport is an
//! ordered, reliable channel with independent request and response directions.

pub mod grpc;
pub mod memory;

use crate::{
    call::{CallDescriptor, Deadline},
    error::{StatusError, StatusKind},
};

/// One in-flight call on the wire.
///
/// `receive` must be cancel-safe: the executor races it against deadlines and
/// cancellation and may drop the future before it completes.
#[tonic::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Sends one message. Fails with [`StatusKind::InvalidState`] after half-close or abort.
    ///
    /// Once the remote has ended the call, a failed remote yields its status and
    /// after a normal end the message is dropped, leaving the outcome to `receive`.
    async fn send(&self, message: Self::Request) -> Result<(), StatusError>;

    /// Half-closes the request direction. Idempotent.
    fn close_send(&self);

    /// Waits for the next response. `Ok(None)` is the remote's normal end-of-stream.
    async fn receive(&self) -> Result<Option<Self::Response>, StatusError>;

    /// Forcibly terminates the call. Safe to call more than once.
    fn abort(&self, kind: StatusKind);

    /// Releases the call's resources. Safe to call more than once.
    fn close(&self);
}

/// Opens transports towards one endpoint.
#[tonic::async_trait]
pub trait Connector<Req, Res>: Send + Sync {
    type Transport: Transport<Request = Req, Response = Res>;

    async fn open(
        &self,
        call: &CallDescriptor,
        deadline: Option<Deadline>,
    ) -> Result<Self::Transport, StatusError>;
}
