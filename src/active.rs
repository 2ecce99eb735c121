use tokio::{select, sync::watch};

use crate::{
    call::{expired, CallDescriptor, Deadline},
    error::StatusError,
    transport::Transport,
};

#[derive(Clone, Debug)]
enum Phase {
    Open,
    Finished,
    Failed(StatusError),
}

/// Lifecycle of one call over one transport.
///
/// The call leaves `Open` exactly once, either through [`finish`](Self::finish)
/// or through [`abort`](Self::abort). That transition is the only place the
/// transport is aborted and closed, so both happen at most once whoever gets
/// there first: the deadline, a caller cancel, a failing direction or `Drop`.
pub(crate) struct ActiveCall<T: Transport> {
    call: CallDescriptor,
    transport: T,
    deadline: Option<Deadline>,
    phase: watch::Sender<Phase>,
}

impl<T: Transport> ActiveCall<T> {
    pub(crate) fn new(call: CallDescriptor, transport: T, deadline: Option<Deadline>) -> Self {
        let (phase, _) = watch::channel(Phase::Open);
        Self {
            call,
            transport,
            deadline,
            phase,
        }
    }

    pub(crate) fn descriptor(&self) -> &CallDescriptor {
        &self.call
    }

    pub(crate) fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(*self.phase.borrow(), Phase::Open)
    }

    /// `None` while open, otherwise how the call ended.
    pub(crate) fn outcome(&self) -> Option<Result<(), StatusError>> {
        match &*self.phase.borrow() {
            Phase::Open => None,
            Phase::Finished => Some(Ok(())),
            Phase::Failed(err) => Some(Err(err.clone())),
        }
    }

    /// Fails the call with `err` unless it already ended, and returns the
    /// error the call actually ended with.
    pub(crate) fn abort(&self, err: StatusError) -> StatusError {
        let mut fired = false;
        self.phase.send_if_modified(|phase| {
            if matches!(phase, Phase::Open) {
                *phase = Phase::Failed(err.clone());
                fired = true;
            }
            fired
        });
        if fired {
            debug!("Aborting call {}: {err}", self.call);
            self.transport.abort(err.kind());
            self.transport.close();
        }
        match self.outcome() {
            Some(Err(actual)) => actual,
            _ => err,
        }
    }

    /// Ends the call successfully unless it already ended.
    pub(crate) fn finish(&self) {
        let fired = self.phase.send_if_modified(|phase| {
            if matches!(phase, Phase::Open) {
                *phase = Phase::Finished;
                true
            } else {
                false
            }
        });
        if fired {
            debug!("Call {} completed, closing transport", self.call);
            self.transport.close();
        }
    }

    pub(crate) fn cancel(&self) {
        if !self.is_terminal() {
            info!("Cancelling call {}", self.call);
        }
        self.abort(StatusError::cancelled(format!(
            "call {} cancelled by the caller",
            self.call.path()
        )));
    }

    pub(crate) fn deadline_exceeded(&self) -> StatusError {
        warn!("Deadline exceeded for call {}", self.call);
        self.abort(StatusError::deadline_exceeded(format!(
            "deadline exceeded for call {}",
            self.call.path()
        )))
    }

    /// Resolves with the failure once the call has been aborted.
    pub(crate) async fn aborted(&self) -> StatusError {
        let mut rx = self.phase.subscribe();
        let failure = match rx.wait_for(|phase| matches!(phase, Phase::Failed(_))).await {
            Ok(phase) => match &*phase {
                Phase::Failed(err) => Some(err.clone()),
                _ => None,
            },
            Err(_) => None,
        };
        match failure {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Next response, raced against cancellation and the deadline. Once the
    /// call is terminal this keeps returning its outcome.
    pub(crate) async fn receive(&self) -> Result<Option<T::Response>, StatusError> {
        if let Some(outcome) = self.outcome() {
            return outcome.map(|()| None);
        }
        select! {
            biased;
            err = self.aborted() => Err(err),
            () = expired(self.deadline) => Err(self.deadline_exceeded()),
            received = self.transport.receive() => received.map_err(|err| self.abort(err)),
        }
    }

    /// Sends one request, raced against cancellation and the deadline.
    pub(crate) async fn send(&self, message: T::Request) -> Result<(), StatusError> {
        self.ensure_open()?;
        select! {
            biased;
            err = self.aborted() => Err(err),
            () = expired(self.deadline) => Err(self.deadline_exceeded()),
            sent = self.transport.send(message) => sent.map_err(|err| self.abort(err)),
        }
    }

    /// Like [`send`](Self::send), but for calls whose single response is only
    /// legal after half-close: anything arriving on the response direction
    /// first fails the call and stops further requests.
    pub(crate) async fn send_before_half_close(
        &self,
        message: T::Request,
    ) -> Result<(), StatusError> {
        self.ensure_open()?;
        select! {
            biased;
            err = self.aborted() => Err(err),
            () = expired(self.deadline) => Err(self.deadline_exceeded()),
            err = self.premature_response() => Err(err),
            sent = self.transport.send(message) => sent.map_err(|err| self.abort(err)),
        }
    }

    /// Resolves once anything shows up on the response direction before
    /// half-close, and fails the call with it.
    pub(crate) async fn premature_response(&self) -> StatusError {
        let err = match self.transport.receive().await {
            Ok(Some(_)) => StatusError::unknown(format!(
                "{} responded before the request stream was half-closed",
                self.call.path()
            )),
            Ok(None) => StatusError::unknown(format!(
                "{} ended the call before the request stream was half-closed",
                self.call.path()
            )),
            Err(err) => err,
        };
        self.abort(err)
    }

    /// Fails the call if a response is already waiting, without waiting for one.
    pub(crate) async fn ensure_no_premature_response(&self) -> Result<(), StatusError> {
        self.ensure_open()?;
        select! {
            biased;
            err = self.premature_response() => Err(err),
            () = std::future::ready(()) => Ok(()),
        }
    }

    pub(crate) fn close_send(&self) {
        debug!("Half-closing call {}", self.call);
        self.transport.close_send();
    }

    /// Receives the one response a unary or client-streaming call must yield,
    /// then the end of the stream.
    pub(crate) async fn single_response(&self) -> Result<T::Response, StatusError> {
        let Some(response) = self.receive().await? else {
            return Err(self.abort(StatusError::unknown(format!(
                "{} completed without a response",
                self.call.path()
            ))));
        };
        match self.receive().await? {
            None => {
                self.finish();
                Ok(response)
            }
            Some(_) => Err(self.abort(StatusError::unknown(format!(
                "{} sent more than one response",
                self.call.path()
            )))),
        }
    }

    fn ensure_open(&self) -> Result<(), StatusError> {
        match self.outcome() {
            None => Ok(()),
            Some(Ok(())) => Err(StatusError::invalid_state(format!(
                "call {} has already completed",
                self.call.path()
            ))),
            Some(Err(err)) => Err(err),
        }
    }
}

impl<T: Transport> Drop for ActiveCall<T> {
    fn drop(&mut self) {
        if !self.is_terminal() {
            self.abort(StatusError::cancelled(format!(
                "call {} dropped before completion",
                self.call.path()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{error::StatusKind, transport::memory};

    fn active<Req: Send + 'static, Res: Send + 'static>(
        deadline: Option<Deadline>,
    ) -> (
        ActiveCall<memory::MemoryTransport<Req, Res>>,
        memory::MemoryServer<Req, Res>,
    ) {
        let (transport, server) = memory::pair();
        let call = CallDescriptor::unary("/test.Service/Method");
        (ActiveCall::new(call, transport, deadline), server)
    }

    #[tokio::test]
    async fn test_abort_fires_once() {
        let (call, server) = active::<u32, u32>(None);
        let stats = server.stats();

        let first = call.abort(StatusError::deadline_exceeded("late"));
        let second = call.abort(StatusError::cancelled("bye"));
        call.cancel();
        call.finish();

        assert_eq!(first.kind(), StatusKind::DeadlineExceeded);
        assert_eq!(second.kind(), StatusKind::DeadlineExceeded);
        assert_eq!(stats.aborts(), 1);
        assert_eq!(stats.abort_kind(), Some(StatusKind::DeadlineExceeded));
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_finish_closes_once_and_blocks_abort() {
        let (call, server) = active::<u32, u32>(None);
        let stats = server.stats();

        call.finish();
        call.finish();
        call.cancel();
        drop(call);

        assert_eq!(stats.closes(), 1);
        assert_eq!(stats.aborts(), 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_open_call() {
        let (call, server) = active::<u32, u32>(None);
        let stats = server.stats();
        drop(call);
        assert_eq!(stats.aborts(), 1);
        assert_eq!(stats.abort_kind(), Some(StatusKind::Cancelled));
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_receive_after_terminal_repeats_outcome() {
        let (call, server) = active::<u32, u32>(None);
        server.fail(StatusError::unavailable("connection reset"));

        let err = call.receive().await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::Unavailable);
        let again = call.receive().await.unwrap_err();
        assert_eq!(again, err);
        assert_eq!(call.send(1).await.unwrap_err(), err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_silence() {
        let (call, server) =
            active::<u32, u32>(Some(Deadline::after(Duration::from_millis(250))));
        let stats = server.stats();

        let err = call.receive().await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::DeadlineExceeded);
        assert_eq!(stats.aborts(), 1);

        // late arrivals are never delivered
        server.send(7);
        assert_eq!(
            call.receive().await.unwrap_err().kind(),
            StatusKind::DeadlineExceeded
        );
    }

    #[tokio::test]
    async fn test_aborted_wakes_waiters() {
        let (call, _server) = active::<u32, u32>(None);
        let call = std::sync::Arc::new(call);
        let waiter = {
            let call = std::sync::Arc::clone(&call);
            tokio::spawn(async move { call.aborted().await })
        };
        tokio::task::yield_now().await;
        call.cancel();
        let err = waiter.await.unwrap();
        assert_eq!(err.kind(), StatusKind::Cancelled);
    }
}
