use std::{fmt, time::Duration};

use tokio::time::{sleep_until, Instant};

use crate::error::StatusError;

/// The four interaction patterns a remote method can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ServerStream,
    ClientStream,
    BidiStream,
}

impl CallShape {
    /// Whether the caller sends a sequence of requests.
    #[must_use]
    pub fn streams_requests(self) -> bool {
        matches!(self, Self::ClientStream | Self::BidiStream)
    }

    /// Whether the remote answers with a sequence of responses.
    #[must_use]
    pub fn streams_responses(self) -> bool {
        matches!(self, Self::ServerStream | Self::BidiStream)
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unary => "unary",
            Self::ServerStream => "server-streaming",
            Self::ClientStream => "client-streaming",
            Self::BidiStream => "bidirectional-streaming",
        };
        f.write_str(name)
    }
}

/// Identifies a remote method (its full `/package.Service/Method` path) and its shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    path: &'static str,
    shape: CallShape,
}

impl CallDescriptor {
    #[must_use]
    pub const fn new(path: &'static str, shape: CallShape) -> Self {
        Self { path, shape }
    }

    #[must_use]
    pub const fn unary(path: &'static str) -> Self {
        Self::new(path, CallShape::Unary)
    }

    #[must_use]
    pub const fn server_stream(path: &'static str) -> Self {
        Self::new(path, CallShape::ServerStream)
    }

    #[must_use]
    pub const fn client_stream(path: &'static str) -> Self {
        Self::new(path, CallShape::ClientStream)
    }

    #[must_use]
    pub const fn bidi_stream(path: &'static str) -> Self {
        Self::new(path, CallShape::BidiStream)
    }

    #[must_use]
    pub const fn path(&self) -> &'static str {
        self.path
    }

    #[must_use]
    pub const fn shape(&self) -> CallShape {
        self.shape
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.shape)
    }
}

/// Absolute point in time after which an in-flight call is abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    #[must_use]
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left until expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Resolves when `deadline` passes; never resolves without one.
pub(crate) async fn expired(deadline: Option<Deadline>) {
    match deadline {
        Some(deadline) => sleep_until(deadline.instant()).await,
        None => std::future::pending().await,
    }
}

/// Request side of a generic [`invoke`](crate::executor::CallExecutor::invoke).
#[derive(Clone, Debug, PartialEq)]
pub enum CallInput<Req> {
    Single(Req),
    Sequence(Vec<Req>),
}

/// Successful payload of a call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutput<Res> {
    Single(Res),
    Sequence(Vec<Res>),
}

impl<Res> CallOutput<Res> {
    /// Returns the single response, if this is one.
    pub fn single(self) -> Option<Res> {
        match self {
            Self::Single(response) => Some(response),
            Self::Sequence(_) => None,
        }
    }

    /// Returns the responses as a sequence; a single response becomes a one-element sequence.
    pub fn into_vec(self) -> Vec<Res> {
        match self {
            Self::Single(response) => vec![response],
            Self::Sequence(responses) => responses,
        }
    }
}

pub type CallResult<Res> = Result<CallOutput<Res>, StatusError>;
