//! Capture and classification pipeline.
//!
//! # Overview
//!
//! The [`Interceptor`] sits on the interception side: it taps response
//! bodies, rewrites outgoing headers and emits [`LifecycleEvent`]s over an
//! unbounded channel. The [`Dispatcher`] sits on the consumer side: it queues
//! those events, correlates them into [`RequestRecord`]s and hands batched row
//! changes to a [`RowSink`].
//!
//! The two sides share no mutable state. Settings travel as immutable
//! snapshots through `watch` channels.

pub mod buffer;
pub mod correlator;
pub mod dispatcher;
pub mod event;
pub mod interceptor;
pub mod session;

pub use buffer::{CaptureBuffer, TappedStream};
pub use correlator::{Applied, Correlator, RequestRecord, RequestState, RowUpdate};
pub use dispatcher::{DEFAULT_DRAIN_DELAY, Dispatcher, RowSink};
pub use event::{BodyCapture, Header, LifecycleEvent, RequestId, RequestInfo, SENTINEL_TAB, TabId};
pub use interceptor::{ControlMessage, ControlReply, Interceptor};
pub use session::SessionToken;
