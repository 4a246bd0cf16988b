//! Event feed decoding
//!
//! Raw frames arrive over SSE and are decoded into a closed set of
//! [`StreamEvent`]s before the session controller sees them.

mod frame;
pub mod sse;

pub use frame::{decode, RawFrame, StreamEvent, MALFORMED_FRAME};

use crate::error::ChatError;
use futures::stream::Stream;
use std::pin::Pin;

/// Sequence of raw frames produced by an open feed
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<RawFrame, ChatError>> + Send>>;
