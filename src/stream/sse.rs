//! Server-Sent Events parsing for the chat feed
//!
//! Each `data:` line carries one JSON frame (`{"event": ..., "data": ...}`).
//! Other SSE fields (`event:`, `id:`, `retry:`) and comment lines are ignored.

use super::{FrameStream, RawFrame};
use crate::error::ChatError;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;

/// Accumulates byte chunks and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_index) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Take whatever trailing bytes remain once the source is exhausted.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if matches!(line.last(), Some(b'\r')) {
            line.pop();
        }
        Some(line)
    }
}

/// Parse one SSE line into a frame.
///
/// Returns `None` for lines that carry no frame. A `data:` line whose
/// payload is not a valid frame yields a protocol error.
pub fn parse_line(line: &[u8]) -> Option<Result<RawFrame, ChatError>> {
    let payload = line.strip_prefix(b"data:")?;
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);
    if payload.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    Some(serde_json::from_slice::<RawFrame>(payload).map_err(|e| {
        tracing::warn!(error = %e, "Unparseable frame line");
        ChatError::protocol(format!("unparseable frame: {e}"))
    }))
}

struct FrameState<S> {
    bytes: S,
    lines: LineBuffer,
    pending: VecDeque<Result<RawFrame, ChatError>>,
    exhausted: bool,
}

impl<S> FrameState<S> {
    fn enqueue(&mut self, line: &[u8]) {
        if let Some(frame) = parse_line(line) {
            self.pending.push_back(frame);
        }
    }
}

/// Adapt a byte stream (e.g. `reqwest::Response::bytes_stream`) into frames.
///
/// A read error is yielded once and ends the stream.
pub fn frame_stream<S, B, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = FrameState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(chunk.as_ref()) {
                        state.enqueue(&line);
                    }
                }
                Some(Err(error)) => {
                    state.exhausted = true;
                    state.pending.push_back(Err(error.into()));
                }
                None => {
                    state.exhausted = true;
                    if let Some(line) = state.lines.finish() {
                        state.enqueue(&line);
                    }
                }
            }
        }
    }))
}
