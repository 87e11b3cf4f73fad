//! Server-sent event re-framing.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures_util::StreamExt;

use super::client::{LlmError, LlmResult};

/// Stream of framed `data: <json>\n\n` events.
pub type SseByteStream = BoxStream<'static, LlmResult<Bytes>>;

/// End-of-stream marker sent by OpenAI-compatible APIs.
const DONE_MARKER: &str = "[DONE]";

/// Turn one SSE line into a framed event.
///
/// Returns `None` for comments, other fields, empty payloads, the `[DONE]`
/// marker and payloads that are not JSON.
pub fn sse_data_event(line: &[u8]) -> Option<Bytes> {
    let line = std::str::from_utf8(line).ok()?;
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();

    if data.is_empty() || data == DONE_MARKER {
        return None;
    }
    if let Err(e) = serde_json::from_str::<serde::de::IgnoredAny>(data) {
        tracing::warn!("Skipping non-JSON completion chunk: {}", e);
        return None;
    }
    Some(Bytes::from(format!("data: {data}\n\n")))
}

struct Reframer<S> {
    upstream: S,
    buffer: Vec<u8>,
    pending: VecDeque<Bytes>,
    finished: bool,
}

impl<S> Reframer<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = sse_data_event(&line) {
                self.pending.push_back(event);
            }
        }
    }
}

/// Re-frame an upstream SSE byte stream, one event per completion chunk.
///
/// Upstream chunk boundaries need not align with lines.
pub fn reframe_sse<S, E>(upstream: S) -> SseByteStream
where
    S: futures_util::Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
{
    let state = Reframer {
        upstream,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Network(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    state.buffer.push(b'\n');
                    state.drain_lines();
                }
            }
        }
    })
    .boxed()
}
