use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

/// Incremental parser for `text/event-stream` bodies.
///
/// Both providers stream `data: <json>` blocks separated by a blank line.
/// Gemini terminates lines with `\r\n`, so carriage returns are dropped
/// before splitting.
#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.extend(chunk.chars().filter(|c| *c != '\r'));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }

        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        // Lines starting with ':' are keep-alive comments
        if line.starts_with(':') {
            continue;
        }
        if let Some(val) = line.strip_prefix("event:") {
            event_type = Some(val.trim_start().to_string());
        } else if let Some(val) = line.strip_prefix("data:") {
            data_lines.push(val.strip_prefix(' ').unwrap_or(val));
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event_type,
        data: data_lines.join("\n"),
    })
}

/// Adapts a reqwest byte stream into a stream of SSE events.
pub struct SseStream<S> {
    inner: S,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    carry: Vec<u8>,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            carry: Vec::new(),
        }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    // A multi-byte character may straddle two chunks
                    this.carry.extend_from_slice(&bytes);
                    let valid = match std::str::from_utf8(&this.carry) {
                        Ok(_) => this.carry.len(),
                        Err(e) => e.valid_up_to(),
                    };
                    let text = String::from_utf8_lossy(&this.carry[..valid]).into_owned();
                    this.carry.drain(..valid);
                    this.pending.extend(this.parser.feed(&text));
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "SSE byte stream failed");
                    return Poll::Ready(None);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
