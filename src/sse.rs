//! Event-Stream Parser
//!
//! Decodes a raw byte stream in the server-sent-event text protocol into
//! discrete `{event, data}` records. This module knows nothing about HTTP
//! or about what the records mean; [`crate::stream`] gives them types.
//!
//! # Protocol rules
//!
//! - Lines are terminated by `\n`; partial lines spanning chunk boundaries
//!   are buffered until terminated (bytes are buffered, so a multi-byte
//!   UTF-8 sequence split across chunks is never torn).
//! - `event:` sets the pending event type (default `message`).
//! - `data:` appends to the pending data buffer; multiple `data:` lines are
//!   joined with `\n`.
//! - A blank line dispatches the pending record and resets both fields.
//! - `id:`, `retry:` and comment (`:`) lines are recognized and ignored.
//! - Any other non-empty line is ignored with a diagnostic; the parser
//!   favors protocol tolerance over strictness.
//!
//! A `[DONE]` payload is delivered like any other data value; deciding what
//! it means is the caller's job.

use futures::{pin_mut, Stream, StreamExt};
use thiserror::Error;

/// One complete event-stream record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseRecord {
    /// Event type (`message` when the server never set one)
    pub event: String,
    /// Data payload; multiple `data:` lines joined with `\n`
    pub data: String,
}

/// Read failure from the underlying byte stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("event stream read failed: {0}")]
pub struct SseError(pub String);

/// Callbacks invoked by [`parse_sse`]
pub trait SseHandler {
    /// Called once per complete record, in stream order
    fn on_record(&mut self, record: SseRecord);

    /// Called when the underlying read fails or is aborted; the parse loop
    /// stops afterwards
    fn on_error(&mut self, error: SseError);

    /// Called exactly once when the stream ends normally
    fn on_close(&mut self);
}

/// Incremental parser state
///
/// Feed it byte chunks as they arrive; it returns the records completed by
/// each chunk. Chunk boundaries never affect the produced records.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Unterminated trailing bytes from previous chunks
    buffer: Vec<u8>,
    /// Pending event type, set by an `event:` line
    event: Option<String>,
    /// Pending data, accumulated from `data:` lines
    data: String,
}

impl SseParser {
    /// Create an empty parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of bytes, returning any records it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            if let Some(record) = self.take_line(line.trim()) {
                records.push(record);
            }
        }
        records
    }

    /// Signal end of input
    ///
    /// Any unterminated buffer content or undispatched record is dropped
    /// with a diagnostic, matching the protocol's requirement that only a
    /// blank line dispatches.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() || !self.data.is_empty() {
            tracing::warn!(
                buffered_bytes = self.buffer.len(),
                pending_data = self.data.len(),
                "event stream ended with unprocessed partial record"
            );
        }
        self.buffer.clear();
        self.event = None;
        self.data.clear();
    }

    /// Process one complete line, returning a record if it dispatched one
    fn take_line(&mut self, line: &str) -> Option<SseRecord> {
        if line.is_empty() {
            // Dispatch boundary. A record exists if we saw data, or an
            // explicit event type (so a data-less `event: end` still fires).
            if self.data.is_empty() && self.event.is_none() {
                return None;
            }
            let record = SseRecord {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data),
            };
            return Some(record);
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.trim());
        } else if line.starts_with("id:") || line.starts_with("retry:") || line.starts_with(':') {
            // Recognized fields we have no use for.
        } else {
            tracing::debug!(line = %line, "ignoring unsupported event-stream line");
        }
        None
    }
}

/// Drive a byte stream through the parser, delivering records to `handler`
///
/// Read failures are reported through [`SseHandler::on_error`] and never
/// escape this function; the caller's await always resolves normally.
pub async fn parse_sse<S, B, E, H>(stream: S, handler: &mut H)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    H: SseHandler,
{
    let mut parser = SseParser::new();
    pin_mut!(stream);

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                for record in parser.feed(chunk.as_ref()) {
                    handler.on_record(record);
                }
            }
            Some(Err(e)) => {
                handler.on_error(SseError(e.to_string()));
                return;
            }
            None => break,
        }
    }

    parser.finish();
    handler.on_close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Collector {
        records: Vec<SseRecord>,
        errors: Vec<SseError>,
        closed: u32,
    }

    impl SseHandler for Collector {
        fn on_record(&mut self, record: SseRecord) {
            self.records.push(record);
        }

        fn on_error(&mut self, error: SseError) {
            self.errors.push(error);
        }

        fn on_close(&mut self) {
            self.closed += 1;
        }
    }

    fn feed_all(parser: &mut SseParser, input: &str) -> Vec<SseRecord> {
        parser.feed(input.as_bytes())
    }

    #[test]
    fn test_single_record() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "event: chunk\ndata: {\"token\":\"hi\"}\n\n");
        assert_eq!(
            records,
            vec![SseRecord {
                event: "chunk".to_string(),
                data: "{\"token\":\"hi\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_default_event_type() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "data: hello\n\n");
        assert_eq!(records[0].event, "message");
        assert_eq!(records[0].data, "hello");
    }

    #[test]
    fn test_event_type_resets_after_dispatch() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "event: chunk\ndata: a\n\ndata: b\n\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "chunk");
        assert_eq!(records[1].event, "message");
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "data: line one\ndata: line two\n\n");
        assert_eq!(records[0].data, "line one\nline two");
    }

    #[test]
    fn test_partial_lines_across_chunks() {
        // The same record, split at every possible byte boundary, must
        // always produce identical output.
        let input = "event: chunk\ndata: {\"token\":\"In\"}\n\nevent: end\ndata: [DONE]\n\n";
        let expected = {
            let mut parser = SseParser::new();
            parser.feed(input.as_bytes())
        };
        assert_eq!(expected.len(), 2);

        for split in 1..input.len() {
            let mut parser = SseParser::new();
            let mut records = parser.feed(&input.as_bytes()[..split]);
            records.extend(parser.feed(&input.as_bytes()[split..]));
            assert_eq!(records, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_ignored_fields() {
        let mut parser = SseParser::new();
        let records = feed_all(
            &mut parser,
            ": keep-alive\nid: 42\nretry: 3000\ndata: payload\n\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, "payload");
    }

    #[test]
    fn test_unknown_line_ignored() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "garbage line\ndata: ok\n\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, "ok");
    }

    #[test]
    fn test_blank_lines_without_pending_record() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "\n\n\n");
        assert!(records.is_empty());
    }

    #[test]
    fn test_data_less_event_dispatches() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "event: end\n\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "end");
        assert_eq!(records[0].data, "");
    }

    #[test]
    fn test_done_sentinel_delivered_verbatim() {
        let mut parser = SseParser::new();
        let records = feed_all(&mut parser, "data: [DONE]\n\n");
        assert_eq!(records[0].data, "[DONE]");
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let input = "data: إحسان\n\n".as_bytes();
        // Split in the middle of a multi-byte sequence.
        let mut parser = SseParser::new();
        let mut records = parser.feed(&input[..9]);
        records.extend(parser.feed(&input[9..]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, "إحسان");
    }

    #[tokio::test]
    async fn test_parse_sse_normal_close() {
        let chunks: Vec<Result<&[u8], SseError>> = vec![
            Ok(b"event: chunk\ndata: a\n\n"),
            Ok(b"event: end\ndata: [DONE]\n\n"),
        ];
        let mut handler = Collector::default();
        parse_sse(futures::stream::iter(chunks), &mut handler).await;

        assert_eq!(handler.records.len(), 2);
        assert!(handler.errors.is_empty());
        assert_eq!(handler.closed, 1);
    }

    #[tokio::test]
    async fn test_parse_sse_read_error_via_callback() {
        let chunks: Vec<Result<&[u8], SseError>> = vec![
            Ok(b"event: chunk\ndata: a\n\n"),
            Err(SseError("connection reset".to_string())),
        ];
        let mut handler = Collector::default();
        parse_sse(futures::stream::iter(chunks), &mut handler).await;

        assert_eq!(handler.records.len(), 1);
        assert_eq!(handler.errors.len(), 1);
        assert!(handler.errors[0].to_string().contains("connection reset"));
        // No close after an error.
        assert_eq!(handler.closed, 0);
    }

    #[tokio::test]
    async fn test_parse_sse_trailing_partial_dropped() {
        let chunks: Vec<Result<&[u8], SseError>> = vec![Ok(b"data: never terminated")];
        let mut handler = Collector::default();
        parse_sse(futures::stream::iter(chunks), &mut handler).await;

        assert!(handler.records.is_empty());
        assert_eq!(handler.closed, 1);
    }
}
