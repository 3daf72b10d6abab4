//! Server-Sent Events (SSE) processing for streamed completions.
//!
//! OpenAI-compatible endpoints send data-only events: each event is one or more `data:` lines
//! followed by a blank line, and the stream ends with `data: [DONE]`.  This module turns the raw
//! byte stream of such a response into a stream of [`ChatCompletionChunk`]s.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// Sentinel payload that terminates the stream.
const DONE: &str = "[DONE]";

/// One decoded SSE event.
#[derive(Debug, PartialEq)]
enum Frame {
    /// The joined `data:` payload.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Comments, keep-alives and events without data.
    Skip,
}

/// Where the decoder is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Reading events.
    Reading,
    /// The body ended before `[DONE]`; the truncation error is still owed.
    Truncated,
    /// Nothing more will be yielded.
    Finished,
}

/// Process a stream of bytes into a stream of completion chunks.
///
/// The returned stream ends cleanly only at the `[DONE]` sentinel.  A body that ends before the
/// sentinel yields one `Streaming` error after any final event.  A transport error or an `error`
/// object sent by the endpoint is yielded once and then ends the stream.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, Phase::Reading),
        move |(mut stream, mut buffer, phase)| async move {
            match phase {
                Phase::Finished => return None,
                Phase::Truncated => {
                    STREAM_ERRORS.click();
                    let err = Error::streaming("stream ended before [DONE]", None);
                    return Some((Err(err), (stream, buffer, Phase::Finished)));
                }
                Phase::Reading => {}
            }
            loop {
                // First check if we have a complete event in the buffer
                match extract_frame(&mut buffer) {
                    Some(Ok(Frame::Done)) => return None,
                    Some(Ok(Frame::Skip)) => continue,
                    Some(Ok(Frame::Data(data))) => {
                        let chunk = decode_chunk(&data);
                        let next = if chunk.is_err() {
                            Phase::Finished
                        } else {
                            Phase::Reading
                        };
                        return Some((chunk, (stream, buffer, next)));
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, Phase::Finished)));
                    }
                    None => {}
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        // CRLF line endings are folded into LF.
                        buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, Phase::Finished)));
                    }
                    None => {
                        // End of body; a final event may lack its blank line.
                        let rest = std::mem::take(&mut buffer);
                        let frame = match std::str::from_utf8(&rest) {
                            Ok(text) => parse_frame(text),
                            Err(e) => {
                                STREAM_ERRORS.click();
                                return Some((Err(e.into()), (stream, buffer, Phase::Finished)));
                            }
                        };
                        return match frame {
                            Frame::Done => None,
                            Frame::Data(data) => {
                                let chunk = decode_chunk(&data);
                                let next = if chunk.is_err() {
                                    Phase::Finished
                                } else {
                                    Phase::Truncated
                                };
                                Some((chunk, (stream, buffer, next)))
                            }
                            Frame::Skip => {
                                STREAM_ERRORS.click();
                                let err = Error::streaming("stream ended before [DONE]", None);
                                Some((Err(err), (stream, buffer, Phase::Finished)))
                            }
                        };
                    }
                }
            }
        },
    )
}

/// Remove one complete event from the front of `buffer`, if there is one.
fn extract_frame(buffer: &mut Vec<u8>) -> Option<Result<Frame>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..end + 2).collect();
    match std::str::from_utf8(&event[..end]) {
        Ok(text) => Some(Ok(parse_frame(text))),
        Err(e) => Some(Err(Error::encoding(
            format!("Invalid UTF-8 in stream: {e}"),
            Some(Box::new(e)),
        ))),
    }
}

/// Collect the `data:` lines of one event.
///
/// Other fields (`event:`, `id:`, `retry:`) carry nothing the relay needs and are dropped.
fn parse_frame(event_text: &str) -> Frame {
    let mut data: Vec<&str> = Vec::new();
    for line in event_text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    if data.is_empty() {
        return Frame::Skip;
    }
    let data = data.join("\n");
    if data.trim() == DONE {
        Frame::Done
    } else {
        Frame::Data(data)
    }
}

/// Parse one event payload.
fn decode_chunk(data: &str) -> Result<ChatCompletionChunk> {
    STREAM_EVENTS.click();
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        STREAM_ERRORS.click();
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if let Some(error) = value.get("error") {
        STREAM_ERRORS.click();
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(Error::streaming(
            format!("endpoint reported an error: {message}"),
            None,
        ));
    }
    serde_json::from_value(value).map_err(|e| {
        STREAM_ERRORS.click();
        Error::serialization(
            format!("Failed to parse completion chunk: {e}"),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn collect(parts: Vec<&'static [u8]>) -> Vec<Result<ChatCompletionChunk>> {
        let stream = Box::pin(stream::iter(
            parts.into_iter().map(|p| Ok(Bytes::from_static(p))),
        ));
        process_sse(stream).collect().await
    }

    #[tokio::test]
    async fn parse_chunks_until_done() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let stream = Box::pin(stream::once(async move { Ok(Bytes::from(body)) }));
        let fragments: Vec<String> = process_sse(stream)
            .map(|c| c.unwrap().fragment().to_string())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn nothing_after_done() {
        let body = format!("data: [DONE]\n\n{}", chunk("late"));
        let stream = Box::pin(stream::once(async move { Ok(Bytes::from(body)) }));
        let events: Vec<_> = process_sse(stream).collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn handle_split_event() {
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":"[..],
            &b"{\"content\":\"hi\"}}]}\n"[..],
            &b"\ndata: [DONE]\n\n"[..],
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "hi");
    }

    #[tokio::test]
    async fn handle_split_utf8() {
        // "é" is 0xC3 0xA9; split it across two reads.
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3"[..],
            &b"\xA9\"}}]}\n\n"[..],
            &b"data: [DONE]\n\n"[..],
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "café");
    }

    #[tokio::test]
    async fn crlf_and_comments() {
        let events = collect(vec![
            &b": keep-alive\r\n\r\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n"[..],
            &b"data: [DONE]\r\n\r\n"[..],
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "x");
    }

    #[tokio::test]
    async fn trailing_done_without_blank_line() {
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}\n\n"[..],
            &b"data: [DONE]"[..],
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "end");
    }

    #[tokio::test]
    async fn body_cut_before_done_is_an_error() {
        let events = collect(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"The answer is\"}}]}\n\n"[..],
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "The answer is");
        let err = events[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("before [DONE]"));
    }

    #[tokio::test]
    async fn trailing_event_then_cut_is_an_error() {
        let events = collect(vec![&b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}"[..]]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().fragment(), "end");
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let events = collect(vec![]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn handle_malformed_event() {
        let events = collect(vec![&b"data: {not json\n\n"[..], &b"data: [DONE]\n\n"[..]]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn error_object_ends_stream() {
        let events = collect(vec![
            &b"data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n"[..],
        ])
        .await;
        assert_eq!(events.len(), 1);
        let err = events[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn frame_parsing() {
        assert_eq!(parse_frame("event: message\ndata: {}"), Frame::Data("{}".to_string()));
        assert_eq!(parse_frame("data:[DONE]"), Frame::Done);
        assert_eq!(parse_frame(": ping"), Frame::Skip);
        assert_eq!(
            parse_frame("data: a\ndata: b"),
            Frame::Data("a\nb".to_string())
        );
    }
}
