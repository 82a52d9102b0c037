//! Decoding of `data:` lines from an SSE byte stream.
//!
//! OpenAI-compatible streaming completions arrive as:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: [DONE]
//! ```
//! Network chunks do not respect line boundaries, so bytes are buffered until a
//! full line is available.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

/// Turns a byte stream into a stream of SSE `data:` payloads.
///
/// Stops at the `[DONE]` marker or when the byte stream ends. A trailing line
/// without a newline is still emitted. Errors from the byte stream are passed
/// through and end the stream.
pub fn data_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, mut ended)| async move {
            loop {
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim();

                    if let Some(data) = parse_sse_line(line) {
                        if is_done_marker(data) {
                            return None;
                        }
                        let data = data.to_string();
                        return Some((Ok(data), (byte_stream, buffer, ended)));
                    }
                }

                if ended {
                    if buffer.is_empty() {
                        return None;
                    }
                    let raw = std::mem::take(&mut buffer);
                    let line = String::from_utf8_lossy(&raw);
                    return match parse_sse_line(line.trim()) {
                        Some(data) if !is_done_marker(data) => {
                            let data = data.to_string();
                            Some((Ok(data), (byte_stream, buffer, ended)))
                        }
                        _ => None,
                    };
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        ended = true;
                        buffer.clear();
                        return Some((Err(e), (byte_stream, buffer, ended)));
                    }
                    None => ended = true,
                }
            }
        },
    )
}

/// Parses an SSE line to extract the data portion.
///
/// # Example
/// ```
/// use llm_relay::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("event: ping"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|s| s.trim())
}

/// Checks whether an SSE data payload is the end-of-stream marker.
pub fn is_done_marker(data: &str) -> bool {
    data == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let items: Vec<Result<Bytes, String>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(items)
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(parse_sse_line("data:hello"), Some("hello"));
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("invalid"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker(""));
        assert!(!is_done_marker("{\"key\": \"value\"}"));
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let lines: Vec<_> = data_lines(chunks(&["data: {\"a\"", ":1}\n\nda", "ta: two\n\n"]))
            .collect()
            .await;
        assert_eq!(lines, vec![Ok("{\"a\":1}".to_string()), Ok("two".to_string())]);
    }

    #[tokio::test]
    async fn test_stops_at_done_marker() {
        let lines: Vec<_> = data_lines(chunks(&["data: one\n\ndata: [DONE]\n\ndata: late\n\n"]))
            .collect()
            .await;
        assert_eq!(lines, vec![Ok("one".to_string())]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let lines: Vec<_> = data_lines(chunks(&[": comment\nevent: x\ndata: tail"]))
            .collect()
            .await;
        assert_eq!(lines, vec![Ok("tail".to_string())]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let items: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: first\n")),
            Err("reset".to_string()),
            Ok(Bytes::from_static(b"data: never\n")),
        ];
        let lines: Vec<_> = data_lines(stream::iter(items)).collect().await;
        assert_eq!(lines, vec![Ok("first".to_string()), Err("reset".to_string())]);
    }
}
