//! Streaming inference relay.
//!
//! Opens a streaming POST against the local inference server, consumes its
//! newline-delimited JSON body, and forwards incremental text to the HTTP
//! client as it arrives. Along the way it:
//!
//! - emits a single space before any upstream work so the response headers
//!   flush immediately and the client sees the stream open;
//! - buffers partial NDJSON lines across byte chunks;
//! - skips lines that fail to parse and fragments with no text delta;
//! - repairs one specific malformed markdown pattern (a language tag with no
//!   opening fence) and closes the fence if generation ends inside it;
//! - emits a newline heartbeat whenever more than the configured interval
//!   passes without output, so intermediaries do not sever an idle-looking
//!   connection.
//!
//! Failures never surface as transport errors: the HTTP response always
//! completes successfully, with a single human-readable diagnostic line in
//! the body instead. No retries anywhere.
//!
//! One [`StreamSession`] exists per in-flight request; nothing is shared
//! between concurrent generations. When the client disconnects the generator
//! is dropped, which drops the upstream response and releases the connection.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::{Duration, Instant};

use crate::config::InferenceConfig;
use crate::models::InferenceFragment;

/// Sent before the first upstream byte to force header flush.
const HEADER_FLUSH: &[u8] = b" ";
/// Keep-alive filler.
const HEARTBEAT: &[u8] = b"\n";
/// The one malformed-fence pattern observed in model output.
const FENCE_MARKER: &str = "\npython\n";
const FENCE_OPEN: &str = "\n```python\n";
const FENCE_CLOSE: &str = "\n```\n";

/// Per-request relay state: whether a repaired code fence is still open, and
/// when the last byte went out (for heartbeat pacing).
struct StreamSession {
    fence_open: bool,
    last_emit: Instant,
}

enum LineAction {
    /// Nothing to emit; the keep-alive clock does not advance.
    Skip,
    Emit(String),
    /// The fragment carried the completion flag; the stream ends after the
    /// optional final delta.
    Finish(Option<String>),
}

impl StreamSession {
    fn new() -> Self {
        Self {
            fence_open: false,
            last_emit: Instant::now(),
        }
    }

    /// Decode one NDJSON line into a relay action.
    fn process_line(&mut self, line: &str) -> LineAction {
        let fragment: InferenceFragment = match serde_json::from_str(line) {
            Ok(f) => f,
            Err(_) => return LineAction::Skip,
        };

        let delta = fragment
            .response
            .filter(|text| !text.is_empty())
            .map(|text| self.repair_fence(text));

        if fragment.done {
            LineAction::Finish(delta)
        } else {
            match delta {
                Some(delta) => LineAction::Emit(delta),
                None => LineAction::Skip,
            }
        }
    }

    /// Rewrite the bare `python` language tag into a proper opening fence.
    ///
    /// Only this exact pattern is repaired; other language tags or spacing
    /// variants pass through untouched.
    fn repair_fence(&mut self, delta: String) -> String {
        if !self.fence_open && delta.contains(FENCE_MARKER) {
            self.fence_open = true;
            delta.replacen(FENCE_MARKER, FENCE_OPEN, 1)
        } else {
            delta
        }
    }
}

fn diagnostic(message: &str) -> Bytes {
    Bytes::from(format!("\n\n[docsmith] {}\n", message))
}

/// Relay one generation request as a byte stream suitable for an HTTP body.
///
/// The returned stream is infallible at the transport level: every failure
/// mode becomes an in-band diagnostic line followed by a clean end.
pub fn stream_generation(
    config: InferenceConfig,
    prompt: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let mut session = StreamSession::new();

        yield Ok(Bytes::from_static(HEADER_FLUSH));
        session.last_emit = Instant::now();

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("failed to build inference client: {}", e);
                yield Ok(diagnostic("internal error preparing the generation request."));
                return;
            }
        };

        let endpoint = format!("{}/api/generate", config.url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": config.model,
            "prompt": prompt,
            "stream": true,
        });

        let response = match client.post(&endpoint).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("inference connect failed: {}", e);
                yield Ok(diagnostic(
                    "model backend not responding. Ensure the inference server is running.",
                ));
                return;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("inference server returned {}", response.status());
            yield Ok(diagnostic(&format!(
                "inference server returned {}.",
                response.status()
            )));
            return;
        }

        let heartbeat = Duration::from_millis(config.heartbeat_ms);
        let mut upstream = std::pin::pin!(response.bytes_stream());
        let mut line_buf: Vec<u8> = Vec::new();
        let mut finished = false;

        'read: loop {
            // Two-source merge: next upstream chunk vs. heartbeat elapse.
            let chunk = match tokio::time::timeout(heartbeat, upstream.next()).await {
                Err(_) => {
                    if session.last_emit.elapsed() >= heartbeat {
                        yield Ok(Bytes::from_static(HEARTBEAT));
                        session.last_emit = Instant::now();
                    }
                    continue;
                }
                Ok(None) => break 'read,
                Ok(Some(Err(e))) => {
                    tracing::warn!("inference stream read failed: {}", e);
                    yield Ok(diagnostic(
                        "connection to the inference server was interrupted.",
                    ));
                    return;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            line_buf.extend_from_slice(&chunk);

            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = line_buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if session.last_emit.elapsed() >= heartbeat {
                    yield Ok(Bytes::from_static(HEARTBEAT));
                    session.last_emit = Instant::now();
                }

                match session.process_line(line) {
                    LineAction::Skip => {}
                    LineAction::Emit(delta) => {
                        yield Ok(Bytes::from(delta));
                        session.last_emit = Instant::now();
                    }
                    LineAction::Finish(delta) => {
                        if let Some(delta) = delta {
                            yield Ok(Bytes::from(delta));
                            session.last_emit = Instant::now();
                        }
                        finished = true;
                        break 'read;
                    }
                }
            }
        }

        // Upstream may end without a trailing newline on the final line.
        if !finished && !line_buf.is_empty() {
            let raw = std::mem::take(&mut line_buf);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                match session.process_line(line) {
                    LineAction::Emit(delta) | LineAction::Finish(Some(delta)) => {
                        yield Ok(Bytes::from(delta));
                    }
                    _ => {}
                }
            }
        }

        if session.fence_open {
            yield Ok(Bytes::from_static(FENCE_CLOSE.as_bytes()));
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> StreamSession {
        StreamSession::new()
    }

    #[test]
    fn text_delta_is_forwarded() {
        let mut session = make_session();
        let action = session.process_line(r#"{"response":"Hello","done":false}"#);
        assert!(matches!(action, LineAction::Emit(ref d) if d == "Hello"));
    }

    #[test]
    fn invalid_json_is_skipped() {
        let mut session = make_session();
        assert!(matches!(
            session.process_line("not valid json"),
            LineAction::Skip
        ));
    }

    #[test]
    fn fragment_without_delta_is_skipped() {
        let mut session = make_session();
        assert!(matches!(
            session.process_line(r#"{"model":"m","done":false}"#),
            LineAction::Skip
        ));
        assert!(matches!(
            session.process_line(r#"{"response":"","done":false}"#),
            LineAction::Skip
        ));
    }

    #[test]
    fn done_flag_finishes_the_stream() {
        let mut session = make_session();
        let action = session.process_line(r#"{"response":" world","done":true}"#);
        assert!(matches!(action, LineAction::Finish(Some(ref d)) if d == " world"));

        let action = session.process_line(r#"{"response":"","done":true}"#);
        assert!(matches!(action, LineAction::Finish(None)));
    }

    #[test]
    fn bare_python_tag_is_rewritten_to_a_fence() {
        let mut session = make_session();
        let action = session.process_line(r#"{"response":"Example:\npython\nx = 1","done":false}"#);
        match action {
            LineAction::Emit(delta) => {
                assert_eq!(delta, "Example:\n```python\nx = 1");
            }
            _ => panic!("expected Emit"),
        }
        assert!(session.fence_open);
    }

    #[test]
    fn fence_is_repaired_once_per_session() {
        let mut session = make_session();
        session.process_line(r#"{"response":"\npython\nx = 1","done":false}"#);
        // Second occurrence while the fence is open passes through untouched.
        let action = session.process_line(r#"{"response":"\npython\ny = 2","done":false}"#);
        match action {
            LineAction::Emit(delta) => assert_eq!(delta, "\npython\ny = 2"),
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn other_language_tags_pass_through() {
        let mut session = make_session();
        let action = session.process_line(r#"{"response":"\nrust\nfn f() {}","done":false}"#);
        match action {
            LineAction::Emit(delta) => assert_eq!(delta, "\nrust\nfn f() {}"),
            _ => panic!("expected Emit"),
        }
        assert!(!session.fence_open);
    }

    #[test]
    fn well_fenced_output_is_untouched() {
        let mut session = make_session();
        let action =
            session.process_line(r#"{"response":"```python\nx = 1\n```","done":false}"#);
        match action {
            LineAction::Emit(delta) => assert_eq!(delta, "```python\nx = 1\n```"),
            _ => panic!("expected Emit"),
        }
        assert!(!session.fence_open);
    }

    #[test]
    fn diagnostic_lines_are_distinct_from_content() {
        let bytes = diagnostic("inference server returned 503.");
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("\n\n[docsmith] "));
        assert!(text.ends_with('\n'));
    }
}
