use std::pin::Pin;
use std::task::{Context, Poll, ready};

use agent_bridge_model::{Error, LogConfig};
use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::extract::{extract_content, extract_protocol_version};
use crate::io::{Chunks, Line, Lines, LinesError, Sse};

enum Decoder {
    /// Line-delimited JSON records.
    Ndjson {
        lines: Lines,
        // Whether any fragment has been produced by this response. Decides
        // whether unparsable trailing data is surfaced as plain text.
        has_content: bool,
    },
    /// Server-sent events from the agent server.
    GraphAgent { sse: Sse, version_logged: bool },
    /// A body that has been fully read and decoded up front.
    Buffered(Option<String>),
}

struct DecodeState {
    decoder: Decoder,
    log: LogConfig,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFragment = Result<(Option<String>, DecodeState), Error>;

pin_project! {
    /// A stream of plain assistant text decoded from one backend response.
    ///
    /// Fragments are yielded in the order they were decoded. The stream
    /// ends after the first error.
    pub struct ResponseStream {
        next_fragment_fut: Option<PinnedFuture<NextFragment>>,
    }
}

impl ResponseStream {
    /// Decodes line-delimited JSON records.
    #[inline]
    pub fn ndjson(chunks: Chunks, log: LogConfig) -> Self {
        Self::with_decoder(
            Decoder::Ndjson {
                lines: Lines::new(chunks),
                has_content: false,
            },
            log,
        )
    }

    /// Decodes agent server events.
    #[inline]
    pub fn graph_agent(chunks: Chunks, log: LogConfig) -> Self {
        Self::with_decoder(
            Decoder::GraphAgent {
                sse: Sse::new(Lines::new(chunks)),
                version_logged: false,
            },
            log,
        )
    }

    /// Yields a single already-decoded text, or nothing.
    #[inline]
    pub fn buffered(content: Option<String>) -> Self {
        let content = content.filter(|c| !c.is_empty());
        Self::with_decoder(Decoder::Buffered(content), LogConfig::default())
    }

    fn with_decoder(decoder: Decoder, log: LogConfig) -> Self {
        let state = DecodeState { decoder, log };
        let next_fragment_fut = async move { next_fragment(state).await };
        Self {
            next_fragment_fut: Some(Box::pin(next_fragment_fut)),
        }
    }
}

impl Stream for ResponseStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let Some(next_fragment_fut) = this.next_fragment_fut else {
            return Poll::Ready(None);
        };
        let (fragment, state) =
            match ready!(next_fragment_fut.as_mut().poll(cx)) {
                Ok((Some(fragment), state)) => (fragment, state),
                Ok((None, _)) => {
                    *this.next_fragment_fut = None;
                    return Poll::Ready(None);
                }
                Err(err) => {
                    *this.next_fragment_fut = None;
                    return Poll::Ready(Some(Err(err)));
                }
            };

        // More fragments may follow, create a new future for the next one.
        let next_fragment_fut = async move { next_fragment(state).await };
        *this.next_fragment_fut = Some(Box::pin(next_fragment_fut));

        Poll::Ready(Some(Ok(Bytes::from(fragment))))
    }
}

async fn next_fragment(mut state: DecodeState) -> NextFragment {
    let log = state.log;
    let fragment = match &mut state.decoder {
        Decoder::Ndjson { lines, has_content } => {
            next_ndjson_fragment(lines, has_content, log).await?
        }
        Decoder::GraphAgent {
            sse,
            version_logged,
        } => next_graph_agent_fragment(sse, version_logged, log).await?,
        Decoder::Buffered(content) => content.take(),
    };
    Ok((fragment, state))
}

async fn next_ndjson_fragment(
    lines: &mut Lines,
    has_content: &mut bool,
    log: LogConfig,
) -> Result<Option<String>, Error> {
    loop {
        let line = match lines.next_line().await.map_err(body_error)? {
            Some(Line::Complete(line)) => line,
            Some(Line::Trailing(rest)) => {
                return Ok(trailing_fragment(rest, has_content));
            }
            None => return Ok(None),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if log.verbose {
            debug!("ndjson frame: {line}");
        }

        let value = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(err) => {
                warn!("skipping malformed ndjson line: {err}");
                continue;
            }
        };
        if let Some(content) = extract_content(&value) {
            *has_content = true;
            return Ok(Some(content));
        }
    }
}

/// Handles data left without a line terminator at the end of the body.
fn trailing_fragment(rest: String, has_content: &mut bool) -> Option<String> {
    if rest.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(rest.trim()) {
        Ok(value) => {
            let content = extract_content(&value);
            *has_content |= content.is_some();
            content
        }
        Err(_) if !*has_content => {
            // Some backends answer with a single plain body instead of
            // records. Only trusted when nothing else has been decoded.
            debug!("treating unparsable body as plain text");
            *has_content = true;
            Some(rest)
        }
        Err(err) => {
            warn!("discarding malformed trailing data: {err}");
            None
        }
    }
}

async fn next_graph_agent_fragment(
    sse: &mut Sse,
    version_logged: &mut bool,
    log: LogConfig,
) -> Result<Option<String>, Error> {
    loop {
        let Some(event) = sse.next_event().await.map_err(body_error)? else {
            return Ok(None);
        };
        if log.verbose {
            debug!(event = %event.event, "sse frame: {}", event.data);
        }

        if is_content_event(&event.event) {
            let value = match serde_json::from_str::<Value>(&event.data) {
                Ok(value) => value,
                Err(err) => {
                    warn!("skipping malformed `{}` event: {err}", event.event);
                    continue;
                }
            };
            if let Some(content) = extract_content(&value) {
                return Ok(Some(content));
            }
            continue;
        }

        if event.event == "error" {
            warn!("agent server reported an error: {}", event.data);
        }
        if *version_logged {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
            continue;
        };
        if let Some(version) = extract_protocol_version(&value) {
            debug!("agent server protocol version: {version}");
            *version_logged = true;
        }
    }
}

/// Matches `messages` and the namespaced `messages|<subgraph>` events.
#[inline]
fn is_content_event(name: &str) -> bool {
    name == "messages" || name.starts_with("messages|")
}

fn body_error(err: LinesError) -> Error {
    match err {
        LinesError::ChunksError(err) => {
            Error::connection(format!("response body interrupted: {}", err.0))
        }
        LinesError::InvalidUtf8 => {
            Error::protocol("response body is not valid UTF-8")
        }
    }
}

#[cfg(test)]
mod tests {
    use agent_bridge_model::ErrorKind;
    use futures_util::StreamExt;

    use super::*;

    async fn collect(mut stream: ResponseStream) -> Result<Vec<String>, Error> {
        let mut fragments = vec![];
        while let Some(item) = stream.next().await {
            let bytes = item?;
            fragments.push(String::from_utf8(bytes.to_vec()).unwrap());
        }
        Ok(fragments)
    }

    fn ndjson(chunks: &[&str]) -> ResponseStream {
        let chunks = chunks.iter().map(|c| c.as_bytes().to_vec());
        ResponseStream::ndjson(
            Chunks::from_chunks(chunks.collect::<Vec<_>>()),
            LogConfig::default(),
        )
    }

    fn graph_agent(chunks: &[&str]) -> ResponseStream {
        let chunks = chunks.iter().map(|c| c.as_bytes().to_vec());
        ResponseStream::graph_agent(
            Chunks::from_chunks(chunks.collect::<Vec<_>>()),
            LogConfig::verbose(),
        )
    }

    #[tokio::test]
    async fn test_record_split_across_chunks() {
        let stream = ndjson(&[
            r#"{"type":"item","content":"Hel"#,
            "lo\"}\n{\"type\":\"item\",\"content\":\" world\"}\n",
        ]);
        let fragments = collect(stream).await.unwrap();
        assert_eq!(fragments, ["Hello", " world"]);
        assert_eq!(fragments.concat(), "Hello world");
    }

    #[tokio::test]
    async fn test_chunking_invariance() {
        let body = concat!(
            "{\"type\":\"begin\"}\n",
            "{\"type\":\"item\",\"content\":\"Grüße \"}\n",
            "not json\n",
            "{\"type\":\"item\",\"content\":\"from \"}\n",
            "\n",
            "{\"output\":\"the\"}\n",
            "{\"type\":\"item\",\"content\":\" bridge\"}",
        );
        let expected = ["Grüße ", "from ", "the", " bridge"];

        let bytes = body.as_bytes();
        for size in 1..=bytes.len() {
            let chunks: Vec<Vec<u8>> =
                bytes.chunks(size).map(<[u8]>::to_vec).collect();
            let stream = ResponseStream::ndjson(
                Chunks::from_chunks(chunks),
                LogConfig::default(),
            );
            let fragments = collect(stream).await.unwrap();
            assert_eq!(fragments, expected, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn test_plain_body_fallback() {
        let stream = ndjson(&["Sorry, ", "I can't help with that."]);
        let fragments = collect(stream).await.unwrap();
        assert_eq!(fragments, ["Sorry, I can't help with that."]);
    }

    #[tokio::test]
    async fn test_no_fallback_after_content() {
        let stream =
            ndjson(&["{\"type\":\"item\",\"content\":\"a\"}\n", "garbage"]);
        let fragments = collect(stream).await.unwrap();
        assert_eq!(fragments, ["a"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let stream = ResponseStream::ndjson(
            Chunks::from_chunks([b"\xff\n".to_vec()]),
            LogConfig::default(),
        );
        let err = collect(stream).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_only_message_events_yield() {
        let stream = graph_agent(&[
            "event: messages|foo\n",
            "data: [{\"type\":\"AIMessageChunk\",\"content\":\"hi\"},{}]\n\n",
            "event: updates\n",
            "data: [{\"content\":\"ignored\"}]\n\n",
        ]);
        let fragments = collect(stream).await.unwrap();
        assert_eq!(fragments, ["hi"]);
    }

    #[tokio::test]
    async fn test_graph_agent_stream() {
        let stream = graph_agent(&[
            "event: metadata\ndata: {\"run_id\":\"r\",\"version\":\"1\"}\n\n",
            "event: messages\ndata: [{\"type\":\"AIMessageChunk\",",
            "\"content\":\"Hel\"},{}]\n\nevent: messages\n",
            "data: not-json\n\n",
            "event: messages\ndata: [{\"type\":\"AIMessageChunk\",",
            "\"content\":\"lo\"},{}]\nid: 3\n\n",
            "event: end\ndata: null\n\n",
        ]);
        let fragments = collect(stream).await.unwrap();
        assert_eq!(fragments.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_buffered() {
        let fragments = collect(ResponseStream::buffered(Some("hi".to_owned())))
            .await
            .unwrap();
        assert_eq!(fragments, ["hi"]);

        let fragments = collect(ResponseStream::buffered(Some(String::new())))
            .await
            .unwrap();
        assert!(fragments.is_empty());
    }
}
