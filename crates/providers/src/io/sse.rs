use super::{Line, Lines, LinesError};

/// A complete server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

struct PendingEvent {
    event: String,
    data: Vec<String>,
}

impl PendingEvent {
    #[inline]
    fn new(event: &str) -> Self {
        Self {
            event: event.to_owned(),
            data: vec![],
        }
    }

    #[inline]
    fn finish(self) -> SseEvent {
        SseEvent {
            event: self.event,
            data: self.data.join("\n"),
        }
    }
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the fields the agent server emits are understood. `data` lines
/// accumulate under the most recent `event` name. The event is complete
/// when the next `event` line starts, when an `id` line closes it, or when
/// the stream ends. Blank lines carry no structure.
pub struct Sse {
    lines: Lines,
    current: Option<PendingEvent>,
}

impl Sse {
    #[inline]
    pub fn new(lines: Lines) -> Self {
        Self {
            lines,
            current: None,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, LinesError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(self.current.take().map(PendingEvent::finish));
            };
            let line = Line::into_inner(line);
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = split_field(&line);
            match field {
                "event" => {
                    let prev = self.current.replace(PendingEvent::new(value));
                    if let Some(prev) = prev {
                        return Ok(Some(prev.finish()));
                    }
                }
                "data" => {
                    self.current
                        .get_or_insert_with(|| PendingEvent::new("message"))
                        .data
                        .push(value.to_owned());
                }
                "id" => {
                    if let Some(event) = self.current.take() {
                        return Ok(Some(event.finish()));
                    }
                }
                _ => trace!("ignoring sse field: {field}"),
            }
        }
    }
}

// field = 1*name-char [ colon [ space ] *any-char ]
#[inline]
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => {
            (field, value.strip_prefix(' ').unwrap_or(value))
        }
        None => (line, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Chunks;

    fn sse_from(chunks: &[&str]) -> Sse {
        let chunks = Chunks::from_chunks(
            chunks.iter().map(|c| c.as_bytes().to_vec()).collect::<Vec<_>>(),
        );
        Sse::new(Lines::new(chunks))
    }

    #[tokio::test]
    async fn test_events_split_by_event_lines() {
        let mut sse = sse_from(&[
            "event: metadata\ndata: {\"run_id\":\"1\"}\n\n",
            "event: messages\ndata: [1]\n\n",
        ]);
        let first = sse.next_event().await.unwrap().unwrap();
        assert_eq!(first.event, "metadata");
        assert_eq!(first.data, "{\"run_id\":\"1\"}");
        let second = sse.next_event().await.unwrap().unwrap();
        assert_eq!(second.event, "messages");
        assert_eq!(second.data, "[1]");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multiline_data_and_id() {
        let mut sse = sse_from(&[
            "event: messages\ndata: [\ndata:",
            " 2]\nid: 7\n\nevent: end\n",
        ]);
        let first = sse.next_event().await.unwrap().unwrap();
        assert_eq!(first.data, "[\n2]");
        let second = sse.next_event().await.unwrap().unwrap();
        assert_eq!(second.event, "end");
        assert_eq!(second.data, "");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_comments_and_unknown_fields() {
        let mut sse = sse_from(&[": ping\nretry: 10\nevent: x\ndata: y"]);
        let event = sse.next_event().await.unwrap().unwrap();
        assert_eq!(event, SseEvent {
            event: "x".to_owned(),
            data: "y".to_owned(),
        });
    }
}
