//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; lines are only interpreted once their
//! terminating newline has been seen, so a chunk boundary inside a line (or
//! inside a multi-byte character) is harmless. Lines end with `\n` or
//! `\r\n`.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the server did not set one.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    has_data: bool,
    last_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push(value.to_string());
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            // `retry` and unknown fields are ignored.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if !std::mem::take(&mut self.has_data) {
            return None;
        }
        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: participants\ndata: {\"count\":2}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "participants".to_string(),
                data: "{\"count\":2}".to_string(),
                id: None,
            }]
        );
    }

    #[test]
    fn survives_arbitrary_chunk_boundaries() {
        let raw = "event: new-message\r\ndata: {\"text\":\"h\u{e9}llo\"}\r\n\r\nevent: heartbeat\ndata: 2025-01-01T00:00:00.000Z\n\n";
        let bytes = raw.as_bytes();

        for split in 1..bytes.len() {
            let mut decoder = SseDecoder::new();
            let mut events = decoder.push(&bytes[..split]);
            events.extend(decoder.push(&bytes[split..]));
            assert_eq!(events.len(), 2, "split at {split}");
            assert_eq!(events[0].event, "new-message");
            assert_eq!(events[0].data, "{\"text\":\"h\u{e9}llo\"}");
            assert_eq!(events[1].event, "heartbeat");
        }
    }

    #[test]
    fn joins_multi_line_data_and_skips_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\ndata: first\ndata:second\nid: 7\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: heartbeat\n\n").is_empty());
        // The dangling event name must not leak into the next event.
        let events = decoder.push(b"data: x\n\n");
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn incomplete_event_waits_for_blank_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: participants\ndata: {}\n").is_empty());
        assert_eq!(decoder.push(b"\n").len(), 1);
    }
}
