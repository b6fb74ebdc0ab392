//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only the parts of the format the client relies on are interpreted: `event:` names,
//! `data:` payloads (multi-line joined with `\n`) and blank-line dispatch. `id:`, `retry:`
//! and comment lines are consumed and dropped. An event still pending when the stream ends
//! is discarded.

use thiserror::Error;

pub const DEFAULT_MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Name of the event the server sends on every (re)established stream.
pub const CONNECTED_EVENT: &str = "connected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Unnamed events (and the explicit default name `message`) carry JSON payloads.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }

    pub fn is_connected(&self) -> bool {
        self.event.as_deref() == Some(CONNECTED_EVENT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("buffer exceeds max size without line break: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("event data exceeds max size: {size} > {max}")]
    OversizedEvent { size: usize, max: usize },
}

#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub events: Vec<SseEvent>,
    pub errors: Vec<FrameError>,
}

pub struct SseDecoder {
    max_buffer_bytes: usize,
    pending: Vec<u8>,
    event: Option<String>,
    data: String,
    has_data: bool,
}

impl SseDecoder {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            max_buffer_bytes,
            pending: Vec::new(),
            event: None,
            data: String::new(),
            has_data: false,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport {
        let mut report = DecodeReport::default();
        if !chunk.is_empty() {
            self.pending.extend_from_slice(chunk);
        }

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            self.process_line(&line, &mut report);
        }

        if self.pending.len() > self.max_buffer_bytes {
            report.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_buffer_bytes,
            });
            self.pending.clear();
            self.reset_event();
        }

        report
    }

    fn process_line(&mut self, line: &[u8], report: &mut DecodeReport) {
        if line.is_empty() {
            self.dispatch(report);
            return;
        }
        if line[0] == b':' {
            return;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
                if self.data.len() > self.max_buffer_bytes {
                    report.errors.push(FrameError::OversizedEvent {
                        size: self.data.len(),
                        max: self.max_buffer_bytes,
                    });
                    self.reset_event();
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, report: &mut DecodeReport) {
        if self.has_data {
            report.events.push(SseEvent {
                event: self.event.take().filter(|name| !name.is_empty()),
                data: std::mem::take(&mut self.data),
            });
        }
        self.reset_event();
    }

    fn reset_event(&mut self) {
        self.event = None;
        self.data.clear();
        self.has_data = false;
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_and_unnamed_events() {
        let mut decoder = SseDecoder::default();
        let report =
            decoder.push_chunk(b"event: connected\ndata: {}\n\ndata: {\"type\":\"snapshot\"}\n\n");

        assert!(report.errors.is_empty());
        assert_eq!(report.events.len(), 2);
        assert!(report.events[0].is_connected());
        assert!(!report.events[0].is_message());
        assert!(report.events[1].is_message());
        assert_eq!(report.events[1].data, "{\"type\":\"snapshot\"}");
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let first = decoder.push_chunk(b"data: {\"type\":");
        assert!(first.events.is_empty());
        let second = decoder.push_chunk(b"\"diff\"}\r\n\r\n");
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].data, "{\"type\":\"diff\"}");
    }

    #[test]
    fn joins_multi_line_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let report = decoder.push_chunk(b": keepalive\nid: 7\ndata: line one\ndata:line two\n\n");
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].data, "line one\nline two");
        assert_eq!(report.events[0].event, None);
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::default();
        let report = decoder.push_chunk(b"\n\nevent: ping\n\n");
        assert!(report.events.is_empty());
    }

    #[test]
    fn oversized_buffer_is_reported_and_decoder_recovers() {
        let mut decoder = SseDecoder::new(64);
        let report = decoder.push_chunk(&[b'x'; 100]);
        assert!(matches!(
            report.errors.as_slice(),
            [FrameError::OversizedBuffer { size: 100, max: 64 }]
        ));

        let report = decoder.push_chunk(b"\ndata: ok\n\n");
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].data, "ok");
    }
}
