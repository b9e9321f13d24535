//! Framing of raw audio into upload messages, and decoding of server replies.

use super::message::{ClientMessage, ServerMessage, Source};
use crate::defaults;
use crate::error::{CapscribeError, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as the wire's `time_start`/`time_frame`.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Per-task fields repeated on every upload message.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskHeader {
    pub task_id: String,
    pub seg_duration: f64,
    pub seg_overlap: f64,
    pub source: Source,
    pub time_start: f64,
}

impl TaskHeader {
    /// Header for a fresh task with a random id, started now.
    pub fn new(seg_duration: f64, seg_overlap: f64, source: Source) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            seg_duration,
            seg_overlap,
            source,
            time_start: now_secs(),
        }
    }

    /// Wrap one slice of raw f32le audio into a message of this task.
    pub fn encode_segment(&self, pcm: &[u8], is_final: bool) -> ClientMessage {
        ClientMessage {
            task_id: self.task_id.clone(),
            seg_duration: self.seg_duration,
            seg_overlap: self.seg_overlap,
            is_final,
            time_start: self.time_start,
            time_frame: now_secs(),
            source: self.source,
            data: BASE64.encode(pcm),
        }
    }
}

/// Iterator over fixed-size slices of a buffer, flagging the last one.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    data: &'a [u8],
    window: usize,
    offset: usize,
    done: bool,
}

impl<'a> Iterator for Windows<'a> {
    type Item = (&'a [u8], bool);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = (self.offset + self.window).min(self.data.len());
        let slice = &self.data[self.offset..end];
        let is_final = end >= self.data.len();
        self.offset = end;
        self.done = is_final;
        Some((slice, is_final))
    }
}

/// Split `data` into `window`-byte slices; exactly the last one is final.
///
/// Empty input yields a single empty final slice so the server still sees a
/// terminating message.
pub fn split_windows(data: &[u8], window: usize) -> Windows<'_> {
    Windows {
        data,
        window: window.max(1),
        offset: 0,
        done: false,
    }
}

/// Every upload message for `data`, in send order.
pub fn encode_upload<'a>(
    header: &'a TaskHeader,
    data: &'a [u8],
) -> impl Iterator<Item = ClientMessage> + 'a {
    split_windows(data, defaults::UPLOAD_WINDOW_BYTES)
        .map(move |(slice, is_final)| header.encode_segment(slice, is_final))
}

/// Parse one server frame.
pub fn decode_message(bytes: &[u8]) -> Result<ServerMessage> {
    serde_json::from_slice(bytes).map_err(|e| CapscribeError::Protocol {
        message: format!("Malformed server message: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TaskHeader {
        TaskHeader::new(25.0, 2.0, Source::File)
    }

    #[test]
    fn test_windows_mark_only_last_final() {
        let data: Vec<u8> = (0..10).collect();
        let slices: Vec<_> = split_windows(&data, 4).collect();

        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0], (&data[0..4], false));
        assert_eq!(slices[1], (&data[4..8], false));
        assert_eq!(slices[2], (&data[8..10], true));
    }

    #[test]
    fn test_windows_exact_multiple_has_no_empty_tail() {
        let data = [0u8; 8];
        let finals: Vec<bool> = split_windows(&data, 4).map(|(_, f)| f).collect();
        assert_eq!(finals, vec![false, true]);
    }

    #[test]
    fn test_windows_empty_input_yields_one_final() {
        let slices: Vec<_> = split_windows(&[], 4).collect();
        assert_eq!(slices.len(), 1);
        assert!(slices[0].0.is_empty());
        assert!(slices[0].1);
    }

    #[test]
    fn test_upload_payloads_reassemble_input() {
        let header = header();
        let data: Vec<u8> = (0..(defaults::UPLOAD_WINDOW_BYTES * 2 + 100))
            .map(|i| (i % 251) as u8)
            .collect();

        let messages: Vec<_> = encode_upload(&header, &data).collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages.iter().filter(|m| m.is_final).count(), 1);
        assert!(messages.last().unwrap().is_final);

        let mut joined = Vec::new();
        for message in &messages {
            assert_eq!(message.task_id, header.task_id);
            assert_eq!(message.seg_duration, 25.0);
            assert_eq!(message.seg_overlap, 2.0);
            joined.extend(message.payload().unwrap());
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn test_upload_of_exact_window_multiple_ends_on_a_full_window() {
        let header = header();
        let data = vec![7u8; defaults::UPLOAD_WINDOW_BYTES * 2];

        let messages: Vec<_> = encode_upload(&header, &data).collect();
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].is_final);
        assert!(messages[1].is_final);
        assert_eq!(
            messages[1].payload().unwrap().len(),
            defaults::UPLOAD_WINDOW_BYTES
        );
        let joined: Vec<u8> = messages
            .iter()
            .flat_map(|m| m.payload().unwrap())
            .collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_empty_upload_is_one_final_message() {
        let header = header();
        let messages: Vec<_> = encode_upload(&header, &[]).collect();

        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_final);
        assert_eq!(messages[0].task_id, header.task_id);
        assert!(messages[0].payload().unwrap().is_empty());
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(header().task_id, header().task_id);
    }

    #[test]
    fn test_decode_progress_message() {
        let message = decode_message(br#"{"task_id":"a","duration":60.0,"is_final":false}"#).unwrap();
        assert_eq!(message.task_id, "a");
        assert_eq!(message.duration, 60.0);
        assert!(!message.is_final);
        assert!(message.text.is_none());
    }

    #[test]
    fn test_decode_terminal_message() {
        let raw = br#"{"task_id":"a","duration":3.0,"is_final":true,"text":"hi",
            "tokens":["hi"],"timestamps":[0.5],"time_start":1.0,"time_complete":2.0}"#;
        let result = decode_message(raw).unwrap().into_result().unwrap();
        assert_eq!(result.text, "hi");
        assert_eq!(result.timestamps, vec![0.5]);
    }

    #[test]
    fn test_decode_garbage_is_protocol_error() {
        assert!(matches!(
            decode_message(b"not json"),
            Err(CapscribeError::Protocol { .. })
        ));
    }
}
