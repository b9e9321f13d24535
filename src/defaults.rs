//! Default configuration constants for capscribe.
//!
//! Shared by the config types, the protocol codec, and the pipelines so the
//! wire format and the on-disk naming stay consistent everywhere.

use std::time::Duration;

/// Audio sample rate in Hz. All audio on the wire is mono at this rate.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per sample on the wire (f32 little-endian).
pub const BYTES_PER_SAMPLE: usize = 4;

/// Seconds of audio carried by one upload message.
pub const UPLOAD_WINDOW_SECS: usize = 60;

/// Bytes of audio carried by one upload message.
pub const UPLOAD_WINDOW_BYTES: usize = SAMPLE_RATE as usize * BYTES_PER_SAMPLE * UPLOAD_WINDOW_SECS;

/// Default server address.
pub const SERVER_ADDR: &str = "127.0.0.1";

/// Default server port.
pub const SERVER_PORT: u16 = 6016;

/// WebSocket sub-protocol negotiated by client and server.
pub const SUBPROTOCOL: &str = "binary";

/// Connection attempts before reporting a connection failure.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Upper bound for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between failed connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Heartbeat ping period.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);

/// How long to wait for any frame (pong included) after a ping.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the per-connection outbound message queue.
pub const OUTBOUND_QUEUE: usize = 1024;

/// Receive bound for one task's terminal result (two hours).
pub const RECV_STALL_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Server-side segmentation window for file sources, in seconds.
pub const FILE_SEG_DURATION: f64 = 25.0;

/// Server-side segmentation overlap for file sources, in seconds.
pub const FILE_SEG_OVERLAP: f64 = 2.0;

/// Server-side segmentation window for live (mic) sources, in seconds.
pub const MIC_SEG_DURATION: f64 = 15.0;

/// Server-side segmentation overlap for live (mic) sources, in seconds.
pub const MIC_SEG_OVERLAP: f64 = 2.0;

/// Upper bound accepted for a task's `seg_duration` and `seg_overlap`, in seconds.
pub const MAX_SEGMENT_SECS: f64 = 3600.0;

/// Media longer than this is split into chunks, in seconds.
pub const SPLIT_DURATION_SECS: f64 = 600.0;

/// A trailing remainder must exceed this many seconds to become its own chunk.
///
/// Remainders at or below it are dropped. Behaviour for remainders within
/// floating-point noise of this value is whatever `f64` comparison yields.
pub const MIN_REMAINDER_SECS: f64 = 0.1;

/// Infix between the media stem and the chunk index.
pub const SPLIT_SUFFIX: &str = "_split_";

/// Suffix of the single-chunk extraction file.
pub const TEMP_AUDIO_SUFFIX: &str = "_temp_audio.wav";

/// Extension of chunk audio produced by the splitter.
pub const CHUNK_AUDIO_EXTENSION: &str = "wav";

/// Extensions of every per-stem artifact that cleanup removes.
pub const INTERMEDIATE_SUFFIXES: [&str; 5] = [".wav", ".txt", ".srt", ".json", ".merge.txt"];

/// Placeholders substituted into the extraction command template.
pub const INPUT_PLACEHOLDER: &str = "{input_file}";
pub const OUTPUT_PLACEHOLDER: &str = "{output_file}";

/// Default extraction command: any media in, 16 kHz mono PCM WAV out.
pub fn extract_command_template() -> Vec<String> {
    [
        "ffmpeg",
        "-y",
        "-i",
        INPUT_PLACEHOLDER,
        "-vn",
        "-acodec",
        "pcm_s16le",
        "-ar",
        "16000",
        "-ac",
        "1",
        OUTPUT_PLACEHOLDER,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Inbound task queue capacity on the server.
pub const TASK_QUEUE: usize = 256;

/// Dispatcher poll timeout; bounds shutdown latency.
pub const DISPATCH_POLL: Duration = Duration::from_secs(1);

/// Trailing time given to the last token of a subtitle line, in seconds.
pub const TOKEN_TAIL_SECS: f64 = 0.3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_window_is_sixty_seconds_of_f32() {
        assert_eq!(UPLOAD_WINDOW_BYTES, 16000 * 4 * 60);
    }

    #[test]
    fn extract_template_has_both_placeholders() {
        let template = extract_command_template();
        assert!(template.iter().any(|p| p == INPUT_PLACEHOLDER));
        assert!(template.iter().any(|p| p == OUTPUT_PLACEHOLDER));
    }
}
