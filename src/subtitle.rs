//! SRT subtitles: model, parse, compose, and derivation from token timestamps.

use crate::defaults;
use crate::error::{CapscribeError, Result};

/// One numbered SRT cue. Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtitle {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Subtitle {
    /// Same cue moved later by `offset` seconds and renumbered.
    pub fn shifted(&self, offset: f64, index: usize) -> Self {
        Self {
            index,
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
        }
    }
}

/// Format seconds as `HH:MM:SS,mmm`.
pub fn format_timestamp(secs: f64) -> String {
    let millis = (secs.max(0.0) * 1000.0).round() as u64;
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis % 1000)
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted too).
pub fn parse_timestamp(value: &str) -> Result<f64> {
    let invalid = || CapscribeError::Subtitle {
        message: format!("invalid timestamp '{}'", value),
    };
    let (clock, millis) = value
        .trim()
        .split_once([',', '.'])
        .ok_or_else(invalid)?;
    let parts: Vec<&str> = clock.split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid());
    };
    let number = |s: &str| s.parse::<u64>().map_err(|_| invalid());
    let total_millis = number(hours)? * 3_600_000
        + number(minutes)? * 60_000
        + number(seconds)? * 1000
        + number(millis)?;
    Ok(total_millis as f64 / 1000.0)
}

/// Render cues as SRT text.
pub fn compose(subtitles: &[Subtitle]) -> String {
    let mut out = String::new();
    for sub in subtitles {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            sub.index,
            format_timestamp(sub.start),
            format_timestamp(sub.end),
            sub.text
        ));
    }
    out
}

/// Parse SRT text. Blank-line separated blocks; multi-line cue text is kept.
pub fn parse(content: &str) -> Result<Vec<Subtitle>> {
    let normalized = content.replace("\r\n", "\n");
    let mut subtitles = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().filter(|l| !l.trim().is_empty());
        let Some(index_line) = lines.next() else {
            continue;
        };
        let index = index_line
            .trim()
            .trim_start_matches('\u{feff}')
            .parse::<usize>()
            .map_err(|_| CapscribeError::Subtitle {
                message: format!("invalid cue number '{}'", index_line),
            })?;
        let timing = lines.next().ok_or_else(|| CapscribeError::Subtitle {
            message: format!("cue {} has no timing line", index),
        })?;
        let (start, end) = timing
            .split_once("-->")
            .ok_or_else(|| CapscribeError::Subtitle {
                message: format!("cue {} has malformed timing '{}'", index, timing),
            })?;
        let text = lines.collect::<Vec<_>>().join("\n");

        subtitles.push(Subtitle {
            index,
            start: parse_timestamp(start)?,
            end: parse_timestamp(end)?,
            text,
        });
    }
    Ok(subtitles)
}

fn spoken_chars(s: &str) -> usize {
    s.chars().filter(|c| c.is_alphanumeric()).count()
}

/// Derive one cue per text line from token timestamps.
///
/// Tokens are consumed in order until they cover as many letters and digits
/// as the line holds. A line starts at its first token and ends at its last
/// token plus a short tail. Without tokens the duration is shared out in
/// proportion to line length. Lines with nothing spoken are skipped.
pub fn from_lines(
    lines: &[String],
    tokens: &[String],
    timestamps: &[f64],
    duration: f64,
) -> Vec<Subtitle> {
    let spoken: Vec<(&String, usize)> = lines
        .iter()
        .map(|line| (line, spoken_chars(line)))
        .filter(|(_, n)| *n > 0)
        .collect();

    if tokens.is_empty() || tokens.len() != timestamps.len() {
        return proportional(&spoken, duration);
    }

    let mut subtitles = Vec::with_capacity(spoken.len());
    let mut next = 0usize;
    let mut last_end = 0.0f64;
    for (line, need) in spoken {
        if next >= tokens.len() {
            subtitles.push(Subtitle {
                index: subtitles.len() + 1,
                start: last_end,
                end: last_end.max(duration),
                text: line.trim().to_string(),
            });
            continue;
        }

        let first = next;
        let mut covered = 0usize;
        while next < tokens.len() && covered < need {
            covered += spoken_chars(&tokens[next]);
            next += 1;
        }
        let last = next.saturating_sub(1).max(first);
        let start = timestamps[first].max(last_end);
        let end = (timestamps[last] + defaults::TOKEN_TAIL_SECS).max(start);
        last_end = end;

        subtitles.push(Subtitle {
            index: subtitles.len() + 1,
            start,
            end,
            text: line.trim().to_string(),
        });
    }
    subtitles
}

fn proportional(spoken: &[(&String, usize)], duration: f64) -> Vec<Subtitle> {
    let total: usize = spoken.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return Vec::new();
    }
    let mut start = 0.0;
    spoken
        .iter()
        .enumerate()
        .map(|(i, (line, n))| {
            let end = start + duration * (*n as f64) / (total as f64);
            let sub = Subtitle {
                index: i + 1,
                start,
                end,
                text: line.trim().to_string(),
            };
            start = end;
            sub
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(3723.456), "01:02:03,456");
        assert_eq!(format_timestamp(-1.0), "00:00:00,000");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("01:02:03,456").unwrap(), 3723.456);
        assert_eq!(parse_timestamp(" 00:00:01.500 ").unwrap(), 1.5);
        assert!(parse_timestamp("1:2").is_err());
        assert!(parse_timestamp("aa:bb:cc,ddd").is_err());
    }

    #[test]
    fn test_compose_then_parse_preserves_cues() {
        let cues = vec![
            Subtitle {
                index: 1,
                start: 0.0,
                end: 1.5,
                text: "Hello there.".to_string(),
            },
            Subtitle {
                index: 2,
                start: 1.5,
                end: 4.25,
                text: "Second line\nwrapped".to_string(),
            },
        ];
        let srt = compose(&cues);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nHello there.\n\n"));
        assert_eq!(parse(&srt).unwrap(), cues);
    }

    #[test]
    fn test_parse_accepts_crlf_and_trailing_blank_lines() {
        let srt = "1\r\n00:00:01,000 --> 00:00:02,000\r\nhi\r\n\r\n\r\n";
        let cues = parse(srt).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "hi");
    }

    #[test]
    fn test_parse_rejects_missing_arrow() {
        assert!(parse("1\n00:00:01,000 00:00:02,000\nhi\n").is_err());
    }

    #[test]
    fn test_from_lines_follows_token_times() {
        let lines = strings(&["Hello world.", "How are you?"]);
        let tokens = strings(&["hello", "world", "how", "are", "you"]);
        let timestamps = vec![0.0, 0.5, 2.0, 2.4, 2.8];

        let subs = from_lines(&lines, &tokens, &timestamps, 4.0);
        assert_eq!(subs.len(), 2);
        assert_eq!((subs[0].index, subs[0].start), (1, 0.0));
        assert!((subs[0].end - (0.5 + defaults::TOKEN_TAIL_SECS)).abs() < 1e-9);
        assert_eq!((subs[1].index, subs[1].start), (2, 2.0));
        assert!((subs[1].end - (2.8 + defaults::TOKEN_TAIL_SECS)).abs() < 1e-9);
        assert_eq!(subs[1].text, "How are you?");
    }

    #[test]
    fn test_from_lines_cjk_tokens_are_characters() {
        let lines = strings(&["你好。", "世界。"]);
        let tokens = strings(&["你", "好", "世", "界"]);
        let timestamps = vec![0.0, 0.2, 1.0, 1.2];

        let subs = from_lines(&lines, &tokens, &timestamps, 2.0);
        assert_eq!(subs[0].start, 0.0);
        assert_eq!(subs[1].start, 1.0);
    }

    #[test]
    fn test_from_lines_without_tokens_shares_duration() {
        let lines = strings(&["aaaa", "bbbbbbbbbbbb"]);
        let subs = from_lines(&lines, &[], &[], 8.0);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].end, 2.0);
        assert_eq!(subs[1].start, 2.0);
        assert_eq!(subs[1].end, 8.0);
    }

    #[test]
    fn test_from_lines_skips_punctuation_only_lines() {
        let lines = strings(&["...", "ok"]);
        let subs = from_lines(&lines, &strings(&["ok"]), &[1.0], 2.0);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].index, 1);
    }

    #[test]
    fn test_shifted_moves_and_renumbers() {
        let cue = Subtitle {
            index: 1,
            start: 1.0,
            end: 2.0,
            text: "x".to_string(),
        };
        let moved = cue.shifted(10.0, 7);
        assert_eq!((moved.index, moved.start, moved.end), (7, 11.0, 12.0));
    }
}
