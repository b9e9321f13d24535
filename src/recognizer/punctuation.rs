//! Rule-based punctuation restoration.

use super::Punctuator;
use crate::error::Result;

const LATIN_TERMINATORS: [char; 3] = ['.', '?', '!'];
const CJK_TERMINATORS: [char; 3] = ['。', '？', '！'];

/// Capitalizes sentence starts and closes the final sentence.
#[derive(Debug, Clone, Default)]
pub struct RulePunctuator;

impl Punctuator for RulePunctuator {
    fn punctuate(&self, text: &str) -> Result<String> {
        let text = text.trim();
        let Some(last) = text.chars().last() else {
            return Ok(String::new());
        };

        let mut output = String::with_capacity(text.len() + 3);
        let mut sentence_start = true;
        let mut previous = ' ';
        for c in text.chars() {
            if sentence_start && c.is_alphabetic() {
                output.extend(c.to_uppercase());
                sentence_start = false;
            } else {
                output.push(c);
            }
            if c.is_whitespace() && LATIN_TERMINATORS.contains(&previous) {
                sentence_start = true;
            } else if !c.is_whitespace() && sentence_start && !c.is_alphabetic() {
                sentence_start = c.is_ascii_punctuation();
            }
            previous = c;
        }

        if !LATIN_TERMINATORS.contains(&last) && !CJK_TERMINATORS.contains(&last) {
            output.push(if is_cjk(last) { '。' } else { '.' });
        }
        Ok(output)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x2E80..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF)
}
