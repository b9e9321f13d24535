//! Recognition through an external engine process.
//!
//! The engine receives raw f32 little-endian 16 kHz mono audio on stdin and
//! prints one JSON object `{"text", "tokens", "timestamps"}` on stdout.

use super::{Recognition, Recognizer};
use crate::audio::pcm::f32_to_le_bytes;
use crate::error::{CapscribeError, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    model_name: String,
}

impl CommandRecognizer {
    /// `command` is the program followed by its arguments.
    pub fn new(command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CapscribeError::ConfigInvalidValue {
                key: "server.engine.command".to_string(),
                message: "an engine command is required for the command engine".to_string(),
            })?;
        let model_name = std::path::Path::new(&program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&program)
            .to_string();

        Ok(Self {
            program,
            args: parts.collect(),
            model_name,
        })
    }
}

impl Recognizer for CommandRecognizer {
    fn recognize(&self, audio: &[f32]) -> Result<Recognition> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CapscribeError::Recognition {
                message: format!("Failed to start engine '{}': {}", self.program, e),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CapscribeError::Recognition {
                message: "engine stdin unavailable".to_string(),
            })?;
        let bytes = f32_to_le_bytes(audio);

        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(&bytes));
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output = output.map_err(|e| CapscribeError::Recognition {
            message: format!("Failed to wait for engine: {}", e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapscribeError::Recognition {
                message: format!("engine exited with {}: {}", output.status, stderr.trim()),
            });
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "engine closed stdin early"),
            Err(_) => {
                return Err(CapscribeError::Recognition {
                    message: "engine input writer panicked".to_string(),
                });
            }
        }

        let recognition: Recognition =
            serde_json::from_slice(&output.stdout).map_err(|e| CapscribeError::Recognition {
                message: format!("engine produced invalid JSON: {}", e),
            })?;
        recognition.validate()?;
        Ok(recognition)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandRecognizer {
        CommandRecognizer::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
            .unwrap()
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            CommandRecognizer::new(Vec::new()),
            Err(CapscribeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_model_name_is_program_file_name() {
        let recognizer = CommandRecognizer::new(vec!["/opt/engine/run-asr".to_string()]).unwrap();
        assert_eq!(recognizer.model_name(), "run-asr");
    }

    #[test]
    fn test_engine_output_is_parsed() {
        let recognizer = sh(
            r#"cat > /dev/null; echo '{"text":"hi there","tokens":["hi","there"],"timestamps":[0.1,0.4]}'"#,
        );
        let result = recognizer.recognize(&[0.0; 1600]).unwrap();
        assert_eq!(result.text, "hi there");
        assert_eq!(result.timestamps, vec![0.1, 0.4]);
    }

    #[test]
    fn test_engine_receives_audio_bytes() {
        let recognizer = sh(r#"n=$(wc -c); echo "{\"text\":\"$n\"}""#);
        let result = recognizer.recognize(&[0.0; 100]).unwrap();
        assert_eq!(result.text.trim(), "400");
    }

    #[test]
    fn test_engine_failure_carries_stderr() {
        let recognizer = sh("cat > /dev/null; echo 'model missing' >&2; exit 3");
        let err = recognizer.recognize(&[0.0; 16]).unwrap_err();
        assert!(err.to_string().contains("model missing"), "got: {}", err);
    }

    #[test]
    fn test_engine_mismatched_timestamps_rejected() {
        let recognizer = sh(r#"cat > /dev/null; echo '{"text":"a","tokens":["a"],"timestamps":[]}'"#);
        assert!(recognizer.recognize(&[0.0; 16]).is_err());
    }
}
