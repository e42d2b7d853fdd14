//! Text-to-speech backends.
//!
//! The default backend shells out to a TTS command (Termux:API's
//! `termux-tts-speak` on Android, or anything taking the text as its last
//! argument, e.g. `espeak-ng`). At most one child process is alive at a time.

use std::io::ErrorKind;
use std::process::{Child, Command, Stdio};

use crate::config::VoiceConfig;
use crate::error::{NavError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language: String,
    pub rate: f32,
}

/// Platform speech synthesis
pub trait SpeechSynthesizer {
    /// False once the backend is known to be missing on this platform
    fn is_available(&self) -> bool;

    /// Start speaking; returns without waiting for playback to finish
    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    /// Stop the utterance in flight, if any
    fn cancel(&mut self);
}

pub struct CommandSynthesizer {
    program: String,
    base_args: Vec<String>,
    child: Option<Child>,
    available: bool,
}

impl CommandSynthesizer {
    /// `command` is split on whitespace; the first word is the program
    pub fn new(command: &str) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        let available = !program.is_empty();
        CommandSynthesizer {
            program,
            base_args: words.collect(),
            child: None,
            available,
        }
    }

    pub fn from_config(voice: &VoiceConfig) -> Self {
        Self::new(&voice.command)
    }

    fn is_termux(&self) -> bool {
        self.program.ends_with("termux-tts-speak")
    }

    fn build_command(&self, utterance: &Utterance) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.base_args);
        if self.is_termux() {
            command
                .arg("-l")
                .arg(&utterance.language)
                .arg("-r")
                .arg(utterance.rate.to_string());
        }
        command
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.cancel();
        match self.build_command(utterance).spawn() {
            Ok(child) => {
                self.child = Some(child);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.available = false;
                Err(NavError::Speech(format!("{} not found", self.program)))
            }
            Err(e) => Err(NavError::Speech(format!("{}: {}", self.program, e))),
        }
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine; either way reap it
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    log::debug!("Failed to stop speech process: {}", e);
                }
            }
            if let Err(e) = child.wait() {
                log::debug!("Failed to reap speech process: {}", e);
            }
        }
    }
}

impl Drop for CommandSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            language: "en-US".to_string(),
            rate: 1.0,
        }
    }

    #[test]
    fn test_missing_program_becomes_unavailable() {
        let mut synth = CommandSynthesizer::new("shaperun-no-such-tts-binary");
        assert!(synth.is_available());
        assert!(synth.speak(&utterance("turn left")).is_err());
        assert!(!synth.is_available());
    }

    #[test]
    fn test_empty_command_is_unavailable() {
        let synth = CommandSynthesizer::new("   ");
        assert!(!synth.is_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_utterance_replaces_running_one() {
        // `sleep` ignores the text argument's meaning but keeps a child alive
        let mut synth = CommandSynthesizer::new("sleep");
        synth.speak(&utterance("5")).unwrap();
        let first_pid = synth.child.as_ref().map(|c| c.id());
        synth.speak(&utterance("5")).unwrap();
        let second_pid = synth.child.as_ref().map(|c| c.id());
        assert!(first_pid.is_some());
        assert_ne!(first_pid, second_pid);
        synth.cancel();
        assert!(synth.child.is_none());
    }

    #[test]
    fn test_termux_arguments() {
        let synth = CommandSynthesizer::new("termux-tts-speak -s MUSIC");
        let command = synth.build_command(&utterance("turn right"));
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-s", "MUSIC", "-l", "en-US", "-r", "1", "turn right"]);
    }
}
