use crate::config::VoiceConfig;
use crate::speech::{SpeechSynthesizer, Utterance};

/// Sink for spoken guidance. At most one announcement is active at a time.
pub trait Announcer {
    /// Replace whatever is being said with `text`
    fn speak(&mut self, text: &str);

    fn cancel_current(&mut self);
}

impl<A: Announcer + ?Sized> Announcer for Box<A> {
    fn speak(&mut self, text: &str) {
        (**self).speak(text)
    }

    fn cancel_current(&mut self) {
        (**self).cancel_current()
    }
}

/// Announcer backed by a speech synthesizer.
///
/// No queueing and no retry: a failed or unavailable backend turns every
/// announcement into a logged no-op.
pub struct AnnouncementChannel {
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    language: String,
    rate: f32,
    current: Option<String>,
    warned_unavailable: bool,
}

impl AnnouncementChannel {
    pub fn new(synthesizer: Option<Box<dyn SpeechSynthesizer>>, voice: &VoiceConfig) -> Self {
        AnnouncementChannel {
            synthesizer: if voice.enabled { synthesizer } else { None },
            language: voice.language.clone(),
            rate: voice.rate,
            current: None,
            warned_unavailable: false,
        }
    }

    /// Text of the last utterance handed to the backend
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

impl Announcer for AnnouncementChannel {
    fn speak(&mut self, text: &str) {
        self.cancel_current();

        let synthesizer = match self.synthesizer.as_mut() {
            Some(s) if s.is_available() => s,
            _ => {
                if !self.warned_unavailable {
                    log::warn!("Speech synthesis unavailable, announcements are silent");
                    self.warned_unavailable = true;
                }
                log::info!("(silent) {}", text);
                return;
            }
        };

        let utterance = Utterance {
            text: text.to_string(),
            language: self.language.clone(),
            rate: self.rate,
        };
        match synthesizer.speak(&utterance) {
            Ok(()) => {
                log::info!("Speaking: {}", text);
                self.current = Some(utterance.text);
            }
            Err(e) => log::warn!("Announcement dropped: {}", e),
        }
    }

    fn cancel_current(&mut self) {
        if self.current.take().is_some() {
            if let Some(synthesizer) = self.synthesizer.as_mut() {
                synthesizer.cancel();
            }
        }
    }
}

/// Collects announcements instead of speaking them
#[derive(Debug, Default, Clone)]
pub struct RecordingAnnouncer {
    pub spoken: Vec<String>,
    pub cancels: usize,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.spoken.iter().filter(|s| s.contains(needle)).count()
    }
}

impl Announcer for RecordingAnnouncer {
    fn speak(&mut self, text: &str) {
        self.cancel_current();
        self.spoken.push(text.to_string());
    }

    fn cancel_current(&mut self) {
        self.cancels += 1;
    }
}
