//! Spoken summary of a detection.
//!
use std::{
    io,
    process::{Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

use crate::aggregator::CountMapping;

/// Speech synthesis errors.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("nothing to say")]
    EmptySentence,

    #[error("failed to start speech program {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("speech program exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Renders a sentence to the default audio output.
pub trait SpeechEngine: Send + Sync {
    /// Speak `sentence`, returning once playback has finished.
    fn speak(&self, sentence: &str) -> Result<(), SpeechError>;
}

/// Speech through an external synthesizer program such as `espeak-ng`.
///
/// The sentence is passed as the only argument and the program is awaited until it exits.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: String,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandSpeech {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl SpeechEngine for CommandSpeech {
    fn speak(&self, sentence: &str) -> Result<(), SpeechError> {
        // Control characters could be read as synthesizer markup
        let sentence: String = sentence.chars().filter(|c| !c.is_control()).collect();
        if sentence.trim().is_empty() {
            return Err(SpeechError::EmptySentence);
        }

        let output = Command::new(&self.program)
            .arg(&sentence)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SpeechError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(())
    }
}

/// Engine that only logs what would have been said.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

impl SpeechEngine for SilentSpeech {
    fn speak(&self, sentence: &str) -> Result<(), SpeechError> {
        log::info!("(muted) {sentence}");
        Ok(())
    }
}

/// Build the sentence announcing `counts`, `None` if nothing was detected.
///
/// `{"person": 1, "car": 2}` becomes `"1 person detected and 2 cars detected"`. Plurals
/// are formed by appending an `s`.
pub fn compose_sentence(counts: &CountMapping) -> Option<String> {
    if counts.is_empty() {
        return None;
    }

    let phrases: Vec<String> = counts
        .iter()
        .map(|(label, count)| match count {
            1 => format!("1 {label} detected"),
            n => format!("{n} {label}s detected"),
        })
        .collect();

    Some(phrases.join(" and "))
}

/// Speaks one sentence per detection request.
///
/// Announcements of concurrent requests are queued, a new one starts after the previous
/// sentence has been spoken completely.
pub struct Announcer {
    engine: Arc<dyn SpeechEngine>,
    queue: Mutex<()>,
}

impl Announcer {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            queue: Mutex::new(()),
        }
    }

    /// Speak the counts, blocking until playback has finished.
    ///
    /// Returns `Ok(false)` without speaking when there is nothing to announce.
    pub fn announce(&self, counts: &CountMapping) -> Result<bool, SpeechError> {
        let Some(sentence) = compose_sentence(counts) else {
            return Ok(false);
        };

        let _turn = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        log::info!("Announcing: {sentence}");
        self.engine.speak(&sentence)?;

        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;

    /// Engine recording sentences and how many are spoken at the same time.
    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SpeechEngine for RecordingSpeech {
        fn speak(&self, sentence: &str) -> Result<(), SpeechError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            self.spoken.lock().unwrap().push(sentence.to_owned());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counts(pairs: &[(&str, usize)]) -> CountMapping {
        pairs
            .iter()
            .map(|(label, count)| (label.to_string(), *count))
            .collect()
    }

    #[test]
    fn test_sentence() {
        assert_eq!(
            compose_sentence(&counts(&[("person", 1), ("car", 2)])).as_deref(),
            Some("1 person detected and 2 cars detected")
        );
        assert_eq!(
            compose_sentence(&counts(&[("bus", 3)])).as_deref(),
            Some("3 buss detected")
        );
        assert_eq!(compose_sentence(&counts(&[])), None);
    }

    #[test]
    fn test_empty_counts_are_not_spoken() {
        let engine = Arc::new(RecordingSpeech::default());
        let announcer = Announcer::new(engine.clone());

        assert!(!announcer.announce(&counts(&[])).unwrap());
        assert!(engine.spoken.lock().unwrap().is_empty());
    }

    #[test]
    fn test_one_sentence_per_announcement() {
        let engine = Arc::new(RecordingSpeech::default());
        let announcer = Announcer::new(engine.clone());

        assert!(announcer
            .announce(&counts(&[("person", 1), ("car", 2)]))
            .unwrap());
        assert_eq!(
            *engine.spoken.lock().unwrap(),
            vec!["1 person detected and 2 cars detected".to_owned()]
        );
    }

    #[test]
    fn test_concurrent_announcements_are_queued() {
        let engine = Arc::new(RecordingSpeech::default());
        let announcer = Arc::new(Announcer::new(engine.clone()));

        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let announcer = Arc::clone(&announcer);
                thread::spawn(move || announcer.announce(&counts(&[("cup", n)])).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(engine.spoken.lock().unwrap().len(), 4);
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_command_speech_waits_for_program() {
        // `true` ignores its arguments and exits successfully
        assert!(CommandSpeech::new("true").speak("1 cup detected").is_ok());

        assert!(matches!(
            CommandSpeech::new("false").speak("1 cup detected"),
            Err(SpeechError::Failed { .. })
        ));
        assert!(matches!(
            CommandSpeech::new("no-such-speech-program").speak("1 cup detected"),
            Err(SpeechError::Spawn { .. })
        ));
        assert!(matches!(
            CommandSpeech::new("true").speak("\n\t"),
            Err(SpeechError::EmptySentence)
        ));
    }
}
