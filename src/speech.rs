//! Speech output.
//!
//! The session hands finished phrases to a [`SpeechSink`]. Sinks either block
//! until playback ends (`CommandSpeech`) or queue the phrase for a worker
//! thread (`QueuedSpeech`), which keeps long playback from stalling capture.

use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::config::{SpeechMode, SpeechSettings};

pub trait SpeechSink {
    fn name(&self) -> &'static str;

    /// Submit a phrase. Returning `Ok` means the phrase was spoken or accepted
    /// for playback.
    fn speak(&mut self, phrase: &str) -> Result<()>;
}

/// Build the sink described by the speech settings.
pub fn from_settings(settings: &SpeechSettings) -> Result<Box<dyn SpeechSink>> {
    let sink: Box<dyn SpeechSink> = match settings.mode {
        SpeechMode::Log => Box::new(LogSpeech::new()),
        SpeechMode::Blocking => Box::new(CommandSpeech::new(
            settings.command.clone(),
            settings.args.clone(),
        )?),
        SpeechMode::Queued => {
            let command = CommandSpeech::new(settings.command.clone(), settings.args.clone())?;
            Box::new(QueuedSpeech::spawn(command, settings.queue)?)
        }
    };
    Ok(sink)
}

/// Writes phrases to the log and keeps a transcript. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogSpeech {
    transcript: Vec<String>,
}

impl LogSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }
}

impl SpeechSink for LogSpeech {
    fn name(&self) -> &'static str {
        "log"
    }

    fn speak(&mut self, phrase: &str) -> Result<()> {
        log::info!("speak: {}", phrase);
        self.transcript.push(phrase.to_string());
        Ok(())
    }
}

/// Runs an external TTS program with the phrase as its last argument and waits
/// for it to exit.
#[derive(Clone, Debug)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(anyhow!("speech command must not be empty"));
        }
        Ok(Self { program, args })
    }
}

impl SpeechSink for CommandSpeech {
    fn name(&self) -> &'static str {
        "command"
    }

    fn speak(&mut self, phrase: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(phrase)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to run speech command '{}'", self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "speech command '{}' exited with {}",
                self.program,
                status
            ));
        }
        Ok(())
    }
}

/// Hands phrases to a worker thread that owns the inner sink.
///
/// Submission never blocks. When `capacity` phrases are already waiting, the
/// new phrase is refused and `speak` returns an error.
pub struct QueuedSpeech {
    sender: Option<SyncSender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedSpeech {
    pub fn spawn<S>(mut inner: S, capacity: usize) -> Result<Self>
    where
        S: SpeechSink + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("speech".to_string())
            .spawn(move || {
                for phrase in receiver {
                    if let Err(e) = inner.speak(&phrase) {
                        log::error!("speech playback failed ({}): {}", inner.name(), e);
                    }
                }
            })
            .context("spawn speech worker")?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl SpeechSink for QueuedSpeech {
    fn name(&self) -> &'static str {
        "queued"
    }

    fn speak(&mut self, phrase: &str) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("speech queue closed"))?;
        match sender.try_send(phrase.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("speech queue full, phrase dropped")),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("speech worker stopped")),
        }
    }
}

impl Drop for QueuedSpeech {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish what is queued and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("speech worker panicked");
            }
        }
    }
}
