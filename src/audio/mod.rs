pub mod ambient;
mod speech;

use ambient::{AmbientKind, AmbientSound};
use speech::SpeechSynth;

use log::{error, info, warn};
use rodio::{source::SineWave, Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::alerts::Speaker;

const VOLUME_STEP: f32 = 0.1;
const INITIAL_VOLUME: f32 = 0.8;

/// Volume and focus-sound controls driven by the hardware buttons.
pub trait MediaControls: Send {
    fn volume_up(&self);
    fn volume_down(&self);
    fn toggle_music(&self);
    fn skip_track(&self);
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub voice_id: String,
    pub timeout: Duration,
}

enum AudioCommand {
    Speak(String),
    ToggleMusic,
    SkipTrack,
    AdjustVolume(f32),
    Shutdown,
}

/// Cheap, cloneable handle to the audio thread. The thread is started on first use and
/// owns everything that is not `Send` (output stream, sinks).
#[derive(Clone)]
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    voice: VoiceConfig,
}

impl AudioEngineHandle {
    pub fn new(voice: VoiceConfig) -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            worker: Arc::new(Mutex::new(None)),
            voice,
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut tx_guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = tx_guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let voice = self.voice.clone();

        let handle = thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                let mut engine = AudioThread::new(voice);
                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Speak(text) => engine.speak(&text),
                        AudioCommand::ToggleMusic => engine.toggle_music(),
                        AudioCommand::SkipTrack => engine.skip_track(),
                        AudioCommand::AdjustVolume(delta) => engine.adjust_volume(delta),
                        AudioCommand::Shutdown => break,
                    }
                }
                engine.stop_all();
            })
            .map_err(|e| e.to_string())?;

        *self.worker.lock().map_err(|e| e.to_string())? = Some(handle);
        *tx_guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, command: AudioCommand) {
        let result = self
            .ensure_thread()
            .and_then(|tx| tx.send(command).map_err(|e| e.to_string()));
        if let Err(err) = result {
            error!("audio engine unavailable: {err}");
        }
    }

    /// Stops playback and joins the audio thread. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|mut g| g.take()) {
            let _ = tx.send(AudioCommand::Shutdown);
        }
        if let Ok(Some(handle)) = self.worker.lock().map(|mut g| g.take()) {
            if let Err(join_err) = handle.join() {
                error!("Failed to join audio thread: {join_err:?}");
            }
        }
    }
}

impl Speaker for AudioEngineHandle {
    fn say(&self, phrase: &str) {
        self.send(AudioCommand::Speak(phrase.to_string()));
    }
}

impl MediaControls for AudioEngineHandle {
    fn volume_up(&self) {
        self.send(AudioCommand::AdjustVolume(VOLUME_STEP));
    }

    fn volume_down(&self) {
        self.send(AudioCommand::AdjustVolume(-VOLUME_STEP));
    }

    fn toggle_music(&self) {
        self.send(AudioCommand::ToggleMusic);
    }

    fn skip_track(&self) {
        self.send(AudioCommand::SkipTrack);
    }
}

/// State living on the audio thread.
struct AudioThread {
    voice_config: VoiceConfig,
    synth: Option<SpeechSynth>,
    output: Option<(OutputStream, OutputStreamHandle)>,
    voice: Option<Sink>,
    music: Option<Sink>,
    track: AmbientKind,
    volume: f32,
}

impl AudioThread {
    fn new(voice_config: VoiceConfig) -> Self {
        let synth = voice_config.api_key.clone().and_then(|key| {
            SpeechSynth::new(key, voice_config.voice_id.clone(), voice_config.timeout)
                .map_err(|err| warn!("speech synthesis disabled: {err:#}"))
                .ok()
        });
        if synth.is_none() {
            info!("no speech synthesis configured; alerts will chime");
        }

        Self {
            voice_config,
            synth,
            output: None,
            voice: None,
            music: None,
            track: AmbientKind::BrownNoise,
            volume: INITIAL_VOLUME,
        }
    }

    fn output_handle(&mut self) -> Option<OutputStreamHandle> {
        if self.output.is_none() {
            match OutputStream::try_default() {
                Ok(pair) => self.output = Some(pair),
                Err(err) => {
                    warn!("Failed to open audio output: {err}");
                    return None;
                }
            }
        }
        self.output.as_ref().map(|(_, handle)| handle.clone())
    }

    fn new_sink(&mut self) -> Option<Sink> {
        let handle = self.output_handle()?;
        match Sink::try_new(&handle) {
            Ok(sink) => {
                sink.set_volume(self.volume);
                Some(sink)
            }
            Err(err) => {
                warn!("Failed to create audio sink: {err}");
                None
            }
        }
    }

    fn speak(&mut self, text: &str) {
        if self.voice.is_none() {
            self.voice = self.new_sink();
        }

        let speech = self.synth.as_ref().map(|synth| synth.synthesize(text));
        let Some(sink) = self.voice.as_ref() else {
            return;
        };

        match speech {
            Some(Ok(bytes)) => match Decoder::new(Cursor::new(bytes)) {
                Ok(source) => {
                    info!("speaking: {text}");
                    sink.append(source);
                    return;
                }
                Err(err) => warn!("speech audio undecodable: {err}"),
            },
            Some(Err(err)) => warn!(
                "speech synthesis failed (voice {}): {err:#}",
                self.voice_config.voice_id
            ),
            None => {}
        }

        info!("alert chime: {text}");
        sink.append(
            SineWave::new(880.0)
                .take_duration(Duration::from_millis(250))
                .amplify(0.3),
        );
    }

    fn start_track(&mut self) {
        if let Some(old) = self.music.take() {
            old.stop();
        }
        if let Some(sink) = self.new_sink() {
            sink.append(AmbientSound::new(self.track));
            sink.play();
            info!("focus sound: {}", self.track.label());
            self.music = Some(sink);
        }
    }

    fn toggle_music(&mut self) {
        if let Some(sink) = self.music.as_ref() {
            if sink.is_paused() {
                sink.play();
            } else {
                sink.pause();
            }
        } else {
            self.start_track();
        }
    }

    fn skip_track(&mut self) {
        self.track = self.track.next();
        let paused = self.music.as_ref().map(Sink::is_paused).unwrap_or(true);
        if paused {
            info!("next focus sound: {}", self.track.label());
            if let Some(old) = self.music.take() {
                old.stop();
            }
        } else {
            self.start_track();
        }
    }

    fn adjust_volume(&mut self, delta: f32) {
        self.volume = (self.volume + delta).clamp(0.0, 1.0);
        for sink in [self.voice.as_ref(), self.music.as_ref()].into_iter().flatten() {
            sink.set_volume(self.volume);
        }
        info!("volume {:.0}%", self.volume * 100.0);
    }

    fn stop_all(&mut self) {
        for sink in [self.voice.take(), self.music.take()].into_iter().flatten() {
            sink.stop();
        }
        self.output = None;
    }
}
