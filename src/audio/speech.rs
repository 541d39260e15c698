use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Duration;

const TTS_ENDPOINT: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const TTS_MODEL: &str = "eleven_turbo_v2_5";

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Text-to-speech client. Runs on the audio thread, so it uses the blocking HTTP client.
pub struct SpeechSynth {
    http: reqwest::blocking::Client,
    api_key: String,
    voice_id: String,
}

impl SpeechSynth {
    pub fn new(api_key: String, voice_id: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build speech HTTP client")?;
        Ok(Self {
            http,
            api_key,
            voice_id,
        })
    }

    /// Returns encoded audio (MP3) for `text`.
    pub fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(format!("{TTS_ENDPOINT}/{}", self.voice_id))
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: TTS_MODEL,
            })
            .send()
            .context("speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("speech service returned {status}");
        }

        let bytes = response.bytes().context("failed to read speech audio")?;
        if bytes.is_empty() {
            bail!("speech service returned no audio");
        }
        Ok(bytes.to_vec())
    }
}
