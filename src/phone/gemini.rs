use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};

use super::VisionClassifier;
use crate::capture::CapturedFrame;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const JPEG_QUALITY: u8 = 60;
const PROMPT: &str = "Look at this image. Is the person holding a phone, looking at a phone, \
or has a phone near their face or hands? Reply with only YES or NO.";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Asks a Gemini model whether the frame shows phone use.
pub struct GeminiClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            http,
            endpoint: format!("{API_BASE}/{model}:generateContent"),
            api_key: api_key.to_string(),
        })
    }

    async fn ask(&self, image: &RgbImage) -> Result<bool> {
        let jpeg = encode_jpeg(image)?;
        let request = GenerateRequest {
            contents: [Content {
                parts: [
                    Part::Text { text: PROMPT },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: STANDARD.encode(jpeg),
                        },
                    },
                ],
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Gemini returned {status}");
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Gemini response was not JSON")?;
        let text = reply_text(&body).ok_or_else(|| anyhow!("Gemini reply had no text"))?;
        Ok(answer_is_yes(&text))
    }
}

impl VisionClassifier for GeminiClassifier {
    fn classify(&self, frame: &CapturedFrame) -> impl Future<Output = Result<bool>> + Send {
        async move {
            let image = frame
                .image
                .as_ref()
                .ok_or_else(|| anyhow!("frame carries no image"))?;
            self.ask(image).await
        }
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(image)
        .context("failed to encode frame as JPEG")?;
    Ok(buffer)
}

fn reply_text(body: &GenerateResponse) -> Option<String> {
    let text: String = body
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

fn answer_is_yes(text: &str) -> bool {
    text.to_ascii_uppercase().contains("YES")
}
