//! Speech synthesis pass-through: final assistant text in, audio bytes
//! out, via the Google Text-to-Speech REST API. Out of core scope; the
//! client is optional the same way the generator is.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum TtsError {
  #[error("speech synthesis request failed: {0}")]
  Http(String),
  #[error("speech synthesis returned an unusable response: {0}")]
  Decode(String),
}

#[derive(Clone)]
pub struct GoogleTts {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
  input: SynthesisInput<'a>,
  voice: VoiceSelection<'a>,
  audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
  text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
  language_code: &'a str,
  name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
  audio_encoding: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  speaking_rate: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
  audio_content: String,
}

impl GoogleTts {
  /// Construct the client if we find GOOGLE_TTS_API_KEY; otherwise None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GOOGLE_TTS_API_KEY").ok()?;
    let base_url = std::env::var("GOOGLE_TTS_BASE_URL")
      .unwrap_or_else(|_| "https://texttospeech.googleapis.com/v1".into());
    let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build().ok()?;
    Some(Self { client, api_key, base_url })
  }

  /// Synthesize `text` with the given voice. Chirp voices reject a
  /// speaking-rate override and come back as LINEAR16 instead of MP3.
  #[instrument(level = "info", skip(self, text), fields(%speaker, speed, text_len = text.len()))]
  pub async fn synthesize(&self, text: &str, speaker: &str, speed: f32) -> Result<Vec<u8>, TtsError> {
    let is_chirp = speaker.contains("Chirp");
    let req = SynthesizeRequest {
      input: SynthesisInput { text },
      voice: VoiceSelection { language_code: "en-US", name: speaker },
      audio_config: AudioConfig {
        audio_encoding: if is_chirp { "LINEAR16" } else { "MP3" },
        speaking_rate: if is_chirp { None } else { Some(speed) },
      },
    };

    let url = format!("{}/text:synthesize?key={}", self.base_url, self.api_key);
    let res = self
      .client
      .post(&url)
      .json(&req)
      .send()
      .await
      .map_err(|e| TtsError::Http(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(TtsError::Http(format!("HTTP {}: {}", status, body)));
    }

    let body: SynthesizeResponse = res.json().await.map_err(|e| TtsError::Decode(e.to_string()))?;
    let audio = BASE64.decode(body.audio_content.as_bytes()).map_err(|e| TtsError::Decode(e.to_string()))?;
    info!(target: "storytalk_backend", bytes = audio.len(), "Speech synthesized");
    Ok(audio)
  }
}
