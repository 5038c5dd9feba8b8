//! Text-to-speech.
//!
//! [`SpeechSynthesizer`] turns text into audio bytes for a given voice.
//! [`VoiceService`] sits on top: it picks the voice for an [`Accent`],
//! writes the audio under `<static_dir>/audio/` and returns the path the
//! HTTP server exposes it at.
//!
//! The only engine is [`AzureSpeechSynthesizer`], which posts SSML to the
//! Azure Speech REST API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::TtsConfig;
use crate::error::{ServiceError, ServiceResult};

/// URL prefix under which `<static_dir>` is served.
pub const STATIC_URL_PREFIX: &str = "/static";

/// Spoken accent, mapped to a fixed neural voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accent {
    #[default]
    IndianEnglish,
    Tamil,
    TamilEnglish,
}

impl Accent {
    pub fn voice_name(&self) -> &'static str {
        match self {
            Accent::IndianEnglish => "en-IN-NeerjaExpressiveNeural",
            Accent::Tamil => "ta-IN-PallaviNeural",
            Accent::TamilEnglish => "ta-IN-ValluvarNeural",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Accent::IndianEnglish => "indian_english",
            Accent::Tamil => "tamil",
            Accent::TamilEnglish => "tamil_english",
        }
    }
}

impl fmt::Display for Accent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Accent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "indian_english" => Ok(Accent::IndianEnglish),
            "tamil" => Ok(Accent::Tamil),
            "tamil_english" => Ok(Accent::TamilEnglish),
            other => bail!(
                "unknown accent '{}'. Must be indian_english, tamil, or tamil_english.",
                other
            ),
        }
    }
}

/// Prosody and voice for one synthesis call.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub voice: String,
    pub rate: String,
    pub pitch: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` and return the encoded audio.
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> Result<Vec<u8>>;
}

/// Azure Speech REST synthesizer.
pub struct AzureSpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    output_format: String,
}

impl AzureSpeechSynthesizer {
    pub fn new(config: &TtsConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key,
            output_format: config.output_format.clone(),
        }
    }

    /// Reads the subscription key from the env var named by `tts.api_key_env`.
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!("{} environment variable is not set", config.api_key_env)
        })?;
        Ok(Self::new(config, api_key))
    }
}

/// Wrap `text` in an SSML document for `settings`.
pub fn build_ssml(text: &str, settings: &VoiceSettings) -> String {
    let lang = settings
        .voice
        .splitn(3, '-')
        .take(2)
        .collect::<Vec<_>>()
        .join("-");
    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"{lang}\">\
         <voice name=\"{voice}\"><prosody rate=\"{rate}\" pitch=\"{pitch}\">{text}</prosody></voice></speak>",
        lang = lang,
        voice = quick_xml::escape::escape(settings.voice.as_str()),
        rate = quick_xml::escape::escape(settings.rate.as_str()),
        pitch = quick_xml::escape::escape(settings.pitch.as_str()),
        text = quick_xml::escape::escape(text),
    )
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    #[tracing::instrument(name = "azure speech", skip(self, text), fields(voice = %settings.voice, chars = text.len()))]
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> Result<Vec<u8>> {
        let ssml = build_ssml(text, settings);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header(reqwest::header::USER_AGENT, "envision")
            .body(ssml)
            .send()
            .await
            .context("speech synthesis request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("speech API error {}: {}", status, body);
        }

        let bytes = resp.bytes().await.context("failed to read audio body")?;
        if bytes.is_empty() {
            bail!("speech API returned no audio");
        }
        Ok(bytes.to_vec())
    }
}

/// Build the configured synthesizer, or `None` when TTS is disabled.
pub fn create_synthesizer(config: &TtsConfig) -> Result<Option<Arc<dyn SpeechSynthesizer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "azure" => Ok(Some(Arc::new(AzureSpeechSynthesizer::from_config(config)?))),
        other => bail!("Unknown tts provider: '{}'", other),
    }
}

/// Writes synthesized audio into the static directory.
pub struct VoiceService {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    audio_dir: PathBuf,
    rate: String,
    pitch: String,
}

impl VoiceService {
    pub fn new(
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        static_dir: impl Into<PathBuf>,
        config: &TtsConfig,
    ) -> Self {
        Self {
            synthesizer,
            audio_dir: static_dir.into().join("audio"),
            rate: config.rate.clone(),
            pitch: config.pitch.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Synthesize `text` in `accent` and return the servable path of the
    /// written file, e.g. `/static/audio/Jane_20260101_093000_123.mp3`.
    #[tracing::instrument(name = "synthesize voice", skip(self, text))]
    pub async fn synthesize(
        &self,
        text: &str,
        speaker_identity: &str,
        accent: Accent,
    ) -> ServiceResult<String> {
        let synthesizer = self.synthesizer.as_ref().ok_or_else(|| {
            ServiceError::Config("text-to-speech is not available; check the [tts] section".to_string())
        })?;

        let settings = VoiceSettings {
            voice: accent.voice_name().to_string(),
            rate: self.rate.clone(),
            pitch: self.pitch.clone(),
        };
        let audio = synthesizer
            .synthesize(text, &settings)
            .await
            .map_err(ServiceError::upstream)?;

        let filename = audio_filename(speaker_identity, chrono::Local::now());
        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .with_context(|| format!("failed to create {}", self.audio_dir.display()))?;
        let path = self.audio_dir.join(&filename);
        tokio::fs::write(&path, &audio)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(file = %filename, bytes = audio.len(), "audio written");
        Ok(format!("{}/audio/{}", STATIC_URL_PREFIX, filename))
    }
}

/// Keep alphanumerics, spaces, `_` and `-`; trim; spaces become `_`.
/// An identity with nothing left becomes `user`.
pub fn sanitize_identity(identity: &str) -> String {
    let kept: String = identity
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_' || *c == '-')
        .collect();
    let name = kept.trim().replace(' ', "_");
    if name.is_empty() {
        "user".to_string()
    } else {
        name
    }
}

fn audio_filename<Tz>(identity: &str, now: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{}_{}.mp3",
        sanitize_identity(identity),
        now.format("%Y%m%d_%H%M%S_%3f")
    )
}
