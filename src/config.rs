use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, warn};
use serde::Deserialize;

use crate::chat::DEFAULT_SERVER;
use crate::key_pool::Credential;
use crate::media::CaptureSettings;
use crate::observer::ObserverSettings;
use crate::persona::{PersonaAccount, PersonaSettings};
use crate::providers::ProviderOverride;

pub const DEFAULT_CONFIG_PATH: &str = "stream_crowd.toml";

/// Watch a live stream and fill its chat with AI personas.
#[derive(Debug, Parser)]
#[command(name = "stream_crowd", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, env = "STREAM_CROWD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Stream URL to watch.
    #[arg(long)]
    pub url: Option<String>,

    /// Chat channel the personas join.
    #[arg(long)]
    pub channel: Option<String>,

    /// AI provider for every call (groq, openrouter, gemini).
    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub no_audio: bool,

    #[arg(long)]
    pub no_video: bool,

    /// Keep personas connected but silent.
    #[arg(long)]
    pub no_chat: bool,

    /// Serve the status API on this address.
    #[arg(long)]
    pub api_bind: Option<String>,

    /// Post this line once from every active account, then exit.
    #[arg(long, value_name = "TEXT")]
    pub say: Option<String>,

    /// Capture and analyse the stream once, print the context, then exit.
    #[arg(long, conflicts_with = "say")]
    pub check: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub observer: ObserverConfig,
    pub persona: PersonaConfig,
    pub chat: ChatConfig,
    pub api: ApiConfig,
    pub providers: HashMap<String, ProviderOverride>,
    pub credentials: Vec<Credential>,
    pub accounts: Vec<PersonaAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
    pub channel: String,
    pub provider: String,
    pub capture_audio: bool,
    pub capture_video: bool,
    pub send_chat: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            channel: String::new(),
            provider: "groq".into(),
            capture_audio: true,
            capture_video: true,
            send_chat: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub interval_secs: u64,
    pub audio_clip_secs: u64,
    pub frame_retries: u32,
    pub tool_timeout_secs: u64,
    pub ffmpeg: String,
    pub streamlink: String,
    pub debug_frames_dir: Option<PathBuf>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            audio_clip_secs: 10,
            frame_retries: 3,
            tool_timeout_secs: 45,
            ffmpeg: "ffmpeg".into(),
            streamlink: "streamlink".into(),
            debug_frames_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub reply_probability: f64,
    pub speak_min_secs: u64,
    pub speak_max_secs: u64,
    pub typo_probability: f64,
    pub typing_delay_min_ms: u64,
    pub typing_delay_max_ms: u64,
    pub reconnect_secs: u64,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            reply_probability: 0.3,
            speak_min_secs: 60,
            speak_max_secs: 180,
            typo_probability: 0.3,
            typing_delay_min_ms: 50,
            typing_delay_max_ms: 150,
            reconnect_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub server: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: Option<String>,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Reads `path`; a missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                debug!("Loaded configuration from {}", path.display());
                Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    /// Command-line values win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.url {
            self.stream.url = url.clone();
        }
        if let Some(channel) = &cli.channel {
            self.stream.channel = channel.clone();
        }
        if let Some(provider) = &cli.provider {
            self.stream.provider = provider.clone();
        }
        if cli.no_audio {
            self.stream.capture_audio = false;
        }
        if cli.no_video {
            self.stream.capture_video = false;
        }
        if cli.no_chat {
            self.stream.send_chat = false;
        }
        if let Some(bind) = &cli.api_bind {
            self.api.bind = Some(bind.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.url.trim().is_empty() {
            bail!("stream url is required");
        }
        self.validate_chat()?;
        let persona = &self.persona;
        if persona.speak_min_secs > persona.speak_max_secs {
            bail!(
                "speak_min_secs ({}) is larger than speak_max_secs ({})",
                persona.speak_min_secs,
                persona.speak_max_secs
            );
        }
        if persona.typing_delay_min_ms > persona.typing_delay_max_ms {
            bail!("typing_delay_min_ms is larger than typing_delay_max_ms");
        }
        for (name, p) in [
            ("reply_probability", persona.reply_probability),
            ("typo_probability", persona.typo_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{name} must be within [0, 1], got {p}");
            }
        }
        // zero would let the speak and reconnect loops spin
        for (name, secs) in [
            ("observer interval_secs", self.observer.interval_secs),
            ("speak_max_secs", persona.speak_max_secs),
            ("reconnect_secs", persona.reconnect_secs),
        ] {
            if secs == 0 {
                bail!("{name} must be positive");
            }
        }
        Ok(())
    }

    /// Checks only what a one-off `--say` post needs.
    pub fn validate_chat(&self) -> Result<()> {
        if self.stream.channel.trim().is_empty() && self.accounts.iter().any(|a| a.active) {
            bail!("a chat channel is required when accounts are active");
        }
        Ok(())
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let o = &self.observer;
        CaptureSettings {
            ffmpeg: o.ffmpeg.clone(),
            streamlink: o.streamlink.clone(),
            tool_timeout: Duration::from_secs(o.tool_timeout_secs),
            frame_retries: o.frame_retries,
            audio_clip: Duration::from_secs(o.audio_clip_secs),
            debug_frames_dir: o.debug_frames_dir.clone(),
        }
    }

    pub fn observer_settings(&self) -> ObserverSettings {
        ObserverSettings {
            url: self.stream.url.clone(),
            provider: self.stream.provider.clone(),
            capture_audio: self.stream.capture_audio,
            capture_video: self.stream.capture_video,
            interval: Duration::from_secs(self.observer.interval_secs),
        }
    }

    pub fn persona_settings(&self) -> PersonaSettings {
        let p = &self.persona;
        PersonaSettings {
            chat_server: self.chat.server.clone(),
            channel: self.stream.channel.clone(),
            provider: self.stream.provider.clone(),
            send_chat: self.stream.send_chat,
            reply_probability: p.reply_probability,
            speak_min: Duration::from_secs(p.speak_min_secs),
            speak_max: Duration::from_secs(p.speak_max_secs),
            typo_probability: p.typo_probability,
            typing_delay_min: Duration::from_millis(p.typing_delay_min_ms),
            typing_delay_max: Duration::from_millis(p.typing_delay_max_ms),
            reconnect_delay: Duration::from_secs(p.reconnect_secs),
        }
    }
}
