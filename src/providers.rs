use std::collections::HashMap;

use serde::Deserialize;

/// Static description of one AI provider's HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub chat_url: String,
    pub chat_model: String,
    /// `None` when the provider has no transcription endpoint.
    pub transcription_url: Option<String>,
    pub transcription_model: Option<String>,
    /// Extra headers sent with every request (e.g. OpenRouter attribution).
    pub extra_headers: Vec<(String, String)>,
}

/// Per-provider overrides read from the `[providers.<name>]` config tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverride {
    pub chat_url: Option<String>,
    pub chat_model: Option<String>,
    pub transcription_url: Option<String>,
    pub transcription_model: Option<String>,
}

/// Lookup table of known providers. Immutable once the runtime starts.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        let providers = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self { providers }
    }

    /// Groq, OpenRouter and Gemini with their public endpoints.
    pub fn builtin() -> Self {
        Self::new([
            ProviderDescriptor {
                name: "groq".into(),
                chat_url: "https://api.groq.com/openai/v1/chat/completions".into(),
                chat_model: "llama-3.2-90b-vision-preview".into(),
                transcription_url: Some(
                    "https://api.groq.com/openai/v1/audio/transcriptions".into(),
                ),
                transcription_model: Some("whisper-large-v3-turbo".into()),
                extra_headers: Vec::new(),
            },
            ProviderDescriptor {
                name: "openrouter".into(),
                chat_url: "https://openrouter.ai/api/v1/chat/completions".into(),
                chat_model: "google/gemini-2.5-flash".into(),
                transcription_url: Some("https://openrouter.ai/api/v1/audio/transcriptions".into()),
                transcription_model: Some("google/gemma-3n-e4b-it:free".into()),
                extra_headers: vec![
                    ("HTTP-Referer".into(), "http://localhost:8000".into()),
                    ("X-Title".into(), "Stream Crowd".into()),
                ],
            },
            ProviderDescriptor {
                name: "gemini".into(),
                chat_url:
                    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                        .into(),
                chat_model: "gemini-2.0-flash".into(),
                transcription_url: None,
                transcription_model: None,
                extra_headers: Vec::new(),
            },
        ])
    }

    /// Applies config overrides on top of the built-in table.
    ///
    /// An override for an unknown name only becomes a provider when it names a chat URL
    /// and model.
    pub fn with_overrides(mut self, overrides: &HashMap<String, ProviderOverride>) -> Self {
        for (name, o) in overrides {
            match self.providers.get_mut(name) {
                Some(d) => {
                    if let Some(url) = &o.chat_url {
                        d.chat_url = url.clone();
                    }
                    if let Some(model) = &o.chat_model {
                        d.chat_model = model.clone();
                    }
                    if o.transcription_url.is_some() {
                        d.transcription_url = o.transcription_url.clone();
                    }
                    if o.transcription_model.is_some() {
                        d.transcription_model = o.transcription_model.clone();
                    }
                }
                None => {
                    if let (Some(chat_url), Some(chat_model)) = (&o.chat_url, &o.chat_model) {
                        self.providers.insert(
                            name.clone(),
                            ProviderDescriptor {
                                name: name.clone(),
                                chat_url: chat_url.clone(),
                                chat_model: chat_model.clone(),
                                transcription_url: o.transcription_url.clone(),
                                transcription_model: o.transcription_model.clone(),
                                extra_headers: Vec::new(),
                            },
                        );
                    }
                }
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(name)
    }
}
