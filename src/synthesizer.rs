use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use crate::context::SharedContext;
use crate::gateway::{is_error_reply, AiBackend, Prompt};

/// How much of the previous context is carried into the next prompt.
pub const PREVIOUS_CONTEXT_CHARS: usize = 300;
/// Hard cap on the summarization prompt; the tail is kept.
pub const MAX_PROMPT_CHARS: usize = 1500;

/// Last `max` characters of `text` (by `char`, never splitting a code point).
pub fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}

/// Summarization prompt from the previous context and the fresh observations.
pub fn build_prompt(previous: &str, frame_description: &str, transcript: &str) -> String {
    let mut extra = String::new();
    if !frame_description.is_empty() {
        extra.push_str(&format!("Frame description: {frame_description}\n"));
    }
    if !transcript.is_empty() {
        extra.push_str(&format!("Audio transcript: {transcript}\n"));
    }

    let previous = tail_chars(previous, PREVIOUS_CONTEXT_CHARS);
    let prompt = if extra.is_empty() {
        format!(
            "Context: {previous}\nDescribe in one sentence what is happening on screen right now."
        )
    } else {
        format!(
            "Context: {previous}\n{extra}Describe in one sentence what is happening on screen right now (no greetings)."
        )
    };
    tail_chars(&prompt, MAX_PROMPT_CHARS).to_string()
}

/// Folds a frame description and an audio transcript into the shared context.
pub struct ContextSynthesizer {
    backend: Arc<dyn AiBackend>,
    context: Arc<SharedContext>,
}

impl ContextSynthesizer {
    pub fn new(backend: Arc<dyn AiBackend>, context: Arc<SharedContext>) -> Self {
        Self { backend, context }
    }

    /// Asks the provider for an updated one-sentence context and publishes it.
    ///
    /// Returns the new context, or `None` when the provider gave nothing usable; the
    /// shared context is left untouched in that case.
    pub async fn synthesize(
        &self,
        frame: Option<&Path>,
        audio: Option<&Path>,
        provider: &str,
    ) -> Option<String> {
        let description = match frame {
            Some(path) => {
                debug!("Describing frame {}", path.display());
                self.backend.describe_image(path, provider).await
            }
            None => String::new(),
        };
        let transcript = match audio {
            Some(path) => {
                debug!("Transcribing audio {}", path.display());
                self.backend.transcribe_audio(path, provider).await
            }
            None => String::new(),
        };

        let prompt = build_prompt(&self.context.snapshot(), &description, &transcript);
        let reply = self
            .backend
            .chat_complete(Prompt::Text(prompt), provider, None)
            .await;
        let reply = reply.trim();

        if reply.is_empty() || is_error_reply(reply) {
            warn!("Context not updated: {}", if reply.is_empty() { "empty reply" } else { reply });
            return None;
        }
        self.context.publish(reply);
        Some(reply.to_string())
    }
}
