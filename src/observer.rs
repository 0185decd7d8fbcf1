use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::context::SharedContext;
use crate::media::MediaSource;
use crate::synthesizer::ContextSynthesizer;

#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub url: String,
    pub provider: String,
    pub capture_audio: bool,
    pub capture_video: bool,
    pub interval: Duration,
}

/// What one observation cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Updated(String),
    /// The provider gave nothing usable; the context was kept.
    Unchanged,
    /// The stream is flagged unhealthy and no fresh frame came in.
    SkippedUnhealthy,
    NothingCaptured,
}

/// Periodically captures the stream and refreshes the shared context.
pub struct Observer {
    media: Arc<dyn MediaSource>,
    synthesizer: ContextSynthesizer,
    context: Arc<SharedContext>,
    settings: ObserverSettings,
}

impl Observer {
    pub fn new(
        media: Arc<dyn MediaSource>,
        synthesizer: ContextSynthesizer,
        context: Arc<SharedContext>,
        settings: ObserverSettings,
    ) -> Self {
        Self {
            media,
            synthesizer,
            context,
            settings,
        }
    }

    /// Runs cycles until `cancel` fires, then resets the context to idle.
    ///
    /// Each cycle runs as its own task so a panic inside it is reported in the context
    /// instead of ending the loop.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Watching stream {} (provider {})",
            self.settings.url, self.settings.provider
        );

        loop {
            let observer = self.clone();
            let mut cycle = tokio::spawn(async move { observer.tick().await });

            tokio::select! {
                _ = cancel.cancelled() => {
                    cycle.abort();
                    // The reset below must be the last write to the context.
                    let _ = cycle.await;
                    break;
                }
                joined = &mut cycle => match joined {
                    Ok(outcome) => debug!("Observer cycle finished: {:?}", outcome),
                    Err(e) => {
                        error!("Observer cycle failed: {}", e);
                        self.context.publish(format!("Observer error: {e}"));
                    }
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!("Observer stopped");
        self.context.reset();
    }

    /// One capture + synthesis cycle.
    pub async fn tick(&self) -> TickOutcome {
        let url = &self.settings.url;
        let frame = if self.settings.capture_video {
            self.media.capture_frame(url).await
        } else {
            None
        };
        let audio = if self.settings.capture_audio {
            self.media.capture_audio(url).await
        } else {
            None
        };

        if self.settings.capture_video && !self.context.is_stream_healthy() {
            if frame.is_some() {
                self.context.set_stream_healthy(true);
                info!("Frame recovered, resuming AI calls");
            } else {
                warn!("Skipping AI call after stream discontinuity");
                return TickOutcome::SkippedUnhealthy;
            }
        }

        if frame.is_none() && audio.is_none() {
            let mut missing = Vec::new();
            if self.settings.capture_video {
                missing.push("video");
            }
            if self.settings.capture_audio {
                missing.push("audio");
            }
            if missing.is_empty() {
                warn!("Both captures are disabled, observer is idle");
            } else {
                warn!("Could not capture: {}", missing.join(", "));
            }
            return TickOutcome::NothingCaptured;
        }

        match self
            .synthesizer
            .synthesize(frame.as_deref(), audio.as_deref(), &self.settings.provider)
            .await
        {
            Some(context) => {
                info!("Context updated: {}", context);
                TickOutcome::Updated(context)
            }
            None => TickOutcome::Unchanged,
        }
    }
}
