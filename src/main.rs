mod api;
mod chat;
mod config;
mod context;
mod error;
mod gateway;
mod key_pool;
mod media;
mod observer;
mod persona;
mod providers;
mod swarm;
mod synthesizer;
mod utilities;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use tokio::join;
use tokio_util::sync::CancellationToken;

use crate::api::ApiState;
use crate::config::{Cli, Config};
use crate::context::SharedContext;
use crate::gateway::{AiBackend, AiGateway};
use crate::key_pool::{KeyPool, MemoryCredentialStore};
use crate::media::MediaCapture;
use crate::observer::Observer;
use crate::providers::ProviderRegistry;
use crate::swarm::BotSwarm;
use crate::synthesizer::ContextSynthesizer;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config).await?;
    config.apply_cli(&cli);

    if let Some(text) = &cli.say {
        config.validate_chat()?;
        let sent = swarm::announce(&config.accounts, &config.persona_settings(), text).await;
        info!("Posted from {} account(s)", sent);
        return Ok(());
    }
    config.validate()?;

    let pool = KeyPool::new(Arc::new(MemoryCredentialStore::new(
        config.credentials.clone(),
    )));
    let providers = Arc::new(ProviderRegistry::builtin().with_overrides(&config.providers));
    let backend: Arc<dyn AiBackend> = Arc::new(AiGateway::new(pool.clone(), providers));
    let context = Arc::new(SharedContext::new());
    let cancel = CancellationToken::new();

    let media = Arc::new(MediaCapture::new(config.capture_settings(), context.clone()));
    let synthesizer = ContextSynthesizer::new(backend.clone(), context.clone());
    let observer = Arc::new(Observer::new(
        media,
        synthesizer,
        context.clone(),
        config.observer_settings(),
    ));
    if cli.check {
        let outcome = observer.tick().await;
        info!("Check finished: {:?}", outcome);
        println!("{}", context.snapshot());
        return Ok(());
    }
    let observing = tokio::spawn(observer.run(cancel.clone()));

    let mut swarm = BotSwarm::new(cancel.clone());
    swarm.launch_personas(
        &config.accounts,
        Arc::new(config.persona_settings()),
        backend,
        context.clone(),
    );
    let chatting = tokio::spawn(swarm.supervise());

    let api_server = {
        let bind = config.api.bind.clone();
        let state = ApiState {
            context: context.clone(),
            pool,
        };
        let cancel = cancel.clone();
        async move {
            let Some(bind) = bind else { return };
            tokio::select! {
                _ = cancel.cancelled() => {}
                served = api::run_api_server(&bind, state) => {
                    if let Err(e) = served {
                        error!("Status API error: {:?}", e);
                    }
                }
            }
        }
    };
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down"),
            Err(e) => error!("Cannot listen for Ctrl-C, shutting down: {}", e),
        }
        cancel.cancel();
    };

    // Run the observer, swarm and API server concurrently until Ctrl-C
    let (_, observed, chatted, _) = join!(shutdown, observing, chatting, api_server);
    if let Err(e) = observed {
        error!("Observer task error: {:?}", e);
    }
    if let Err(e) = chatted {
        error!("Swarm task error: {:?}", e);
    }
    info!("Final context: {}", context.snapshot());
    Ok(())
}
