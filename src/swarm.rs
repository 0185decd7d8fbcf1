use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chat::send_once;
use crate::context::SharedContext;
use crate::gateway::AiBackend;
use crate::persona::{PersonaAccount, PersonaBot, PersonaSettings};

/// Runs a set of named tasks under one cancellation token.
///
/// A task that errors or panics is logged and removed; its siblings keep running.
pub struct BotSwarm {
    tasks: JoinSet<(String, Result<()>)>,
    cancel: CancellationToken,
}

impl BotSwarm {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Spawns `task` with a child of the swarm's token.
    pub fn launch<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let fut = task(self.cancel.child_token());
        self.tasks.spawn(async move { (name, fut.await) });
    }

    /// One task per active account.
    pub fn launch_personas(
        &mut self,
        accounts: &[PersonaAccount],
        settings: Arc<PersonaSettings>,
        backend: Arc<dyn AiBackend>,
        context: Arc<SharedContext>,
    ) {
        for account in accounts.iter().filter(|a| a.active) {
            let bot = Arc::new(PersonaBot::new(
                account.clone(),
                settings.clone(),
                backend.clone(),
                context.clone(),
            ));
            let name = bot.username().to_string();
            self.launch(name, move |cancel| bot.run(cancel));
        }
        info!("Swarm running {} persona(s)", self.tasks.len());
    }

    /// Waits for every task to finish, or for cancellation, which aborts the rest.
    pub async fn supervise(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Give tasks a chance to unwind on their own token first.
                    let drain = async {
                        while let Some(joined) = self.tasks.join_next().await {
                            report(joined);
                        }
                    };
                    if tokio::time::timeout(std::time::Duration::from_secs(5), drain).await.is_err() {
                        warn!("Aborting {} persona task(s) that did not stop", self.tasks.len());
                        self.tasks.shutdown().await;
                    }
                    break;
                }
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => report(joined),
                    None => break,
                },
            }
        }
        info!("Swarm stopped");
    }
}

/// Posts `text` once from every active account over a fresh connection each.
///
/// Returns how many posts went out; failures are logged and skipped.
pub async fn announce(accounts: &[PersonaAccount], settings: &PersonaSettings, text: &str) -> usize {
    let mut sent = 0;
    for account in accounts.iter().filter(|a| a.active) {
        match send_once(
            &settings.chat_server,
            &account.username,
            &account.token,
            &settings.channel,
            text,
            account.proxy.as_deref(),
        )
        .await
        {
            Ok(()) => {
                info!("[{}] {}", account.username, text);
                sent += 1;
            }
            Err(e) => error!("{} could not post: {:#}", account.username, e),
        }
    }
    sent
}

fn report(joined: std::result::Result<(String, Result<()>), tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => info!("{} finished", name),
        Ok((name, Err(e))) => error!("{} failed: {:#}", name, e),
        Err(e) if e.is_panic() => error!("Persona task panicked: {}", e),
        Err(e) => warn!("Persona task cancelled: {}", e),
    }
}
