use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatMessage, ChatSender, ChatSession, Line};
use crate::context::SharedContext;
use crate::gateway::{is_error_reply, AiBackend, Prompt};

const DEFAULT_PERSONALITY: &str = "viewer";

const PERSONALITIES: [(&str, &str); 5] = [
    (
        "viewer",
        "You are an ordinary Twitch viewer who just wants to chat and support the streamer.",
    ),
    (
        "gamer",
        "You are an active gamer who knows the game being streamed. You discuss game moments and share your experience.",
    ),
    (
        "hater",
        "You are a slightly toxic hater who likes to tease the streamer and other viewers and may criticise the game.",
    ),
    (
        "polite",
        "You are a polite and positive viewer who always supports the streamer and other viewers and avoids conflicts.",
    ),
    (
        "troll",
        "You are a troll who stays within Twitch rules. You like to joke and provoke, act as an expert adviser who keeps saying how to play better, a bit tedious.",
    ),
];

/// Characters dropped from model output before it is posted.
const MARKUP: [char; 7] = ['*', '`', '"', '“', '”', '«', '»'];

pub fn personality_description(tag: &str) -> &'static str {
    PERSONALITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .or_else(|| PERSONALITIES.iter().find(|(name, _)| *name == DEFAULT_PERSONALITY))
        .map(|(_, description)| *description)
        .unwrap_or_default()
}

/// A chat account driven by one persona.
#[derive(Clone, Deserialize)]
pub struct PersonaAccount {
    pub username: String,
    pub token: String,
    #[serde(default = "default_personality")]
    pub personality: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_personality() -> String {
    DEFAULT_PERSONALITY.to_string()
}

fn default_active() -> bool {
    true
}

impl std::fmt::Debug for PersonaAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaAccount")
            .field("username", &self.username)
            .field("personality", &self.personality)
            .field("proxy", &self.proxy)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Tunables shared by every persona in a swarm.
#[derive(Debug, Clone)]
pub struct PersonaSettings {
    pub chat_server: String,
    pub channel: String,
    pub provider: String,
    pub send_chat: bool,
    /// Chance of answering any given inbound message.
    pub reply_probability: f64,
    pub speak_min: Duration,
    pub speak_max: Duration,
    /// Chance of doubling one character in an outgoing message.
    pub typo_probability: f64,
    pub typing_delay_min: Duration,
    pub typing_delay_max: Duration,
    pub reconnect_delay: Duration,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            chat_server: crate::chat::DEFAULT_SERVER.to_string(),
            channel: String::new(),
            provider: "groq".into(),
            send_chat: true,
            reply_probability: 0.3,
            speak_min: Duration::from_secs(60),
            speak_max: Duration::from_secs(180),
            typo_probability: 0.3,
            typing_delay_min: Duration::from_millis(50),
            typing_delay_max: Duration::from_millis(150),
            reconnect_delay: Duration::from_secs(30),
        }
    }
}

pub fn reply_prompt(personality: &str, context: &str, message: &str) -> String {
    format!(
        "Stream context: {context}\n\
         Last chat message: {message}\n\
         Personality: {personality}\n\
         Answer briefly, like a human.\n\
         Do not use formatting, emoji or links.\n\
         Occasional spelling mistakes are fine, they make you sound human.\n\
         Don't try to be too smart, just keep the conversation going if you can."
    )
}

pub fn idle_prompt(personality: &str, context: &str) -> String {
    format!(
        "Stream context: {context}\n\
         Personality: {personality}\n\
         Write a short greeting or neutral message for the chat. No formatting, emoji or links."
    )
}

/// Cleans model output into something a chatter would type.
///
/// First non-blank line, markup and quote characters removed, lower case, nothing but
/// letters or digits at either end. `None` when nothing is left.
pub fn postprocess(raw: &str) -> Option<String> {
    let line = raw.lines().find(|l| !l.trim().is_empty())?;
    let cleaned: String = line.chars().filter(|c| !MARKUP.contains(c)).collect();
    let lowered = cleaned.to_lowercase();
    // covers …, — and ¿ as well as ASCII marks
    let trimmed = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// With `probability`, doubles one random character.
pub fn apply_typo<R: Rng + ?Sized>(text: &str, rng: &mut R, probability: f64) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || !rng.gen_bool(probability.clamp(0.0, 1.0)) {
        return text.to_string();
    }
    let pos = rng.gen_range(0..chars.len());
    chars.insert(pos, chars[pos]);
    chars.into_iter().collect()
}

/// How long a human would take to type `text`.
pub fn typing_delay<R: Rng + ?Sized>(text: &str, rng: &mut R, min: Duration, max: Duration) -> Duration {
    let per_char = if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    };
    per_char * text.chars().count() as u32
}

fn speak_interval<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// One chat participant: answers some inbound messages and speaks up on its own.
pub struct PersonaBot {
    account: PersonaAccount,
    settings: Arc<PersonaSettings>,
    backend: Arc<dyn AiBackend>,
    context: Arc<SharedContext>,
}

impl PersonaBot {
    pub fn new(
        account: PersonaAccount,
        settings: Arc<PersonaSettings>,
        backend: Arc<dyn AiBackend>,
        context: Arc<SharedContext>,
    ) -> Self {
        Self {
            account,
            settings,
            backend,
            context,
        }
    }

    pub fn username(&self) -> &str {
        &self.account.username
    }

    /// Keeps the persona online until cancelled, reconnecting after dropped sessions.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        loop {
            let session = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                session = ChatSession::connect(
                    &self.settings.chat_server,
                    &self.account.username,
                    &self.account.token,
                    &self.settings.channel,
                    self.account.proxy.as_deref(),
                ) => session,
            };
            match session {
                Ok(session) => {
                    info!("{} joined #{}", self.account.username, self.settings.channel);
                    if let Err(e) = self.clone().serve(session, cancel.clone()).await {
                        warn!("{} lost its chat session: {:#}", self.account.username, e);
                    }
                }
                Err(e) => warn!("{} could not connect: {:#}", self.account.username, e),
            }
            if cancel.is_cancelled() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }
    }

    /// Drives one connected session until it closes or `cancel` fires.
    async fn serve(self: Arc<Self>, mut session: ChatSession, cancel: CancellationToken) -> Result<()> {
        let sender = session.sender();
        let speaker_cancel = cancel.child_token();
        let speaker = tokio::spawn(self.clone().periodic_speak(sender.clone(), speaker_cancel.clone()));
        let mut reactions = JoinSet::new();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                Some(joined) = reactions.join_next(), if !reactions.is_empty() => {
                    if let Err(e) = joined {
                        error!("{} reaction task failed: {}", self.account.username, e);
                    }
                }
                line = session.next_line() => match line {
                    Ok(Some(Line::Ping(payload))) => {
                        if let Err(e) = session.pong(&payload).await {
                            break Err(e);
                        }
                    }
                    Ok(Some(Line::Message(message))) => {
                        if session.is_echo(&message) {
                            continue;
                        }
                        let bot = self.clone();
                        let sender = sender.clone();
                        reactions.spawn(async move { bot.react(message, sender).await });
                    }
                    Ok(Some(Line::Other)) => {}
                    Ok(None) => break Err(anyhow!("server closed the connection")),
                    Err(e) => break Err(e),
                },
            }
        };

        speaker_cancel.cancel();
        speaker.abort();
        reactions.shutdown().await;
        session.quit().await;
        result
    }

    /// Maybe answers one inbound message. Errors stay inside this reaction.
    async fn react(&self, message: ChatMessage, sender: ChatSender) {
        if !self.settings.send_chat {
            return;
        }
        let roll: f64 = rand::thread_rng().gen();
        if roll >= self.settings.reply_probability {
            return;
        }
        debug!(
            "{} answering {} in {}: {}",
            self.account.username, message.author, message.channel, message.text
        );

        let prompt = reply_prompt(
            personality_description(&self.account.personality),
            &self.context.snapshot(),
            &message.text,
        );
        let reply = self
            .backend
            .chat_complete(Prompt::Text(prompt), &self.settings.provider, None)
            .await;
        if let Err(e) = self.deliver(&reply, &sender).await {
            warn!("{} could not send reply: {:#}", self.account.username, e);
        }
    }

    /// Posts an unprompted message every `[speak_min, speak_max]`.
    async fn periodic_speak(self: Arc<Self>, sender: ChatSender, cancel: CancellationToken) {
        loop {
            let wait = speak_interval(
                &mut rand::thread_rng(),
                self.settings.speak_min,
                self.settings.speak_max,
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            if !sender.is_connected() || !self.settings.send_chat {
                continue;
            }

            let prompt = idle_prompt(
                personality_description(&self.account.personality),
                &self.context.snapshot(),
            );
            let reply = self
                .backend
                .chat_complete(Prompt::Text(prompt), &self.settings.provider, None)
                .await;
            if let Err(e) = self.deliver(&reply, &sender).await {
                warn!("{} could not speak: {:#}", self.account.username, e);
            }
        }
    }

    /// Cleans, humanizes and sends a model reply. Error replies are dropped.
    async fn deliver(&self, reply: &str, sender: &ChatSender) -> Result<()> {
        if is_error_reply(reply) {
            debug!("{} staying quiet after: {}", self.account.username, reply);
            return Ok(());
        }
        let Some(text) = postprocess(reply) else {
            return Ok(());
        };

        let (text, delay) = {
            let mut rng = rand::thread_rng();
            let text = apply_typo(&text, &mut rng, self.settings.typo_probability);
            let delay = typing_delay(
                &text,
                &mut rng,
                self.settings.typing_delay_min,
                self.settings.typing_delay_max,
            );
            (text, delay)
        };
        tokio::time::sleep(delay).await;
        sender.say(&text).await?;
        info!("[{}] {}", self.account.username, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;
    use crate::synthesizer::tests::FakeBackend;

    #[test]
    fn postprocess_lowercases_and_strips_punctuation() {
        assert_eq!(postprocess("Hello, World!!").as_deref(), Some("hello, world"));
        assert_eq!(postprocess("\"Nice Play.\"").as_deref(), Some("nice play"));
        assert_eq!(postprocess("**GG** wp...").as_deref(), Some("gg wp"));
        assert_eq!(postprocess("«Don't do it»").as_deref(), Some("don't do it"));
        assert_eq!(postprocess("\n\nfirst line\nsecond line").as_deref(), Some("first line"));
        assert_eq!(postprocess("?!..."), None);
        assert_eq!(postprocess("Ну да…").as_deref(), Some("ну да"));
        assert_eq!(postprocess("¿Qué pasa?").as_deref(), Some("qué pasa"));
        assert_eq!(postprocess("— wow, nice —").as_deref(), Some("wow, nice"));
        assert_eq!(postprocess("…"), None);
        assert_eq!(postprocess("   "), None);
    }

    #[test]
    fn typo_doubles_exactly_one_character() {
        let mut rng = StdRng::seed_from_u64(7);
        let typed = apply_typo("hello", &mut rng, 1.0);
        assert_eq!(typed.chars().count(), 6);
        let chars: Vec<char> = typed.chars().collect();
        let undone = (0..chars.len() - 1).any(|i| {
            chars[i] == chars[i + 1] && {
                let mut without = chars.clone();
                without.remove(i);
                without.into_iter().collect::<String>() == "hello"
            }
        });
        assert!(undone, "{typed}");

        assert_eq!(apply_typo("hello", &mut rng, 0.0), "hello");
        assert_eq!(apply_typo("", &mut rng, 1.0), "");
    }

    #[test]
    fn typo_handles_multibyte_text() {
        let mut rng = StdRng::seed_from_u64(1);
        let typed = apply_typo("привет", &mut rng, 1.0);
        assert_eq!(typed.chars().count(), 7);
    }

    #[test]
    fn typing_delay_scales_with_length() {
        let mut rng = StdRng::seed_from_u64(3);
        let min = Duration::from_millis(50);
        let max = Duration::from_millis(150);
        let delay = typing_delay("abcdefghij", &mut rng, min, max);
        assert!(delay >= min * 10 && delay <= max * 10, "{delay:?}");
        assert_eq!(typing_delay("", &mut rng, min, max), Duration::ZERO);
        assert_eq!(
            typing_delay("abc", &mut rng, Duration::ZERO, Duration::ZERO),
            Duration::ZERO
        );
    }

    #[test]
    fn speak_interval_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let (min, max) = (Duration::from_secs(45), Duration::from_secs(180));
        for _ in 0..100 {
            let wait = speak_interval(&mut rng, min, max);
            assert!(wait >= min && wait <= max);
        }
        assert_eq!(speak_interval(&mut rng, max, max), max);
    }

    #[test]
    fn unknown_personality_falls_back_to_viewer() {
        assert_eq!(
            personality_description("nonexistent"),
            personality_description("viewer")
        );
        assert!(personality_description("Troll").contains("troll"));
    }

    #[test]
    fn prompts_embed_context_message_and_personality() {
        let prompt = reply_prompt("You are a gamer.", "Boss fight at low HP.", "he's dead lol");
        assert!(prompt.contains("Stream context: Boss fight at low HP."));
        assert!(prompt.contains("Last chat message: he's dead lol"));
        assert!(prompt.contains("Personality: You are a gamer."));

        let idle = idle_prompt("You are polite.", "Menu screen.");
        assert!(idle.contains("Stream context: Menu screen."));
        assert!(!idle.contains("Last chat message"));
    }

    #[test]
    fn account_debug_hides_the_token() {
        let account = PersonaAccount {
            username: "ghost".into(),
            token: "secret-token".into(),
            personality: "viewer".into(),
            proxy: None,
            active: true,
        };
        assert!(!format!("{account:?}").contains("secret-token"));
    }

    fn quick_settings(server: String, reply_probability: f64) -> Arc<PersonaSettings> {
        Arc::new(PersonaSettings {
            chat_server: server,
            channel: "streamer".into(),
            provider: "groq".into(),
            send_chat: true,
            reply_probability,
            speak_min: Duration::from_secs(3600),
            speak_max: Duration::from_secs(3600),
            typo_probability: 0.0,
            typing_delay_min: Duration::ZERO,
            typing_delay_max: Duration::ZERO,
            reconnect_delay: Duration::from_millis(50),
        })
    }

    fn account() -> PersonaAccount {
        PersonaAccount {
            username: "ghost".into(),
            token: "tok".into(),
            personality: "gamer".into(),
            proxy: None,
            active: true,
        }
    }

    /// Fake chat server: sends `script` after the handshake and returns the first
    /// PRIVMSG the persona posts (or `None` if it posts nothing in time).
    async fn chat_round_trip(
        reply_probability: f64,
        backend: FakeBackend,
        script: &'static [u8],
    ) -> (Option<String>, Arc<FakeBackend>) {
        chat_round_trip_with(|s| s.reply_probability = reply_probability, backend, script).await
    }

    async fn chat_round_trip_with(
        tweak: impl FnOnce(&mut PersonaSettings),
        backend: FakeBackend,
        script: &'static [u8],
    ) -> (Option<String>, Arc<FakeBackend>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let backend = Arc::new(backend);
        let context = Arc::new(SharedContext::new());
        context.publish("Speedrunning a platformer.");
        let mut settings = (*quick_settings(addr, 0.0)).clone();
        tweak(&mut settings);
        let bot = Arc::new(PersonaBot::new(
            account(),
            Arc::new(settings),
            backend.clone(),
            context,
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(bot.run(cancel.clone()));

        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        write.write_all(script).await.unwrap();
        let mut lines = BufReader::new(read).lines();
        let posted = tokio::time::timeout(Duration::from_millis(500), async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line.starts_with("PRIVMSG") {
                    return Some(line);
                }
            }
            None
        })
        .await
        .unwrap_or(None);

        cancel.cancel();
        task.await.unwrap().unwrap();
        (posted, backend)
    }

    #[tokio::test]
    async fn replies_are_cleaned_before_posting() {
        let (posted, backend) = chat_round_trip(
            1.0,
            FakeBackend::replying("Hello, World!!"),
            b":viewer!viewer@x PRIVMSG #streamer :what game is this?\r\n",
        )
        .await;

        assert_eq!(posted.as_deref(), Some("PRIVMSG #streamer :hello, world"));
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("Speedrunning a platformer."));
        assert!(prompt.contains("what game is this?"));
    }

    #[tokio::test]
    async fn error_replies_are_never_posted() {
        let (posted, _) = chat_round_trip(
            1.0,
            FakeBackend::replying("Error: groq request timed out"),
            b":viewer!viewer@x PRIVMSG #streamer :hi\r\n",
        )
        .await;
        assert_eq!(posted, None);
    }

    #[tokio::test]
    async fn zero_reply_probability_stays_silent() {
        let (posted, backend) = chat_round_trip(
            0.0,
            FakeBackend::replying("hey"),
            b":viewer!viewer@x PRIVMSG #streamer :hi\r\n",
        )
        .await;
        assert_eq!(posted, None);
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let (posted, backend) = chat_round_trip(
            1.0,
            FakeBackend::replying("hey"),
            b":ghost!ghost@x PRIVMSG #streamer :my own line\r\n",
        )
        .await;
        assert_eq!(posted, None);
        assert!(backend.prompts().is_empty());
    }

    fn chatty(settings: &mut PersonaSettings) {
        settings.speak_min = Duration::from_millis(10);
        settings.speak_max = Duration::from_millis(20);
    }

    #[tokio::test]
    async fn speaks_unprompted_from_the_context() {
        let (posted, backend) =
            chat_round_trip_with(chatty, FakeBackend::replying("**Hey chat!**"), b"").await;

        assert_eq!(posted.as_deref(), Some("PRIVMSG #streamer :hey chat"));
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("Stream context: Speedrunning a platformer."));
        assert!(prompt.contains("Write a short greeting"));
        assert!(!prompt.contains("Last chat message"));
    }

    #[tokio::test]
    async fn unprompted_speech_respects_send_chat() {
        let (posted, backend) = chat_round_trip_with(
            |s| {
                chatty(s);
                s.send_chat = false;
            },
            FakeBackend::replying("hey chat"),
            b"",
        )
        .await;
        assert_eq!(posted, None);
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn disconnected_sender_stays_quiet() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut settings = (*quick_settings(addr.clone(), 0.0)).clone();
        chatty(&mut settings);
        let backend = Arc::new(FakeBackend::replying("hey chat"));
        let bot = Arc::new(PersonaBot::new(
            account(),
            Arc::new(settings),
            backend.clone(),
            Arc::new(SharedContext::new()),
        ));

        let mut session = ChatSession::connect(&addr, "ghost", "tok", "streamer", None)
            .await
            .unwrap();
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
        while let Ok(Some(_)) = session.next_line().await {}
        let sender = session.sender();
        assert!(!sender.is_connected());

        let cancel = CancellationToken::new();
        let speaker = tokio::spawn(bot.periodic_speak(sender, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        speaker.await.unwrap();
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn cancel_during_connect_backoff_returns_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut settings = (*quick_settings(addr, 1.0)).clone();
        settings.reconnect_delay = Duration::from_secs(3600);
        let bot = Arc::new(PersonaBot::new(
            account(),
            Arc::new(settings),
            Arc::new(FakeBackend::replying("x")),
            Arc::new(SharedContext::new()),
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(bot.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
