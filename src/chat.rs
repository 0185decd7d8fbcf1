use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

pub const DEFAULT_SERVER: &str = "irc.chat.twitch.tv:6667";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A chat line posted in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author: String,
    pub channel: String,
    pub text: String,
}

/// The parts of the IRC line protocol we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Ping(String),
    Message(ChatMessage),
    Other,
}

pub fn parse_line(raw: &str) -> Line {
    let mut rest = raw.trim_end_matches(&['\r', '\n'][..]);
    // IRCv3 tags
    if rest.starts_with('@') {
        rest = rest.split_once(' ').map(|(_, r)| r).unwrap_or("");
    }
    let mut prefix = "";
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
        prefix = p;
        rest = r;
    }
    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command {
        "PING" => Line::Ping(params.trim_start_matches(':').to_string()),
        "PRIVMSG" => match params.split_once(" :") {
            Some((channel, text)) => Line::Message(ChatMessage {
                author: prefix.split('!').next().unwrap_or("").to_string(),
                channel: channel.trim_start_matches('#').to_string(),
                text: text.to_string(),
            }),
            None => Line::Other,
        },
        _ => Line::Other,
    }
}

fn channel_name(channel: &str) -> String {
    format!("#{}", channel.trim_start_matches('#').to_lowercase())
}

fn oauth_token(token: &str) -> String {
    if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{token}")
    }
}

/// Strips line breaks so one message is always exactly one protocol line.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Opens a TCP connection to `server`, through an HTTP `CONNECT` proxy if given.
async fn open_stream(server: &str, proxy: Option<&str>) -> Result<TcpStream> {
    let Some(proxy) = proxy else {
        return tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(server))
            .await
            .with_context(|| format!("connecting to {server} timed out"))?
            .with_context(|| format!("cannot connect to {server}"));
    };

    let proxy_addr = proxy
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string();
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&proxy_addr))
        .await
        .with_context(|| format!("connecting to proxy {proxy_addr} timed out"))?
        .with_context(|| format!("cannot connect to proxy {proxy_addr}"))?;
    stream
        .write_all(format!("CONNECT {server} HTTP/1.1\r\nHost: {server}\r\n\r\n").as_bytes())
        .await?;

    // Read the proxy's reply byte by byte so nothing past the header is consumed.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > 8192 {
            bail!("proxy {proxy_addr} sent an oversized reply");
        }
        let n = tokio::time::timeout(CONNECT_TIMEOUT, stream.read(&mut byte))
            .await
            .context("proxy handshake timed out")??;
        if n == 0 {
            bail!("proxy {proxy_addr} closed the connection");
        }
        head.push(byte[0]);
    }
    let status_line = String::from_utf8_lossy(&head);
    let status_line = status_line.lines().next().unwrap_or("");
    if status_line.split_whitespace().nth(1) != Some("200") {
        bail!("proxy {proxy_addr} refused tunnel: {status_line}");
    }
    Ok(stream)
}

async fn handshake<W: AsyncWrite + Unpin>(
    writer: &mut W,
    username: &str,
    token: &str,
    channel: &str,
) -> Result<()> {
    let lines = format!(
        "PASS {}\r\nNICK {}\r\nJOIN {}\r\n",
        oauth_token(token),
        username.to_lowercase(),
        channel_name(channel)
    );
    writer.write_all(lines.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Cloneable handle for posting into the joined channel.
#[derive(Clone)]
pub struct ChatSender {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    channel: String,
    connected: Arc<AtomicBool>,
}

impl ChatSender {
    pub async fn say(&self, text: &str) -> Result<()> {
        self.send_raw(&format!("PRIVMSG {} :{}", self.channel, single_line(text)))
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_raw(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// A persona's long-lived connection to one channel.
pub struct ChatSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    sender: ChatSender,
    username: String,
}

impl ChatSession {
    pub async fn connect(
        server: &str,
        username: &str,
        token: &str,
        channel: &str,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let stream = open_stream(server, proxy).await?;
        let (read, mut write) = stream.into_split();
        handshake(&mut write, username, token, channel).await?;
        debug!("{} joined {}", username, channel_name(channel));

        Ok(Self {
            lines: BufReader::new(read).lines(),
            sender: ChatSender {
                writer: Arc::new(Mutex::new(write)),
                channel: channel_name(channel),
                connected: Arc::new(AtomicBool::new(true)),
            },
            username: username.to_string(),
        })
    }

    pub fn sender(&self) -> ChatSender {
        self.sender.clone()
    }

    /// Next protocol line. `Ok(None)` once the server closes the connection.
    ///
    /// Cancel safe: only reads.
    pub async fn next_line(&mut self) -> Result<Option<Line>> {
        match self.lines.next_line().await {
            Ok(Some(raw)) => Ok(Some(parse_line(&raw))),
            Ok(None) => {
                self.sender.connected.store(false, Ordering::SeqCst);
                Ok(None)
            }
            Err(e) => {
                self.sender.connected.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    pub async fn pong(&self, payload: &str) -> Result<()> {
        self.sender.send_raw(&format!("PONG :{payload}")).await
    }

    /// True when `message` was written by this session's own account.
    pub fn is_echo(&self, message: &ChatMessage) -> bool {
        message.author.eq_ignore_ascii_case(&self.username)
    }

    pub async fn quit(self) {
        self.sender.connected.store(false, Ordering::SeqCst);
        let _ = self.sender.send_raw("QUIT").await;
        let _ = self.sender.writer.lock().await.shutdown().await;
    }
}

/// One-off post: connect, authenticate, join, send one line, quit, close.
pub async fn send_once(
    server: &str,
    username: &str,
    token: &str,
    channel: &str,
    text: &str,
    proxy: Option<&str>,
) -> Result<()> {
    let mut stream = open_stream(server, proxy).await?;
    handshake(&mut stream, username, token, channel).await?;
    let tail = format!(
        "PRIVMSG {} :{}\r\nQUIT\r\n",
        channel_name(channel),
        single_line(text)
    );
    stream.write_all(tail.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}
