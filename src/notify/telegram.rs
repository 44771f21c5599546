use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::Notifier;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const START_REPLY: &str =
    "✅ Бот работает: мониторю Wildberries + Яндекс.Маркет. Публикую аномально дешёвые товары.";

/// Telegram Bot API client posting to one channel.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    /// Keep previews on: Telegram pulls the product photo from the link.
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<()> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };
        let url = self.method_url("sendMessage");

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(rsp) => {
                        let body: ApiResponse<serde_json::Value> =
                            rsp.json().await.context("telegram sendMessage body")?;
                        if body.ok {
                            return Ok(());
                        }
                        // API-level rejection (bad chat, bad markup): retrying won't help.
                        return Err(anyhow!(
                            "telegram rejected message: {}",
                            body.description.unwrap_or_default()
                        ));
                    }
                    Err(e) => anyhow!("telegram HTTP error: {}", redact(&e, &self.token)),
                },
                Err(e) => anyhow!("telegram request failed: {}", redact(&e, &self.token)),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "telegram send retry");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }

    /// One long-poll round of `getUpdates` starting at `offset`.
    pub async fn get_updates(&self, offset: i64, poll_secs: u64) -> Result<Vec<Update>> {
        let rsp = self
            .client
            .get(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(poll_secs + 10))
            .query(&[("offset", offset.to_string()), ("timeout", poll_secs.to_string())])
            .send()
            .await
            .map_err(|e| anyhow!("telegram getUpdates failed: {}", redact(&e, &self.token)))?;
        let body: ApiResponse<Vec<Update>> = rsp.json().await.context("telegram getUpdates body")?;
        if !body.ok {
            anyhow::bail!("telegram getUpdates: {}", body.description.unwrap_or_default());
        }
        Ok(body.result.unwrap_or_default())
    }

    /// Answer `/start` in any chat until `shutdown` flips to true.
    pub async fn run_command_listener(&self, mut shutdown: watch::Receiver<bool>) {
        const POLL_SECS: u64 = 25;
        let mut offset = 0i64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let round = tokio::select! {
                r = self.get_updates(offset, POLL_SECS) => r,
                _ = shutdown.changed() => break,
            };
            match round {
                Ok(updates) => {
                    for u in updates {
                        offset = offset.max(u.update_id + 1);
                        let Some(msg) = u.message else { continue };
                        if !is_start_command(msg.text.as_deref()) {
                            continue;
                        }
                        if let Err(e) = self.send_to(&msg.chat.id.to_string(), START_REPLY).await {
                            tracing::warn!(error = ?e, "reply to /start failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "telegram command poll failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        tracing::debug!("telegram command listener stopped");
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.send_to(&self.chat_id, text).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// `/start` or `/start@SomeBot`, optionally followed by a payload.
pub fn is_start_command(text: Option<&str>) -> bool {
    let Some(first) = text.and_then(|t| t.split_whitespace().next()) else {
        return false;
    };
    first == "/start" || first.starts_with("/start@")
}

/// reqwest errors embed the URL, and the URL embeds the bot token.
fn redact(e: &reqwest::Error, token: &str) -> String {
    let s = e.to_string();
    if token.is_empty() {
        s
    } else {
        s.replace(token, "<token>")
    }
}
