use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::BaseNotifier;
use crate::common::NotificationMessage;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram albums hold at most this many photos in one message.
const MAX_ALBUM_PHOTOS: usize = 4;

/// Sends listing notifications to one Telegram chat.
pub struct TelegramClient {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            bot_token,
            chat_id,
            client,
        })
    }

    async fn call(&self, method: &str, body: &Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/bot{}/{}", API_BASE, self.bot_token, method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send Telegram {} request", method))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Telegram {} failed ({}): {}", method, status, text);
        }

        debug!(method, "telegram call succeeded");
        Ok(())
    }
}

#[async_trait]
impl BaseNotifier for TelegramClient {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let (method, body) = content_request(&self.chat_id, message);
        self.call(method, &body).await?;

        if !message.links.is_empty() {
            self.call("sendMessage", &buttons_request(&self.chat_id, message))
                .await?;
        }

        Ok(())
    }
}

/// Album for two or more photos, a single photo, or plain text.
fn content_request(chat_id: &str, message: &NotificationMessage) -> (&'static str, Value) {
    match message.photos.as_slice() {
        [] => (
            "sendMessage",
            json!({ "chat_id": chat_id, "text": message.caption, "parse_mode": "HTML" }),
        ),
        [photo] => (
            "sendPhoto",
            json!({
                "chat_id": chat_id,
                "photo": photo,
                "caption": message.caption,
                "parse_mode": "HTML",
            }),
        ),
        photos => {
            let media: Vec<Value> = photos
                .iter()
                .take(MAX_ALBUM_PHOTOS)
                .enumerate()
                .map(|(i, url)| {
                    if i == 0 {
                        json!({
                            "type": "photo",
                            "media": url,
                            "caption": message.caption,
                            "parse_mode": "HTML",
                        })
                    } else {
                        json!({ "type": "photo", "media": url })
                    }
                })
                .collect();
            (
                "sendMediaGroup",
                json!({ "chat_id": chat_id, "media": media }),
            )
        }
    }
}

/// Albums can't carry inline keyboards, so links go in a follow-up message.
fn buttons_request(chat_id: &str, message: &NotificationMessage) -> Value {
    let rows: Vec<Value> = message
        .links
        .iter()
        .map(|link| json!([{ "text": link.text, "url": link.url }]))
        .collect();

    json!({
        "chat_id": chat_id,
        "text": "\u{200b}",
        "reply_markup": { "inline_keyboard": rows },
    })
}
