use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::common::Destination;
use crate::kernel::{DEFAULT_ANTHROPIC_MODEL, DEFAULT_VALHALLA_URL};

/// Used when `ROUTE_DESTINATIONS` is not set.
pub const DEFAULT_ROUTE_DESTINATIONS: &str = "fareharbor:52.3599,4.8912;airwallex:52.37,4.8878";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Bearer token required by the sync endpoint. Sync is disabled when unset.
    pub sync_token: Option<String>,
    pub valhalla_url: String,
    pub route_destinations: Vec<Destination>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Base URL of the web app, used for links in notifications
    pub public_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let route_destinations = parse_destinations(
            &env::var("ROUTE_DESTINATIONS")
                .unwrap_or_else(|_| DEFAULT_ROUTE_DESTINATIONS.to_string()),
        )
        .context("ROUTE_DESTINATIONS must look like name:lat,lon;name:lat,lon")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            sync_token: non_empty_var("SYNC_TOKEN"),
            valhalla_url: env::var("VALHALLA_URL")
                .unwrap_or_else(|_| DEFAULT_VALHALLA_URL.to_string()),
            route_destinations,
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            anthropic_model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_MODEL.to_string()),
            telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
            public_origin: env::var("PUBLIC_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }

    /// Telegram credentials, only when both halves are present.
    pub fn telegram(&self) -> Option<(String, String)> {
        Some((
            self.telegram_bot_token.clone()?,
            self.telegram_chat_id.clone()?,
        ))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name:lat,lon;name:lat,lon`.
pub fn parse_destinations(raw: &str) -> Result<Vec<Destination>> {
    let mut destinations = Vec::new();

    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, coords) = part
            .split_once(':')
            .with_context(|| format!("missing ':' in destination {:?}", part))?;
        let (lat, lon) = coords
            .split_once(',')
            .with_context(|| format!("missing ',' in destination {:?}", part))?;

        let lat: f64 = lat
            .trim()
            .parse()
            .with_context(|| format!("invalid latitude in {:?}", part))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .with_context(|| format!("invalid longitude in {:?}", part))?;

        let name = name.trim();
        if name.is_empty() {
            bail!("empty destination name in {:?}", part);
        }
        if destinations.iter().any(|d: &Destination| d.name == name) {
            bail!("duplicate destination {:?}", name);
        }

        destinations.push(Destination::new(name, lat, lon));
    }

    if destinations.is_empty() {
        bail!("at least one destination is required");
    }

    Ok(destinations)
}
