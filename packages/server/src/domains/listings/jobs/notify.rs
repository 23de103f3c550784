use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::common::{LinkButton, NotificationMessage};
use crate::domains::listings::models::Listing;
use crate::kernel::jobs::{Job, JobHandler, JobOutcome};
use crate::kernel::BaseNotifier;

/// Maximum caption length accepted by the notification channel.
pub const CAPTION_LIMIT: usize = 1024;

const MAX_POSITIVES: usize = 3;
const MAX_NEGATIVES: usize = 2;

/// Expected winning bid relative to the asking price.
const OVERBID_FACTOR: f64 = 1.15;

/// Announces an active, enriched listing once.
pub struct NotifyHandler {
    pool: PgPool,
    notifier: Option<Arc<dyn BaseNotifier>>,
    public_origin: String,
}

impl NotifyHandler {
    pub fn new(
        pool: PgPool,
        notifier: Option<Arc<dyn BaseNotifier>>,
        public_origin: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            notifier,
            public_origin: public_origin.into(),
        }
    }
}

#[async_trait]
impl JobHandler for NotifyHandler {
    async fn execute(&self, job: &Job) -> Result<JobOutcome> {
        let Some(notifier) = &self.notifier else {
            return Ok(JobOutcome::Skipped);
        };

        let Some(listing) = Listing::find_by_id(&job.target_key, &self.pool).await? else {
            return Ok(JobOutcome::Skipped);
        };

        if !listing.is_active() || listing.notified_at.is_some() {
            debug!(external_id = %listing.external_id, "listing not eligible for notification");
            return Ok(JobOutcome::Skipped);
        }

        notifier
            .send(&build_message(&listing, &self.public_origin))
            .await?;
        Listing::mark_notified(&listing.external_id, &self.pool).await?;

        Ok(JobOutcome::Completed)
    }
}

/// Caption, photos and links for one listing.
pub fn build_message(listing: &Listing, public_origin: &str) -> NotificationMessage {
    NotificationMessage {
        caption: build_caption(listing),
        photos: listing.photos.0.clone(),
        links: vec![
            LinkButton {
                text: "Open in Ernest".to_string(),
                url: format!(
                    "{}/?listing={}",
                    public_origin.trim_end_matches('/'),
                    listing.external_id
                ),
            },
            LinkButton {
                text: "View listing".to_string(),
                url: listing.url.clone(),
            },
        ],
    }
}

/// HTML caption within [`CAPTION_LIMIT`].
///
/// Positives are dropped first when too long, then negatives.
pub fn build_caption(listing: &Listing) -> String {
    let positives: Vec<&str> = listing
        .ai_positives
        .iter()
        .flatten()
        .take(MAX_POSITIVES)
        .map(String::as_str)
        .collect();
    let negatives: Vec<&str> = listing
        .ai_negatives
        .iter()
        .flatten()
        .take(MAX_NEGATIVES)
        .map(String::as_str)
        .collect();

    let caption = assemble(listing, &positives, &negatives);
    if caption.chars().count() <= CAPTION_LIMIT {
        return caption;
    }

    let caption = assemble(listing, &[], &negatives);
    if caption.chars().count() <= CAPTION_LIMIT {
        return caption;
    }

    assemble(listing, &[], &[])
}

fn assemble(listing: &Listing, positives: &[&str], negatives: &[&str]) -> String {
    let mut lines = vec![format!("🏠 <b>{}</b>", escape_html(&listing.address))];

    let location: Vec<&str> = [listing.neighbourhood.as_deref(), listing.postcode.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    if !location.is_empty() {
        lines.push(escape_html(&location.join(" · ")));
    }

    lines.push(String::new());
    let overbid = (f64::from(listing.price) * OVERBID_FACTOR).round() as i64;
    lines.push(format!(
        "💰 {} asking · {} overbid",
        format_price(i64::from(listing.price)),
        format_price(overbid)
    ));
    lines.push(facts_line(listing));

    let routes = routes_line(listing);
    if !routes.is_empty() {
        lines.push(routes);
    }

    if !positives.is_empty() || !negatives.is_empty() {
        lines.push(String::new());
        lines.extend(positives.iter().map(|p| format!("✅ {}", escape_html(p))));
        lines.extend(negatives.iter().map(|n| format!("⚠️ {}", escape_html(n))));
    }

    lines.join("\n")
}

fn facts_line(listing: &Listing) -> String {
    let mut facts = vec![
        format!("{} beds", listing.bedrooms),
        format!("{} m²", listing.living_area),
    ];
    if let Some(year) = listing.construction_year {
        facts.push(year.to_string());
    }
    if listing.has_garden == Some(true) {
        facts.push("Garden".to_string());
    }
    if listing.has_balcony == Some(true) {
        facts.push("Balcony".to_string());
    }
    if listing.has_roof_terrace == Some(true) {
        facts.push("Roof terrace".to_string());
    }
    facts.join(" · ")
}

fn routes_line(listing: &Listing) -> String {
    let mut parts = Vec::new();
    if let Some(label) = listing.energy_label.as_deref().filter(|l| !l.is_empty()) {
        parts.push(format!("Label {}", escape_html(label)));
    }
    if let Some(routes) = &listing.routes {
        for (i, (name, route)) in routes.0.iter().enumerate() {
            let prefix = if i == 0 { "🚴 " } else { "" };
            parts.push(format!(
                "{}{} min {}",
                prefix,
                route.duration_minutes,
                escape_html(name)
            ));
        }
    }
    parts.join(" · ")
}

/// Euro amount with Dutch thousands separators, e.g. `€450.000`.
pub fn format_price(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{}€{}", sign, grouped)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
