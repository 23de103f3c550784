use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::lru_cache::LruCache;
use super::BaseRouteProvider;
use crate::common::{Coordinates, LineString, RouteResult};

pub const DEFAULT_VALHALLA_URL: &str = "https://valhalla1.openstreetmap.de";

/// Routes memoized per process.
pub const ROUTE_CACHE_CAPACITY: usize = 500;

/// Valhalla encodes shapes with six decimal places.
const SHAPE_PRECISION: u32 = 6;

#[derive(Debug, Serialize)]
struct RouteRequest {
    locations: [Location; 2],
    costing: &'static str,
}

#[derive(Debug, Serialize)]
struct Location {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    summary: Summary,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    /// Seconds
    time: f64,
}

#[derive(Debug, Deserialize)]
struct Leg {
    shape: Option<String>,
}

/// Cycling routes from a Valhalla server, with an in-memory LRU in front.
pub struct ValhallaClient {
    base_url: String,
    client: reqwest::Client,
    cache: Mutex<LruCache<String, RouteResult>>,
}

impl ValhallaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            cache: Mutex::new(LruCache::new(ROUTE_CACHE_CAPACITY)),
        })
    }

    fn cached(&self, key: &String) -> Option<RouteResult> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: String, route: RouteResult) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, route);
        }
    }
}

#[async_trait]
impl BaseRouteProvider for ValhallaClient {
    async fn cycling_route(
        &self,
        from: Coordinates,
        to: Coordinates,
    ) -> Result<Option<RouteResult>> {
        let key = cache_key(from, to);
        if let Some(route) = self.cached(&key) {
            debug!(key = %key, "route cache hit");
            return Ok(Some(route));
        }

        let request = RouteRequest {
            locations: [
                Location {
                    lat: from.lat,
                    lon: from.lon,
                },
                Location {
                    lat: to.lat,
                    lon: to.lon,
                },
            ],
            costing: "bicycle",
        };

        let response = self
            .client
            .post(format!("{}/route", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to send Valhalla route request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Valhalla returned an error");
            return Ok(None);
        }

        let parsed: RouteResponse = response
            .json()
            .await
            .context("Failed to parse Valhalla response")?;

        let Some(shape) = parsed.trip.legs.into_iter().next().and_then(|leg| leg.shape) else {
            return Ok(None);
        };

        let route = RouteResult {
            duration_minutes: (parsed.trip.summary.time / 60.0).round() as i64,
            geometry: LineString::new(decode_polyline(&shape, SHAPE_PRECISION)?),
        };

        self.remember(key, route.clone());
        Ok(Some(route))
    }
}

/// Cache key from coordinates rounded to four decimals (~11 m).
pub fn cache_key(from: Coordinates, to: Coordinates) -> String {
    format!(
        "{:.4},{:.4}-{:.4},{:.4}",
        from.lat, from.lon, to.lat, to.lon
    )
}

/// Decode an encoded polyline into `[lon, lat]` pairs.
pub fn decode_polyline(encoded: &str, precision: u32) -> Result<Vec<[f64; 2]>> {
    let factor = 10f64.powi(precision as i32);
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        lat += next_delta(bytes, &mut index)?;
        lon += next_delta(bytes, &mut index)?;
        coordinates.push([lon as f64 / factor, lat as f64 / factor]);
    }

    Ok(coordinates)
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            bail!("truncated polyline at byte {}", *index);
        };
        *index += 1;

        let chunk = i64::from(byte)
            .checked_sub(63)
            .filter(|c| *c >= 0)
            .with_context(|| format!("invalid polyline byte {:#x}", byte))?;
        if shift > 63 {
            bail!("polyline value overflow");
        }

        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
