use super::bmkg::BmkgClient;
use super::types::{CurrentWeather, Sourced, WeatherSource};
use crate::regions::Region;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

/// Readings keyed by region id.
pub type BatchResult = HashMap<String, Sourced<CurrentWeather>>;

/// Emitted once per region, in input order, as soon as it resolves.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub region_id: String,
    pub region_code: String,
    pub reading: Sourced<CurrentWeather>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub bmkg: usize,
    pub fallback: usize,
}

impl BatchSummary {
    pub fn from_results(results: &BatchResult) -> Self {
        results
            .values()
            .fold(Self::default(), |mut summary, reading| {
                summary.total += 1;
                match reading.source() {
                    WeatherSource::Bmkg => summary.bmkg += 1,
                    WeatherSource::Fallback => summary.fallback += 1,
                }
                summary
            })
    }
}

pub async fn batch_fetch(client: &BmkgClient, regions: &[Region], delay: Duration) -> BatchResult {
    batch_fetch_with_progress(client, regions, delay, None).await
}

/// Fetches regions one at a time, pausing `delay` between requests.
///
/// Results are keyed by region id, so a region listed more than once is
/// fetched and reported only for its first occurrence. Never aborts: a region the provider cannot serve gets a fallback reading,
/// so every input region ends up in the result. Progress events are best
/// effort; a dropped receiver does not stop the batch.
pub async fn batch_fetch_with_progress(
    client: &BmkgClient,
    regions: &[Region],
    delay: Duration,
    progress: Option<&UnboundedSender<BatchProgress>>,
) -> BatchResult {
    let mut seen = HashSet::with_capacity(regions.len());
    let unique: Vec<&Region> = regions
        .iter()
        .filter(|r| seen.insert(r.id.as_str()))
        .collect();
    if unique.len() < regions.len() {
        tracing::debug!(
            "Batch weather fetch: skipping {} duplicate regions",
            regions.len() - unique.len()
        );
    }

    let total = unique.len();
    let mut results = HashMap::with_capacity(total);

    for (index, region) in unique.into_iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            sleep(delay).await;
        }

        let reading = client.current_or_fallback(region).await;
        tracing::debug!(
            "Batch {}/{}: {} resolved from {:?}",
            index + 1,
            total,
            region.code,
            reading.source()
        );

        if let Some(tx) = progress {
            let _ = tx.send(BatchProgress {
                index,
                total,
                region_id: region.id.clone(),
                region_code: region.code.clone(),
                reading: reading.clone(),
            });
        }
        results.insert(region.id.clone(), reading);
    }

    let summary = BatchSummary::from_results(&results);
    tracing::info!(
        "Batch weather fetch done: {} regions, {} live, {} fallback",
        summary.total,
        summary.bmkg,
        summary.fallback
    );
    results
}
