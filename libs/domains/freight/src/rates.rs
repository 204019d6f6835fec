//! Exchange rates with a fallback chain.
//!
//! Order of preference: stored value inside the freshness window, a fresh
//! fetch from the public feed, the stale stored value, the hardcoded default.
//! A rate lookup never fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use observability::QuoteMetrics;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::currency::ExchangeRates;
use crate::error::{FreightError, FreightResult};
use crate::models::{ExchangeRateSnapshot, RateSource};

/// Public exchange-rate feed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch_latest(&self) -> FreightResult<ExchangeRates>;
}

/// What the quote engine consumes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Best available rates. Never fails; see [`RateSource`] for provenance.
    async fn current_rates(&self) -> ExchangeRateSnapshot;

    /// Store a manually entered pair as the last-known value
    async fn store_rates(&self, rates: ExchangeRates) -> FreightResult<ExchangeRateSnapshot>;
}

#[derive(Debug, Deserialize)]
struct LatestRatesDocument {
    rates: HashMap<String, f64>,
}

fn rates_from_document(document: &LatestRatesDocument) -> FreightResult<ExchangeRates> {
    let rate = |code: &str| {
        document.rates.get(code).copied().ok_or_else(|| {
            FreightError::ExternalService(format!("rate feed has no {code} quote"))
        })
    };
    ExchangeRates::new(rate("BRL")?, rate("PYG")?)
        .map_err(|e| FreightError::ExternalService(format!("rate feed returned unusable rates: {e}")))
}

/// USD-based document from exchangerate-api.com or a compatible feed
#[derive(Clone)]
pub struct ExchangeRateApiClient {
    client: Client,
    url: String,
}

impl ExchangeRateApiClient {
    pub const DEFAULT_URL: &'static str = "https://api.exchangerate-api.com/v4/latest/USD";

    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFeed for ExchangeRateApiClient {
    async fn fetch_latest(&self) -> FreightResult<ExchangeRates> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(FreightError::ExternalService(format!(
                "rate feed returned {}",
                response.status()
            )));
        }
        let document: LatestRatesDocument = response.json().await?;
        rates_from_document(&document)
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredRates {
    rates: ExchangeRates,
    updated_at: DateTime<Utc>,
}

impl StoredRates {
    fn snapshot(&self, source: RateSource) -> ExchangeRateSnapshot {
        ExchangeRateSnapshot {
            usd_to_brl: self.rates.usd_to_brl,
            usd_to_gs: self.rates.usd_to_gs,
            updated_at: self.updated_at,
            source,
        }
    }
}

/// Holds the last-known rates for the whole process
pub struct ExchangeRateService<F: RateFeed> {
    feed: F,
    max_age: Duration,
    stored: RwLock<Option<StoredRates>>,
    /// Held while fetching so concurrent stale readers share one feed call
    refresh: Mutex<()>,
}

impl<F: RateFeed> ExchangeRateService<F> {
    pub fn new(feed: F, max_age: Duration) -> Self {
        Self {
            feed,
            max_age,
            stored: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    fn is_fresh(&self, stored: &StoredRates) -> bool {
        // A timestamp in the future counts as fresh
        (Utc::now() - stored.updated_at)
            .to_std()
            .map(|age| age < self.max_age)
            .unwrap_or(true)
    }

    async fn remember(&self, rates: ExchangeRates) -> StoredRates {
        let stored = StoredRates {
            rates,
            updated_at: Utc::now(),
        };
        *self.stored.write().await = Some(stored);
        stored
    }

    async fn fresh_stored(&self) -> Result<ExchangeRateSnapshot, Option<StoredRates>> {
        let stored = *self.stored.read().await;
        match stored.filter(|s| self.is_fresh(s)) {
            Some(fresh) => Ok(fresh.snapshot(RateSource::Cached)),
            None => Err(stored),
        }
    }

    async fn resolve(&self) -> ExchangeRateSnapshot {
        if let Ok(snapshot) = self.fresh_stored().await {
            debug!("Using stored exchange rates");
            return snapshot;
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while this one waited
        let stored = match self.fresh_stored().await {
            Ok(snapshot) => {
                debug!("Using exchange rates refreshed by a concurrent caller");
                return snapshot;
            }
            Err(stored) => stored,
        };

        match self.feed.fetch_latest().await {
            Ok(rates) => {
                info!(
                    usd_to_brl = rates.usd_to_brl,
                    usd_to_gs = rates.usd_to_gs,
                    "Fetched fresh exchange rates"
                );
                self.remember(rates).await.snapshot(RateSource::Fresh)
            }
            Err(e) => match stored {
                Some(stored) => {
                    warn!(error = %e, updated_at = %stored.updated_at, "Rate feed failed, using stale rates");
                    stored.snapshot(RateSource::Stale)
                }
                None => {
                    warn!(error = %e, "Rate feed failed and nothing is stored, using default rates");
                    StoredRates {
                        rates: ExchangeRates::DEFAULT,
                        updated_at: Utc::now(),
                    }
                    .snapshot(RateSource::Default)
                }
            },
        }
    }
}

#[async_trait]
impl<F: RateFeed> ExchangeRateProvider for ExchangeRateService<F> {
    async fn current_rates(&self) -> ExchangeRateSnapshot {
        let snapshot = self.resolve().await;
        QuoteMetrics::record_exchange_rate_source(snapshot.source.into());
        snapshot
    }

    async fn store_rates(&self, rates: ExchangeRates) -> FreightResult<ExchangeRateSnapshot> {
        let rates = ExchangeRates::new(rates.usd_to_brl, rates.usd_to_gs)?;
        info!(
            usd_to_brl = rates.usd_to_brl,
            usd_to_gs = rates.usd_to_gs,
            "Stored manual exchange rates"
        );
        Ok(self.remember(rates).await.snapshot(RateSource::Cached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOUR: Duration = Duration::from_secs(3600);

    fn feed_rates() -> ExchangeRates {
        ExchangeRates::new(5.10, 7300.0).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_fetch_is_then_served_from_store() {
        let mut feed = MockRateFeed::new();
        feed.expect_fetch_latest()
            .times(1)
            .returning(|| Ok(feed_rates()));
        let service = ExchangeRateService::new(feed, 6 * HOUR);

        let first = service.current_rates().await;
        assert_eq!(first.source, RateSource::Fresh);
        assert_eq!(first.usd_to_brl, 5.10);

        let second = service.current_rates().await;
        assert_eq!(second.source, RateSource::Cached);
        assert_eq!(second.usd_to_gs, 7300.0);
        assert_eq!(second.updated_at, first.updated_at);
    }

    struct SlowFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateFeed for SlowFeed {
        async fn fetch_latest(&self) -> FreightResult<ExchangeRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(feed_rates())
        }
    }

    #[tokio::test]
    async fn test_concurrent_stale_readers_share_one_fetch() {
        let service = Arc::new(ExchangeRateService::new(
            SlowFeed {
                calls: AtomicUsize::new(0),
            },
            6 * HOUR,
        ));

        let snapshots = join_all((0..8).map(|_| {
            let service = service.clone();
            async move { service.current_rates().await }
        }))
        .await;

        assert_eq!(service.feed.calls.load(Ordering::SeqCst), 1);
        let fresh = snapshots
            .iter()
            .filter(|s| s.source == RateSource::Fresh)
            .count();
        assert_eq!(fresh, 1);
        assert!(snapshots.iter().all(|s| s.rates() == feed_rates()));
    }

    #[tokio::test]
    async fn test_feed_failure_with_empty_store_uses_default() {
        let mut feed = MockRateFeed::new();
        feed.expect_fetch_latest()
            .returning(|| Err(FreightError::ExternalService("timeout".into())));
        let service = ExchangeRateService::new(feed, 6 * HOUR);

        let snapshot = service.current_rates().await;
        assert_eq!(snapshot.source, RateSource::Default);
        assert_eq!(snapshot.rates(), ExchangeRates::DEFAULT);
    }

    #[tokio::test]
    async fn test_feed_failure_after_expiry_uses_stale_value() {
        let mut feed = MockRateFeed::new();
        let mut calls = 0;
        feed.expect_fetch_latest().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(feed_rates())
            } else {
                Err(FreightError::ExternalService("503".into()))
            }
        });
        let service = ExchangeRateService::new(feed, Duration::ZERO);

        assert_eq!(service.current_rates().await.source, RateSource::Fresh);
        let snapshot = service.current_rates().await;
        assert_eq!(snapshot.source, RateSource::Stale);
        assert_eq!(snapshot.rates(), feed_rates());
    }

    #[tokio::test]
    async fn test_manual_rates_become_last_known_value() {
        let mut feed = MockRateFeed::new();
        feed.expect_fetch_latest().never();
        let service = ExchangeRateService::new(feed, 6 * HOUR);

        let stored = service
            .store_rates(ExchangeRates {
                usd_to_brl: 5.25,
                usd_to_gs: 7450.0,
            })
            .await
            .unwrap();
        assert_eq!(stored.usd_to_brl, 5.25);

        let current = service.current_rates().await;
        assert_eq!(current.source, RateSource::Cached);
        assert_eq!(current.usd_to_gs, 7450.0);
    }

    #[tokio::test]
    async fn test_manual_rates_must_be_positive() {
        let service = ExchangeRateService::new(MockRateFeed::new(), HOUR);
        let err = service
            .store_rates(ExchangeRates {
                usd_to_brl: 0.0,
                usd_to_gs: 7450.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FreightError::Validation(_)));
    }

    #[test]
    fn test_feed_document_parsing() {
        let document: LatestRatesDocument = serde_json::from_value(json!({
            "base": "USD",
            "rates": { "USD": 1, "BRL": 5.43, "PYG": 7321.5 }
        }))
        .unwrap();
        let rates = rates_from_document(&document).unwrap();
        assert_eq!(rates.usd_to_brl, 5.43);
        assert_eq!(rates.usd_to_gs, 7321.5);

        let missing: LatestRatesDocument =
            serde_json::from_value(json!({ "rates": { "BRL": 5.43 } })).unwrap();
        assert!(matches!(
            rates_from_document(&missing),
            Err(FreightError::ExternalService(_))
        ));
    }
}
