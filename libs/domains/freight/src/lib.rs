//! Freight Domain
//!
//! Quote engine for road freight between Brazil and Paraguay: prices every
//! border crossing point, recommends the cheapest one (or honours a pinned
//! one) and returns an itemized breakdown in USD.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Validation, pin resolution, response shaping
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌──────────────────────────────┐
//! │ Aggregator  │ ──▶ │ Store / Distance / Rates     │  ← collaborators (traits)
//! └──────┬──────┘     └──────────────────────────────┘
//!        │
//! ┌──────▼──────┐
//! │    Rules    │  ← One function per fee, fixed order
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  Currency   │  ← USD / BRL / GS
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_freight::{
//!     handlers, CrossingPointSource, ExchangeRateApiClient, ExchangeRateService,
//!     FileCrossingPointStore, FreightService, FreightSettings, GreatCircleEstimator,
//!     RouteProvider,
//! };
//! use std::time::Duration;
//!
//! let settings = FreightSettings::default();
//! let store = CrossingPointSource::File(FileCrossingPointStore::new("crossing_points.json"));
//! let distance = RouteProvider::Estimate(GreatCircleEstimator::new(settings.crossing_distance_km));
//! let feed = ExchangeRateApiClient::new(reqwest::Client::new(), ExchangeRateApiClient::DEFAULT_URL);
//! let rates = ExchangeRateService::new(feed, Duration::from_secs(6 * 3600));
//!
//! let service = FreightService::new(store, distance, rates, settings);
//! let router = handlers::router(service);
//! ```

pub mod aggregator;
pub mod crossing_point;
pub mod currency;
pub mod distance;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod numeric;
pub mod rates;
pub mod repository;
pub mod rules;
pub mod service;
pub mod settings;
pub mod stores;
pub mod trucks;

// Re-export commonly used types
pub use aggregator::{AduanaAggregator, QuotePlan};
pub use crossing_point::{CrossingPoint, CrossingPointRecord, FerryPayerPolicy, KNOWN_CROSSINGS};
pub use currency::{Currency, ExchangeRates, convert};
pub use distance::{DirectionsClient, DistanceService, GreatCircleEstimator, RouteProvider, RouteQuery};
pub use error::{FreightError, FreightResult};
pub use models::{
    AduanaCandidateResult, AduanaRecommendation, CostLineItem, CustomsOptions, CustomsProcess,
    ExchangeRateSnapshot, QuoteRequest, QuoteResult, RateSource, RecommendationQuery,
};
pub use rates::{ExchangeRateApiClient, ExchangeRateProvider, ExchangeRateService, RateFeed};
pub use repository::CrossingPointStore;
pub use service::FreightService;
pub use settings::FreightSettings;
pub use stores::{CrossingPointSource, FileCrossingPointStore, HttpCrossingPointStore};
pub use trucks::required_trucks;
