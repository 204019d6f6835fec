use domain_freight::{
    CrossingPointSource, DirectionsClient, ExchangeRateApiClient, ExchangeRateService,
    FileCrossingPointStore, FreightService, GreatCircleEstimator, HttpCrossingPointStore,
    RouteProvider,
};
use tracing::info;

use crate::config::{Config, CrossingPointsLocation};

/// The quote engine wired to its production collaborators
pub type AppService =
    FreightService<CrossingPointSource, RouteProvider, ExchangeRateService<ExchangeRateApiClient>>;

pub fn build_service(config: &Config) -> eyre::Result<AppService> {
    let client = reqwest::Client::builder()
        .timeout(config.freight.call_timeout)
        .user_agent(format!("{}/{}", config.app.name, config.app.version))
        .build()?;
    let collaborators = &config.collaborators;

    let store = match &collaborators.crossing_points {
        CrossingPointsLocation::Url(url) => {
            info!(url = %url, "Reading crossing points over HTTP");
            CrossingPointSource::Http(HttpCrossingPointStore::new(client.clone(), url.clone()))
        }
        CrossingPointsLocation::File(path) => {
            info!(path = %path.display(), "Reading crossing points from file");
            CrossingPointSource::File(FileCrossingPointStore::new(path.clone()))
        }
    };

    let crossing_km = config.freight.crossing_distance_km;
    let distance = match &collaborators.google_maps_api_key {
        Some(key) => {
            info!("Routing with the Google Directions API");
            RouteProvider::Directions(DirectionsClient::new(client.clone(), key.clone(), crossing_km))
        }
        None => {
            info!("No GOOGLE_MAPS_API_KEY set, estimating routes from coordinates");
            RouteProvider::Estimate(GreatCircleEstimator::new(crossing_km))
        }
    };

    let rates = ExchangeRateService::new(
        ExchangeRateApiClient::new(client, collaborators.exchange_rate_url.clone()),
        collaborators.exchange_rate_max_age,
    );

    Ok(FreightService::new(
        store,
        distance,
        rates,
        config.freight.clone(),
    ))
}
