//! Route distance lookup.
//!
//! Every route is two driven legs: origin to the Paraguayan customs post,
//! then Brazilian customs post to destination. The crossing itself is a
//! fixed distance between them.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::crossing_point::find_known_crossing;
use crate::error::{FreightError, FreightResult};
use crate::models::{Coordinates, RouteDistance};

/// Everything needed to route a shipment through one crossing point
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteQuery {
    pub origin: String,
    pub destination: String,
    pub origin_place_id: Option<String>,
    pub destination_place_id: Option<String>,
    pub origin_coordinates: Option<Coordinates>,
    pub destination_coordinates: Option<Coordinates>,
    /// Brazilian side of the crossing
    pub crossing: String,
    /// Paraguayan side of the crossing
    pub partner: String,
    pub brazil_coordinates: Option<Coordinates>,
    pub paraguay_coordinates: Option<Coordinates>,
}

impl RouteQuery {
    fn brazil_side(&self) -> Option<Coordinates> {
        self.brazil_coordinates
            .or_else(|| find_known_crossing(&self.crossing).map(|k| k.brazil_coordinates))
    }

    fn paraguay_side(&self) -> Option<Coordinates> {
        self.paraguay_coordinates
            .or_else(|| find_known_crossing(&self.crossing).map(|k| k.paraguay_coordinates))
    }
}

/// External distance lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistanceService: Send + Sync {
    async fn route_distance(&self, query: &RouteQuery) -> FreightResult<RouteDistance>;
}

// ---------------------------------------------------------------------------
// Google Directions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: DirectionsDistance,
}

#[derive(Debug, Deserialize)]
struct DirectionsDistance {
    /// Meters
    value: f64,
}

fn route_km(response: DirectionsResponse) -> FreightResult<f64> {
    if response.status != "OK" {
        return Err(FreightError::ExternalService(format!(
            "directions lookup failed with status {}{}",
            response.status,
            response
                .error_message
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        )));
    }
    let route = response
        .routes
        .first()
        .ok_or_else(|| FreightError::ExternalService("directions returned no route".to_string()))?;
    Ok(route.legs.iter().map(|leg| leg.distance.value).sum::<f64>() / 1000.0)
}

/// Directions API endpoint for a place: place id, then coordinates, then free text
fn waypoint(place_id: Option<&str>, coordinates: Option<Coordinates>, text: &str) -> String {
    if let Some(id) = place_id.map(str::trim).filter(|id| !id.is_empty()) {
        return format!("place_id:{id}");
    }
    match coordinates {
        Some(c) => format!("{},{}", c.lat, c.lng),
        None => text.to_string(),
    }
}

/// Road distances from the Google Directions API
#[derive(Clone)]
pub struct DirectionsClient {
    client: Client,
    api_key: String,
    base_url: String,
    crossing_distance_km: f64,
}

impl DirectionsClient {
    const DIRECTIONS_URL: &'static str = "https://maps.googleapis.com/maps/api/directions/json";

    pub fn new(client: Client, api_key: impl Into<String>, crossing_distance_km: f64) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: Self::DIRECTIONS_URL.to_string(),
            crossing_distance_km,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn leg_km(&self, from: &str, to: &str) -> FreightResult<f64> {
        debug!(from, to, "Requesting driving directions");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origin", from),
                ("destination", to),
                ("mode", "driving"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FreightError::ExternalService(format!(
                "directions API returned {}",
                response.status()
            )));
        }

        route_km(response.json().await?)
    }
}

#[async_trait]
impl DistanceService for DirectionsClient {
    async fn route_distance(&self, query: &RouteQuery) -> FreightResult<RouteDistance> {
        let origin = waypoint(
            query.origin_place_id.as_deref(),
            query.origin_coordinates,
            &query.origin,
        );
        let destination = waypoint(
            query.destination_place_id.as_deref(),
            query.destination_coordinates,
            &query.destination,
        );
        let paraguay = waypoint(None, query.paraguay_side(), &query.partner);
        let brazil = waypoint(None, query.brazil_side(), &query.crossing);

        let (to_customs, from_customs) = tokio::try_join!(
            self.leg_km(&origin, &paraguay),
            self.leg_km(&brazil, &destination)
        )?;

        Ok(RouteDistance {
            total_distance: to_customs + self.crossing_distance_km + from_customs,
            origin_to_aduana_py: to_customs,
            aduana_br_to_destination: from_customs,
        })
    }
}

// ---------------------------------------------------------------------------
// Great-circle estimate
// ---------------------------------------------------------------------------

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Roads are longer than straight lines by roughly this factor
pub const ROAD_FACTOR: f64 = 1.3;

pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Offline approximation for when no routing API is configured
#[derive(Clone, Debug)]
pub struct GreatCircleEstimator {
    crossing_distance_km: f64,
}

impl GreatCircleEstimator {
    pub fn new(crossing_distance_km: f64) -> Self {
        Self {
            crossing_distance_km,
        }
    }
}

fn required(coordinates: Option<Coordinates>, what: &str) -> FreightResult<Coordinates> {
    coordinates.ok_or_else(|| {
        FreightError::ExternalService(format!("{what} coordinates are required to estimate a route"))
    })
}

#[async_trait]
impl DistanceService for GreatCircleEstimator {
    async fn route_distance(&self, query: &RouteQuery) -> FreightResult<RouteDistance> {
        let origin = required(query.origin_coordinates, "origin")?;
        let destination = required(query.destination_coordinates, "destination")?;
        let paraguay = required(query.paraguay_side(), "Paraguayan customs")?;
        let brazil = required(query.brazil_side(), "Brazilian customs")?;

        let to_customs = haversine_km(origin, paraguay) * ROAD_FACTOR;
        let from_customs = haversine_km(brazil, destination) * ROAD_FACTOR;
        let crossing = self.crossing_distance_km * ROAD_FACTOR;

        if to_customs > 800.0 || from_customs > 800.0 {
            warn!(
                crossing = %query.crossing,
                to_customs,
                from_customs,
                "Unusually long estimated leg"
            );
        }

        Ok(RouteDistance {
            total_distance: to_customs + crossing + from_customs,
            origin_to_aduana_py: to_customs,
            aduana_br_to_destination: from_customs,
        })
    }
}

/// Distance backend picked at startup from configuration
#[derive(Clone)]
pub enum RouteProvider {
    Directions(DirectionsClient),
    Estimate(GreatCircleEstimator),
}

#[async_trait]
impl DistanceService for RouteProvider {
    async fn route_distance(&self, query: &RouteQuery) -> FreightResult<RouteDistance> {
        match self {
            RouteProvider::Directions(client) => client.route_distance(query).await,
            RouteProvider::Estimate(estimator) => estimator.route_distance(query).await,
        }
    }
}
