use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString, IntoStaticStr};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::currency::ExchangeRates;

/// Customs clearance speed tier
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
    TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CustomsProcess {
    #[default]
    Normal,
    /// 3-5 days, +15%
    Expedited,
    /// 1-2 days, +30%
    Priority,
}

impl CustomsProcess {
    /// Surcharge as a fraction of the running subtotal
    pub fn surcharge_rate(&self) -> Option<f64> {
        match self {
            CustomsProcess::Normal => None,
            CustomsProcess::Expedited => Some(0.15),
            CustomsProcess::Priority => Some(0.30),
        }
    }
}

/// Geographic point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(Self { lat, lng }),
            _ => None,
        }
    }
}

/// Customs options chosen by the user; echoed back untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CustomsOptions {
    /// Crossing point name, or "auto"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_aduana: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_insurance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_handling: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customs_process: Option<CustomsProcess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_pays_balsa: Option<bool>,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// Freight quote request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, TS, Validate)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_not_blank"))]
    pub origin: String,
    #[serde(default)]
    #[validate(custom(function = "validate_not_blank"))]
    pub destination: String,
    #[serde(default)]
    pub origin_place_id: Option<String>,
    #[serde(default)]
    pub destination_place_id: Option<String>,
    #[serde(default)]
    pub origin_lat: Option<f64>,
    #[serde(default)]
    pub origin_lng: Option<f64>,
    #[serde(default)]
    pub destination_lat: Option<f64>,
    #[serde(default)]
    pub destination_lng: Option<f64>,
    #[serde(default)]
    #[validate(custom(function = "validate_not_blank"))]
    pub product_type: String,
    #[serde(default)]
    pub specific_product: Option<String>,
    #[serde(default)]
    pub product_price: Option<f64>,
    /// Metric tons, positive and at most one million
    #[serde(default)]
    #[validate(range(
        exclusive_min = 0.0,
        max = 1000000.0,
        message = "must be greater than zero and at most 1000000"
    ))]
    pub tonnage: f64,
    /// BRL per ton
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub driver_payment: f64,
    /// USD per ton; the configured default applies when omitted
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub profit_margin: Option<f64>,
    /// USD
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub merchandise_value: f64,
    #[serde(default)]
    pub customs_details: Option<CustomsOptions>,
    /// Hard pin, honoured together with `_selectedAduana`
    #[serde(rename = "_forceAduana", default)]
    pub force_aduana: Option<bool>,
    #[serde(rename = "_selectedAduana", default)]
    pub selected_aduana: Option<String>,
    /// Company pays the ferry at any crossing point
    #[serde(rename = "_forceBalsaPayment", default)]
    pub force_balsa_payment: Option<bool>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl QuoteRequest {
    /// Crossing point the user pinned, if any. The force flag wins over the
    /// preferred-aduana field; "auto" means no pin.
    pub fn pinned_aduana(&self) -> Option<&str> {
        if self.force_aduana == Some(true) {
            if let Some(selected) = non_blank(self.selected_aduana.as_deref()) {
                return Some(selected);
            }
        }
        non_blank(
            self.customs_details
                .as_ref()
                .and_then(|c| c.preferred_aduana.as_deref()),
        )
        .filter(|name| !name.eq_ignore_ascii_case("auto"))
    }

    pub fn origin_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.origin_lat, self.origin_lng)
    }

    pub fn destination_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.destination_lat, self.destination_lng)
    }

    pub fn include_insurance(&self) -> bool {
        self.customs_details
            .as_ref()
            .and_then(|c| c.include_insurance)
            .unwrap_or(true)
    }

    pub fn special_handling(&self) -> bool {
        self.customs_details
            .as_ref()
            .and_then(|c| c.special_handling)
            .unwrap_or(false)
    }

    pub fn customs_process(&self) -> CustomsProcess {
        self.customs_details
            .as_ref()
            .and_then(|c| c.customs_process)
            .unwrap_or_default()
    }

    pub fn company_pays_balsa(&self) -> bool {
        self.customs_details
            .as_ref()
            .and_then(|c| c.company_pays_balsa)
            .unwrap_or(false)
    }

    pub fn force_company_pays_balsa(&self) -> bool {
        self.force_balsa_payment == Some(true)
    }
}

/// One labelled amount in a cost breakdown, always in USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CostLineItem {
    pub item: String,
    pub details: String,
    pub value: f64,
    /// Informational only; never part of the billable total
    #[serde(default)]
    pub is_reference_only: bool,
}

impl CostLineItem {
    pub fn billable(item: impl Into<String>, details: impl Into<String>, value: f64) -> Self {
        Self {
            item: item.into(),
            details: details.into(),
            value,
            is_reference_only: false,
        }
    }

    pub fn reference(item: impl Into<String>, details: impl Into<String>, value: f64) -> Self {
        Self {
            is_reference_only: true,
            ..Self::billable(item, details, value)
        }
    }
}

/// Distance answer of the routing collaborator, in km
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RouteDistance {
    pub total_distance: f64,
    pub origin_to_aduana_py: f64,
    pub aduana_br_to_destination: f64,
}

/// Route breakdown shown with a quote, in km
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegments {
    pub origin_to_customs: f64,
    pub customs_to_destination: f64,
    pub crossing_distance: f64,
}

/// Who ends up paying the ferry at a crossing point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FerryPayer {
    Company,
    Driver,
}

/// Priced evaluation of one crossing point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AduanaCandidateResult {
    /// Brazilian side name
    pub name: String,
    /// Paraguayan side name
    pub partner_name: String,
    /// Total route distance in km, rounded
    pub distance: f64,
    pub route_segments: RouteSegments,
    pub cost_breakdown: Vec<CostLineItem>,
    /// Billable fees, before profit
    pub subtotal: f64,
    pub profit: f64,
    /// Subtotal plus profit; what the customer pays
    pub total_cost: f64,
    /// Distance-based reference freight
    pub freight_base: f64,
    /// Total plus reference freight; ranking only
    pub comparison_total: f64,
    pub cost_per_ton: f64,
    pub cost_per_ton_with_freight: f64,
    pub has_balsa: bool,
    pub balsa_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balsa_paid_by: Option<FerryPayer>,
    pub is_recommended: bool,
}

/// Reference freight shown beside, never inside, the billable breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct FreightBaseInfo {
    pub value: f64,
    pub details: String,
    pub description: String,
}

/// How the recommended crossing point was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SelectionMode {
    /// Cheapest comparison total among all active points
    Auto,
    /// The user pinned a crossing point
    Pinned,
}

/// Customs options as echoed in the quote, plus what the engine resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCustomsDetails {
    pub preferred_aduana: String,
    pub include_insurance: bool,
    pub special_handling: bool,
    pub customs_process: CustomsProcess,
    pub company_pays_balsa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_balsa_payment: Option<bool>,
    pub selected_aduana: String,
    pub origin_location: String,
    pub destination_location: String,
    /// "Brazilian side / Paraguayan side"
    pub customs_point: String,
}

/// Final freight quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    pub recommended_aduana: String,
    pub partner_aduana: String,
    pub selection_mode: SelectionMode,
    pub total_cost: f64,
    pub cost_per_ton: f64,
    pub total_distance: f64,
    pub required_trucks: u32,
    pub tonnage: f64,
    /// USD→BRL rate used
    pub exchange_rate: f64,
    pub exchange_rates: ExchangeRates,
    pub exchange_rate_source: RateSource,
    pub estimated_profit: f64,
    pub product_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_price: Option<f64>,
    pub cost_breakdown: Vec<CostLineItem>,
    pub aduana_comparison: Vec<AduanaCandidateResult>,
    pub freight_base_info: FreightBaseInfo,
    pub route_segments: RouteSegments,
    pub customs_details: ResolvedCustomsDetails,
}

/// Query for the lightweight crossing point recommendation
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RecommendationQuery {
    pub origin: String,
    pub destination: String,
    /// Metric tons, defaults to 1000
    #[serde(default)]
    pub tonnage: Option<f64>,
    #[serde(default)]
    pub origin_place_id: Option<String>,
    #[serde(default)]
    pub destination_place_id: Option<String>,
    #[serde(default)]
    pub origin_lat: Option<f64>,
    #[serde(default)]
    pub origin_lng: Option<f64>,
    #[serde(default)]
    pub destination_lat: Option<f64>,
    #[serde(default)]
    pub destination_lng: Option<f64>,
    /// Defaults to true
    #[serde(default)]
    pub company_pays_balsa: Option<bool>,
}

impl RecommendationQuery {
    pub fn origin_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.origin_lat, self.origin_lng)
    }

    pub fn destination_coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.destination_lat, self.destination_lng)
    }
}

/// Ranked crossing points for an origin/destination pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AduanaRecommendation {
    pub recommendation: String,
    pub distances: BTreeMap<String, f64>,
    pub total_costs: BTreeMap<String, f64>,
    pub total_with_freight: BTreeMap<String, f64>,
    pub cost_per_ton: BTreeMap<String, f64>,
    pub all_results: Vec<AduanaCandidateResult>,
}

/// Which link of the fallback chain produced a rate snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RateSource {
    /// Fetched from the rate feed for this request
    Fresh,
    /// Stored value still inside the freshness window
    Cached,
    /// Stored value past the window, used because the feed failed
    Stale,
    /// Hardcoded fallback
    Default,
}

/// Exchange rates plus provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRateSnapshot {
    pub usd_to_brl: f64,
    pub usd_to_gs: f64,
    pub updated_at: DateTime<Utc>,
    pub source: RateSource,
}

impl ExchangeRateSnapshot {
    pub fn rates(&self) -> ExchangeRates {
        ExchangeRates {
            usd_to_brl: self.usd_to_brl,
            usd_to_gs: self.usd_to_gs,
        }
    }
}

/// Currency conversion query
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertQuery {
    pub amount: f64,
    /// USD, BRL or GS
    pub from: String,
    /// USD, BRL or GS
    pub to: String,
}

/// Result of a currency conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub amount: f64,
    pub from: crate::currency::Currency,
    pub to: crate::currency::Currency,
    pub converted: f64,
    pub rates: ExchangeRateSnapshot,
}

/// Round to cents for presentation
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
