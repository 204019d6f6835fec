//! Per-crossing-point cost aggregation and ranking.

use futures::future::join_all;
use observability::QuoteMetrics;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::crossing_point::{CrossingPoint, names_match};
use crate::currency::ExchangeRates;
use crate::distance::{DistanceService, RouteQuery};
use crate::error::{FreightError, FreightResult};
use crate::models::{
    AduanaCandidateResult, Coordinates, CostLineItem, CustomsProcess, QuoteRequest,
    RecommendationQuery, RouteDistance, RouteSegments, round2,
};
use crate::repository::CrossingPointStore;
use crate::rules::{self, RuleContext};
use crate::settings::FreightSettings;
use crate::trucks::required_trucks;

/// Tonnage the recommendation endpoint ranks with when none is given
pub const DEFAULT_RECOMMENDATION_TONNAGE: f64 = 1000.0;

/// A request resolved into plain values, once, before any pricing happens
#[derive(Debug, Clone, PartialEq)]
pub struct QuotePlan {
    pub tonnage: f64,
    pub trucks: u32,
    pub driver_payment_brl_per_ton: f64,
    pub profit_margin_usd_per_ton: f64,
    pub merchandise_value_usd: f64,
    pub include_insurance: bool,
    pub special_handling: bool,
    pub process: CustomsProcess,
    pub company_pays_ferry: bool,
    pub force_company_ferry: bool,
    pub origin: String,
    pub destination: String,
    pub origin_place_id: Option<String>,
    pub destination_place_id: Option<String>,
    pub origin_coordinates: Option<Coordinates>,
    pub destination_coordinates: Option<Coordinates>,
}

impl QuotePlan {
    pub fn from_request(request: &QuoteRequest, settings: &FreightSettings) -> Self {
        Self {
            tonnage: request.tonnage,
            trucks: required_trucks(request.tonnage),
            driver_payment_brl_per_ton: request.driver_payment,
            profit_margin_usd_per_ton: request
                .profit_margin
                .unwrap_or(settings.default_profit_margin),
            merchandise_value_usd: request.merchandise_value,
            include_insurance: request.include_insurance(),
            special_handling: request.special_handling(),
            process: request.customs_process(),
            company_pays_ferry: request.company_pays_balsa(),
            force_company_ferry: request.force_company_pays_balsa(),
            origin: request.origin.trim().to_string(),
            destination: request.destination.trim().to_string(),
            origin_place_id: request.origin_place_id.clone(),
            destination_place_id: request.destination_place_id.clone(),
            origin_coordinates: request.origin_coordinates(),
            destination_coordinates: request.destination_coordinates(),
        }
    }

    /// Fees only: no driver wage, no insurance, normal process tier
    pub fn for_recommendation(query: &RecommendationQuery, settings: &FreightSettings) -> Self {
        let tonnage = query.tonnage.unwrap_or(DEFAULT_RECOMMENDATION_TONNAGE);
        Self {
            tonnage,
            trucks: required_trucks(tonnage),
            driver_payment_brl_per_ton: 0.0,
            profit_margin_usd_per_ton: settings.default_profit_margin,
            merchandise_value_usd: 0.0,
            include_insurance: false,
            special_handling: false,
            process: CustomsProcess::Normal,
            company_pays_ferry: query.company_pays_balsa.unwrap_or(true),
            force_company_ferry: false,
            origin: query.origin.trim().to_string(),
            destination: query.destination.trim().to_string(),
            origin_place_id: query.origin_place_id.clone(),
            destination_place_id: query.destination_place_id.clone(),
            origin_coordinates: query.origin_coordinates(),
            destination_coordinates: query.destination_coordinates(),
        }
    }

    pub fn rule_context(
        &self,
        point: &CrossingPoint,
        rates: ExchangeRates,
        settings: &FreightSettings,
    ) -> RuleContext {
        RuleContext {
            tonnage: self.tonnage,
            trucks: self.trucks,
            rates,
            driver_payment_brl_per_ton: self.driver_payment_brl_per_ton,
            merchandise_value_usd: self.merchandise_value_usd,
            include_insurance: self.include_insurance,
            special_handling: self.special_handling,
            special_handling_rate_usd: settings.special_handling_rate_usd,
            process: self.process,
            ferry_payer: point
                .ferry_policy
                .resolve(self.company_pays_ferry, self.force_company_ferry),
        }
    }

    pub fn route_query(&self, point: &CrossingPoint) -> RouteQuery {
        RouteQuery {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            origin_place_id: self.origin_place_id.clone(),
            destination_place_id: self.destination_place_id.clone(),
            origin_coordinates: self.origin_coordinates,
            destination_coordinates: self.destination_coordinates,
            crossing: point.name.clone(),
            partner: point.partner.clone(),
            brazil_coordinates: point.brazil_coordinates,
            paraguay_coordinates: point.paraguay_coordinates,
        }
    }
}

/// Price one crossing point for a known route. Pure.
pub fn price_candidate(
    point: &CrossingPoint,
    route: RouteDistance,
    plan: &QuotePlan,
    rates: ExchangeRates,
    settings: &FreightSettings,
) -> FreightResult<AduanaCandidateResult> {
    let ctx = plan.rule_context(point, rates, settings);
    let base = rules::base_freight(route.total_distance, plan.tonnage);
    let fees = rules::fee_items(point, &ctx)?;

    let subtotal = rules::billable_sum(&fees);
    let profit = plan.tonnage * plan.profit_margin_usd_per_ton;
    let total_cost = subtotal + profit;
    let comparison_total = total_cost + base.value;

    let balsa_cost = fees
        .iter()
        .find(|item| item.item.starts_with("Balsa"))
        .map(|item| item.value)
        .unwrap_or(0.0);
    let has_balsa = point.ferry.is_some();

    let freight_base = base.value;
    let mut cost_breakdown = Vec::with_capacity(fees.len() + 2);
    cost_breakdown.push(base);
    cost_breakdown.extend(fees);
    cost_breakdown.push(CostLineItem::billable(
        "Margem de Lucro",
        format!(
            "{} toneladas × ${:.2}/ton",
            plan.tonnage, plan.profit_margin_usd_per_ton
        ),
        profit,
    ));

    Ok(AduanaCandidateResult {
        name: point.name.clone(),
        partner_name: point.partner.clone(),
        distance: round2(route.total_distance),
        route_segments: RouteSegments {
            origin_to_customs: round2(route.origin_to_aduana_py),
            customs_to_destination: round2(route.aduana_br_to_destination),
            crossing_distance: settings.crossing_distance_km,
        },
        cost_breakdown,
        subtotal,
        profit,
        total_cost,
        freight_base,
        comparison_total,
        cost_per_ton: total_cost / plan.tonnage,
        cost_per_ton_with_freight: comparison_total / plan.tonnage,
        has_balsa,
        balsa_cost,
        balsa_paid_by: has_balsa.then_some(ctx.ferry_payer),
        is_recommended: false,
    })
}

/// Index of the minimum comparison total; the first one wins a tie.
pub fn select_recommended(results: &[AduanaCandidateResult]) -> Option<usize> {
    results
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, r)| match best {
            Some((_, min)) if r.comparison_total.total_cmp(&min).is_ge() => best,
            _ => Some((i, r.comparison_total)),
        })
        .map(|(i, _)| i)
}

/// Flag the recommendation and sort ascending by comparison total.
pub fn rank(mut results: Vec<AduanaCandidateResult>) -> Vec<AduanaCandidateResult> {
    if let Some(best) = select_recommended(&results) {
        for (i, result) in results.iter_mut().enumerate() {
            result.is_recommended = i == best;
        }
    }
    // Stable, so the recommended entry stays ahead of equal totals
    results.sort_by(|a, b| a.comparison_total.total_cmp(&b.comparison_total));
    results
}

/// Evaluates crossing points against live configuration and routing
pub struct AduanaAggregator<S: CrossingPointStore, D: DistanceService> {
    store: Arc<S>,
    distance: Arc<D>,
    settings: FreightSettings,
}

impl<S: CrossingPointStore, D: DistanceService> AduanaAggregator<S, D> {
    pub fn new(store: Arc<S>, distance: Arc<D>, settings: FreightSettings) -> Self {
        Self {
            store,
            distance,
            settings,
        }
    }

    pub fn settings(&self) -> &FreightSettings {
        &self.settings
    }

    /// Names of the active crossing points, in store order, without duplicates
    pub async fn active_candidates(&self) -> FreightResult<Vec<String>> {
        let records = timeout(self.settings.call_timeout, self.store.get_all_crossing_points())
            .await
            .map_err(|_| {
                FreightError::ExternalService("crossing point listing timed out".to_string())
            })??;

        let mut names: Vec<String> = Vec::with_capacity(records.len());
        for record in records.iter().filter(|r| r.active) {
            let name = record.crossing_name().trim();
            if name.is_empty() || names.iter().any(|n| names_match(n, name)) {
                continue;
            }
            names.push(name.to_string());
        }
        debug!(count = names.len(), "Resolved active crossing points");
        Ok(names)
    }

    /// Fresh configuration for one point; any failure is `ConfigurationNotFound`.
    async fn load_point(&self, name: &str) -> FreightResult<CrossingPoint> {
        let fetched = timeout(self.settings.call_timeout, self.store.get_crossing_point(name)).await;
        match fetched {
            Ok(Ok(Some(record))) => Ok(CrossingPoint::from_record(&record)),
            Ok(Ok(None)) => Err(FreightError::ConfigurationNotFound(name.to_string())),
            Ok(Err(e)) => {
                warn!(crossing = name, error = %e, "Crossing point configuration unavailable");
                Err(FreightError::ConfigurationNotFound(name.to_string()))
            }
            Err(_) => {
                warn!(crossing = name, "Crossing point configuration lookup timed out");
                Err(FreightError::ConfigurationNotFound(name.to_string()))
            }
        }
    }

    /// Route distance, degraded to zero when the lookup fails
    async fn route(&self, point: &CrossingPoint, plan: &QuotePlan) -> RouteDistance {
        let query = plan.route_query(point);
        match timeout(self.settings.call_timeout, self.distance.route_distance(&query)).await {
            Ok(Ok(route)) => route,
            Ok(Err(e)) => {
                warn!(crossing = %point.name, error = %e, "Distance lookup failed, using zero distance");
                QuoteMetrics::record_distance_fallback(&point.name);
                RouteDistance::default()
            }
            Err(_) => {
                warn!(crossing = %point.name, "Distance lookup timed out, using zero distance");
                QuoteMetrics::record_distance_fallback(&point.name);
                RouteDistance::default()
            }
        }
    }

    #[instrument(skip(self, plan, rates), fields(tonnage = plan.tonnage))]
    pub async fn evaluate_candidate(
        &self,
        name: &str,
        plan: &QuotePlan,
        rates: ExchangeRates,
    ) -> FreightResult<AduanaCandidateResult> {
        let point = self.load_point(name).await?;
        let route = self.route(&point, plan).await;
        let result = price_candidate(&point, route, plan, rates, &self.settings)?;
        debug!(
            total_cost = result.total_cost,
            comparison_total = result.comparison_total,
            "Priced crossing point"
        );
        Ok(result)
    }

    /// Evaluate every candidate concurrently. Failed candidates are dropped;
    /// the survivors keep input order.
    pub async fn evaluate_all(
        &self,
        names: &[String],
        plan: &QuotePlan,
        rates: ExchangeRates,
    ) -> Vec<AduanaCandidateResult> {
        let evaluations = join_all(
            names
                .iter()
                .map(|name| self.evaluate_candidate(name, plan, rates)),
        )
        .await;

        names
            .iter()
            .zip(evaluations)
            .filter_map(|(name, evaluation)| match evaluation {
                Ok(result) => Some(result),
                Err(e) => {
                    let reason = match e {
                        FreightError::ConfigurationNotFound(_) => "configuration",
                        _ => "pricing",
                    };
                    warn!(crossing = %name, error = %e, "Dropping crossing point from comparison");
                    QuoteMetrics::record_candidate_failure(name, reason);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing_point::CrossingPointRecord;
    use crate::distance::MockDistanceService;
    use crate::models::FerryPayer;
    use crate::repository::MockCrossingPointStore;
    use serde_json::json;

    fn plan(tonnage: f64) -> QuotePlan {
        let request = QuoteRequest {
            origin: "Curitiba".to_string(),
            destination: "Asunción".to_string(),
            product_type: "soja".to_string(),
            tonnage,
            driver_payment: 0.10,
            profit_margin: Some(5.0),
            ..Default::default()
        };
        QuotePlan::from_request(&request, &FreightSettings::default())
    }

    fn record(name: &str, per_truck: f64) -> CrossingPointRecord {
        serde_json::from_value(json!({
            "name": name,
            "faf": { "perTruck": per_truck, "lot1000": 200000, "lot1500": 300000 }
        }))
        .unwrap()
    }

    fn candidate(name: &str, comparison_total: f64) -> AduanaCandidateResult {
        let point = CrossingPoint::from_record(&record(name, 50_000.0));
        let mut result = price_candidate(
            &point,
            RouteDistance::default(),
            &plan(100.0),
            ExchangeRates::DEFAULT,
            &FreightSettings::default(),
        )
        .unwrap();
        result.comparison_total = comparison_total;
        result
    }

    fn route(total: f64) -> RouteDistance {
        RouteDistance {
            total_distance: total,
            origin_to_aduana_py: total / 2.0,
            aduana_br_to_destination: total / 2.0 - 5.0,
        }
    }

    #[test]
    fn test_price_candidate_scenario() {
        let point = CrossingPoint::from_record(&record("Foz do Iguaçu", 50_000.0));
        let result = price_candidate(
            &point,
            route(500.0),
            &plan(1000.0),
            ExchangeRates::DEFAULT,
            &FreightSettings::default(),
        )
        .unwrap();

        // FAF 240 + driver 100/5.40 + profit 5000
        let expected = 240.0 + 100.0 / 5.40 + 5000.0;
        assert!((result.total_cost - expected).abs() < 1e-6);
        assert_eq!(result.profit, 5000.0);
        assert_eq!(result.freight_base, 20_000.0);
        assert!((result.comparison_total - (expected + 20_000.0)).abs() < 1e-6);
        assert!((result.cost_per_ton - expected / 1000.0).abs() < 1e-9);
        assert!(!result.has_balsa);
        assert_eq!(result.balsa_paid_by, None);
    }

    #[test]
    fn test_reference_item_never_reaches_total() {
        let point = CrossingPoint::from_record(&record("Foz do Iguaçu", 50_000.0));
        let result = price_candidate(
            &point,
            route(820.0),
            &plan(640.0),
            ExchangeRates::DEFAULT,
            &FreightSettings::default(),
        )
        .unwrap();

        let first = &result.cost_breakdown[0];
        assert!(first.is_reference_only);
        assert_eq!(first.item, "Frete Base (Referência)");
        assert_eq!(rules::billable_sum(&result.cost_breakdown), result.total_cost);
        assert_eq!(
            result.cost_breakdown.last().map(|i| i.item.as_str()),
            Some("Margem de Lucro")
        );
    }

    #[test]
    fn test_ferry_payer_reported_for_ferry_points() {
        let point = CrossingPoint::from_record(
            &serde_json::from_value(json!({
                "name": "Santa Helena",
                "faf": { "perTruck": 50000, "lot1000": 200000 },
                "balsa": { "enabled": true, "puertoIndioCost": 400 }
            }))
            .unwrap(),
        );
        let result = price_candidate(
            &point,
            route(300.0),
            &plan(64.0),
            ExchangeRates::DEFAULT,
            &FreightSettings::default(),
        )
        .unwrap();

        assert!(result.has_balsa);
        assert_eq!(result.balsa_paid_by, Some(FerryPayer::Company));
        assert!((result.balsa_cost - 800.0 / 5.40).abs() < 1e-9);
    }

    #[test]
    fn test_select_recommended_picks_strict_minimum() {
        let results = vec![
            candidate("Guaíra", 9_000.0),
            candidate("Foz do Iguaçu", 7_500.0),
            candidate("Santa Helena", 8_200.0),
        ];
        assert_eq!(select_recommended(&results), Some(1));
        assert_eq!(select_recommended(&[]), None);
    }

    #[test]
    fn test_select_recommended_tie_goes_to_first() {
        let results = vec![
            candidate("Guaíra", 9_000.0),
            candidate("Mundo Novo", 7_500.0),
            candidate("Foz do Iguaçu", 7_500.0),
        ];
        assert_eq!(select_recommended(&results), Some(1));

        let ranked = rank(results);
        assert_eq!(ranked[0].name, "Mundo Novo");
        assert!(ranked[0].is_recommended);
        assert!(!ranked[1].is_recommended);
        assert_eq!(ranked[2].name, "Guaíra");
    }

    #[tokio::test]
    async fn test_active_candidates_skip_inactive_and_duplicates() {
        let mut store = MockCrossingPointStore::new();
        store.expect_get_all_crossing_points().returning(|| {
            let mut inactive = record("Mundo Novo", 50_000.0);
            inactive.active = false;
            Ok(vec![
                record("Guaíra", 50_000.0),
                inactive,
                record("guaíra ", 50_000.0),
                record("Foz do Iguaçu", 50_000.0),
            ])
        });
        let aggregator = AduanaAggregator::new(
            Arc::new(store),
            Arc::new(MockDistanceService::new()),
            FreightSettings::default(),
        );

        let names = aggregator.active_candidates().await.unwrap();
        assert_eq!(names, vec!["Guaíra".to_string(), "Foz do Iguaçu".to_string()]);
    }

    #[tokio::test]
    async fn test_evaluate_all_isolates_failing_candidates() {
        let mut store = MockCrossingPointStore::new();
        store.expect_get_crossing_point().returning(|name| match name {
            "Guaíra" => Err(FreightError::ExternalService("connection reset".into())),
            "Mundo Novo" => Ok(None),
            other => Ok(Some(record(other, 50_000.0))),
        });
        let mut distance = MockDistanceService::new();
        distance.expect_route_distance().returning(|query| {
            if query.crossing == "Santa Helena" {
                Err(FreightError::ExternalService("ZERO_RESULTS".into()))
            } else {
                Ok(route(600.0))
            }
        });
        let aggregator = AduanaAggregator::new(
            Arc::new(store),
            Arc::new(distance),
            FreightSettings::default(),
        );

        let names: Vec<String> = ["Guaíra", "Mundo Novo", "Foz do Iguaçu", "Santa Helena"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = aggregator
            .evaluate_all(&names, &plan(1000.0), ExchangeRates::DEFAULT)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "Foz do Iguaçu");
        assert_eq!(results[0].distance, 600.0);
        // Distance failure degrades instead of dropping
        assert_eq!(results[1].name, "Santa Helena");
        assert_eq!(results[1].distance, 0.0);
        assert_eq!(results[1].freight_base, 0.0);
    }

    #[tokio::test]
    async fn test_missing_configuration_is_reported() {
        let mut store = MockCrossingPointStore::new();
        store.expect_get_crossing_point().returning(|_| Ok(None));
        let aggregator = AduanaAggregator::new(
            Arc::new(store),
            Arc::new(MockDistanceService::new()),
            FreightSettings::default(),
        );

        let err = aggregator
            .evaluate_candidate("Guaíra", &plan(100.0), ExchangeRates::DEFAULT)
            .await
            .unwrap_err();
        assert!(matches!(err, FreightError::ConfigurationNotFound(name) if name == "Guaíra"));
    }
}
