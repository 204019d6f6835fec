use observability::QuoteMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use validator::Validate;

use crate::aggregator::{AduanaAggregator, QuotePlan, rank};
use crate::crossing_point::{CrossingPoint, KnownCrossing, find_known_crossing};
use crate::currency::{Currency, ExchangeRates, convert};
use crate::distance::DistanceService;
use crate::error::{FreightError, FreightResult};
use crate::models::{
    AduanaCandidateResult, AduanaRecommendation, ConversionResult, ConvertQuery,
    ExchangeRateSnapshot, FreightBaseInfo, QuoteRequest, QuoteResult, RecommendationQuery,
    ResolvedCustomsDetails, SelectionMode,
};
use crate::rates::ExchangeRateProvider;
use crate::repository::CrossingPointStore;
use crate::settings::FreightSettings;
use crate::trucks::MAX_TONNAGE;

const FREIGHT_BASE_DESCRIPTION: &str =
    "Valor de referência para comparação entre aduanas; não incluso no custo total";

/// Quote engine entry point
pub struct FreightService<S: CrossingPointStore, D: DistanceService, X: ExchangeRateProvider> {
    store: Arc<S>,
    aggregator: AduanaAggregator<S, D>,
    rates: X,
}

impl<S, D, X> FreightService<S, D, X>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    pub fn new(store: S, distance: D, rates: X, settings: FreightSettings) -> Self {
        let store = Arc::new(store);
        Self {
            aggregator: AduanaAggregator::new(store.clone(), Arc::new(distance), settings),
            store,
            rates,
        }
    }

    pub fn settings(&self) -> &FreightSettings {
        self.aggregator.settings()
    }

    /// Full quote: validate, price every candidate, pick one, shape the result.
    #[instrument(skip_all, fields(origin = %request.origin, destination = %request.destination, tonnage = request.tonnage))]
    pub async fn calculate_freight(&self, request: QuoteRequest) -> FreightResult<QuoteResult> {
        let started = Instant::now();
        let mode = if request.pinned_aduana().is_some() {
            SelectionMode::Pinned
        } else {
            SelectionMode::Auto
        };

        let result = self.quote(&request, mode).await;

        QuoteMetrics::record_quote(
            mode.into(),
            if result.is_ok() { "success" } else { "error" },
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn quote(&self, request: &QuoteRequest, mode: SelectionMode) -> FreightResult<QuoteResult> {
        request
            .validate()
            .map_err(|e| FreightError::Validation(e.to_string()))?;

        // Reject an unknown pin before touching any collaborator
        let pinned: Option<&KnownCrossing> = match request.pinned_aduana() {
            Some(name) => Some(find_known_crossing(name).ok_or_else(|| {
                FreightError::Validation(format!("unknown crossing point '{name}'"))
            })?),
            None => None,
        };

        let snapshot = self.rates.current_rates().await;
        let rates = snapshot.rates();
        let plan = QuotePlan::from_request(request, self.settings());

        let results = match pinned {
            Some(known) => vec![
                self.aggregator
                    .evaluate_candidate(known.brazilian, &plan, rates)
                    .await?,
            ],
            None => self.evaluate_active(&plan, rates).await?,
        };

        let ranked = rank(results);
        let best = ranked
            .iter()
            .find(|r| r.is_recommended)
            .cloned()
            .ok_or_else(|| FreightError::Internal("ranking produced no recommendation".to_string()))?;

        info!(
            mode = %mode,
            recommended = %best.name,
            total_cost = best.total_cost,
            candidates = ranked.len(),
            "Freight quote calculated"
        );

        Ok(shape_quote(request, mode, &plan, snapshot, best, ranked))
    }

    async fn evaluate_active(
        &self,
        plan: &QuotePlan,
        rates: ExchangeRates,
    ) -> FreightResult<Vec<AduanaCandidateResult>> {
        let names = self.aggregator.active_candidates().await?;
        if names.is_empty() {
            return Err(FreightError::ConfigurationNotFound(
                "no active crossing points configured".to_string(),
            ));
        }

        let results = self.aggregator.evaluate_all(&names, plan, rates).await;
        if results.is_empty() {
            return Err(FreightError::ConfigurationNotFound(names.join(", ")));
        }
        Ok(results)
    }

    /// Rank every active crossing point for an origin/destination pair.
    #[instrument(skip_all, fields(origin = %query.origin, destination = %query.destination))]
    pub async fn recommend_aduana(
        &self,
        query: RecommendationQuery,
    ) -> FreightResult<AduanaRecommendation> {
        let started = Instant::now();
        let result = self.recommend(&query).await;
        QuoteMetrics::record_quote(
            "recommendation",
            if result.is_ok() { "success" } else { "error" },
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn recommend(&self, query: &RecommendationQuery) -> FreightResult<AduanaRecommendation> {
        if query.origin.trim().is_empty() || query.destination.trim().is_empty() {
            return Err(FreightError::Validation(
                "origin and destination are required".to_string(),
            ));
        }
        if let Some(tonnage) = query
            .tonnage
            .filter(|t| !(t.is_finite() && *t > 0.0 && *t <= MAX_TONNAGE))
        {
            return Err(FreightError::Validation(format!(
                "tonnage must be greater than zero and at most {MAX_TONNAGE}, got {tonnage}"
            )));
        }

        let rates = self.rates.current_rates().await.rates();
        let plan = QuotePlan::for_recommendation(query, self.settings());
        let routed: Vec<AduanaCandidateResult> = self
            .evaluate_active(&plan, rates)
            .await?
            .into_iter()
            .filter(|r| r.distance > 0.0)
            .collect();
        if routed.is_empty() {
            return Err(FreightError::ExternalService(
                "no crossing point could be routed".to_string(),
            ));
        }

        let ranked = rank(routed);
        let recommendation = ranked
            .iter()
            .find(|r| r.is_recommended)
            .map(|r| r.name.clone())
            .ok_or_else(|| FreightError::Internal("ranking produced no recommendation".to_string()))?;

        Ok(AduanaRecommendation {
            recommendation,
            distances: ranked.iter().map(|r| (r.name.clone(), r.distance)).collect(),
            total_costs: ranked.iter().map(|r| (r.name.clone(), r.total_cost)).collect(),
            total_with_freight: ranked
                .iter()
                .map(|r| (r.name.clone(), r.comparison_total))
                .collect(),
            cost_per_ton: ranked.iter().map(|r| (r.name.clone(), r.cost_per_ton)).collect(),
            all_results: ranked,
        })
    }

    pub async fn exchange_rates(&self) -> ExchangeRateSnapshot {
        self.rates.current_rates().await
    }

    pub async fn set_exchange_rates(
        &self,
        rates: ExchangeRates,
    ) -> FreightResult<ExchangeRateSnapshot> {
        self.rates.store_rates(rates).await
    }

    /// Convert with the current rates. Bad input is the caller's fault here.
    pub async fn convert(&self, query: ConvertQuery) -> FreightResult<ConversionResult> {
        let as_validation = |e: FreightError| match e {
            FreightError::CurrencyConversion(message) => FreightError::Validation(message),
            other => other,
        };
        let from = Currency::parse_code(&query.from).map_err(as_validation)?;
        let to = Currency::parse_code(&query.to).map_err(as_validation)?;

        let snapshot = self.rates.current_rates().await;
        let converted = convert(query.amount, from, to, &snapshot.rates()).map_err(as_validation)?;

        Ok(ConversionResult {
            amount: query.amount,
            from,
            to,
            converted,
            rates: snapshot,
        })
    }

    /// Parsed configuration of every crossing point, active or not
    pub async fn crossing_points(&self) -> FreightResult<Vec<CrossingPoint>> {
        let records = self.store.get_all_crossing_points().await?;
        Ok(records.iter().map(CrossingPoint::from_record).collect())
    }
}

fn shape_quote(
    request: &QuoteRequest,
    mode: SelectionMode,
    plan: &QuotePlan,
    snapshot: ExchangeRateSnapshot,
    best: AduanaCandidateResult,
    ranked: Vec<AduanaCandidateResult>,
) -> QuoteResult {
    let freight_base_details = best
        .cost_breakdown
        .iter()
        .find(|item| item.is_reference_only)
        .map(|item| item.details.clone())
        .unwrap_or_default();

    let preferred_aduana = request
        .customs_details
        .as_ref()
        .and_then(|c| c.preferred_aduana.clone())
        .unwrap_or_else(|| match mode {
            SelectionMode::Pinned => best.name.clone(),
            SelectionMode::Auto => "auto".to_string(),
        });

    QuoteResult {
        recommended_aduana: best.name.clone(),
        partner_aduana: best.partner_name.clone(),
        selection_mode: mode,
        total_cost: best.total_cost,
        cost_per_ton: best.cost_per_ton,
        total_distance: best.distance,
        required_trucks: plan.trucks,
        tonnage: plan.tonnage,
        exchange_rate: snapshot.usd_to_brl,
        exchange_rates: snapshot.rates(),
        exchange_rate_source: snapshot.source,
        estimated_profit: best.profit,
        product_type: request.product_type.clone(),
        specific_product: request.specific_product.clone(),
        product_price: request.product_price,
        freight_base_info: FreightBaseInfo {
            value: best.freight_base,
            details: freight_base_details,
            description: FREIGHT_BASE_DESCRIPTION.to_string(),
        },
        route_segments: best.route_segments,
        customs_details: ResolvedCustomsDetails {
            preferred_aduana,
            include_insurance: plan.include_insurance,
            special_handling: plan.special_handling,
            customs_process: plan.process,
            company_pays_balsa: plan.company_pays_ferry,
            force_balsa_payment: request.force_balsa_payment,
            selected_aduana: best.name.clone(),
            origin_location: request.origin.clone(),
            destination_location: request.destination.clone(),
            customs_point: format!("{} / {}", best.name, best.partner_name),
        },
        cost_breakdown: best.cost_breakdown,
        aduana_comparison: ranked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing_point::CrossingPointRecord;
    use crate::distance::MockDistanceService;
    use crate::models::{CustomsOptions, RateSource, RouteDistance};
    use crate::rates::MockExchangeRateProvider;
    use crate::repository::MockCrossingPointStore;
    use crate::rules::billable_sum;
    use chrono::Utc;
    use serde_json::json;

    fn snapshot() -> ExchangeRateSnapshot {
        ExchangeRateSnapshot {
            usd_to_brl: 5.40,
            usd_to_gs: 7500.0,
            updated_at: Utc::now(),
            source: RateSource::Fresh,
        }
    }

    fn rates() -> MockExchangeRateProvider {
        let mut rates = MockExchangeRateProvider::new();
        rates.expect_current_rates().returning(snapshot);
        rates
    }

    /// Four points; Foz is cheapest on fees, Santa Helena has a company ferry
    fn config(name: &str) -> Option<CrossingPointRecord> {
        let value = match name {
            "Guaíra" => json!({
                "name": "Guaíra",
                "faf": { "perTruck": "50.000 GS", "lot1000": 200000, "lot1500": 300000 },
                "balsa": { "enabled": true, "defaultCost": 350 },
                "estacionamento": { "enabled": true, "costPerTruck": "R$ 40,00" }
            }),
            "Mundo Novo" => json!({
                "name": "Mundo Novo",
                "faf": { "perTruck": 60000, "lot1000": 250000, "lot1500": 350000 },
                "fula": { "enabled": true, "costPerTon": 1.2 }
            }),
            "Foz do Iguaçu" => json!({
                "name": "Foz do Iguaçu",
                "faf": { "perTruck": 50000, "lot1000": 200000, "lot1500": 300000 }
            }),
            "Santa Helena" => json!({
                "name": "Santa Helena",
                "faf": { "perTruck": 50000, "lot1000": 200000, "lot1500": 300000 },
                "balsa": { "enabled": true, "defaultCost": 300, "puertoIndioCost": 450 },
                "comissaoLuiz": { "enabled": true, "costPerTon": 2 }
            }),
            _ => return None,
        };
        Some(serde_json::from_value(value).unwrap())
    }

    fn all_configs() -> Vec<CrossingPointRecord> {
        ["Guaíra", "Mundo Novo", "Foz do Iguaçu", "Santa Helena"]
            .into_iter()
            .filter_map(config)
            .collect()
    }

    fn store() -> MockCrossingPointStore {
        let mut store = MockCrossingPointStore::new();
        store
            .expect_get_all_crossing_points()
            .returning(|| Ok(all_configs()));
        store
            .expect_get_crossing_point()
            .returning(|name| Ok(config(name)));
        store
    }

    fn distance(km: f64) -> MockDistanceService {
        let mut distance = MockDistanceService::new();
        distance.expect_route_distance().returning(move |_| {
            Ok(RouteDistance {
                total_distance: km,
                origin_to_aduana_py: km * 0.6,
                aduana_br_to_destination: km * 0.4 - 5.0,
            })
        });
        distance
    }

    fn request(tonnage: f64) -> QuoteRequest {
        QuoteRequest {
            origin: "Cascavel, PR".to_string(),
            destination: "Ciudad del Este".to_string(),
            product_type: "soja".to_string(),
            tonnage,
            driver_payment: 0.10,
            profit_margin: Some(5.0),
            ..Default::default()
        }
    }

    fn with_options(mut request: QuoteRequest, options: CustomsOptions) -> QuoteRequest {
        request.customs_details = Some(options);
        request
    }

    fn service(
        store: MockCrossingPointStore,
        distance: MockDistanceService,
        rates: MockExchangeRateProvider,
    ) -> FreightService<MockCrossingPointStore, MockDistanceService, MockExchangeRateProvider> {
        FreightService::new(store, distance, rates, FreightSettings::default())
    }

    fn ferry_item(result: &QuoteResult) -> &crate::models::CostLineItem {
        result
            .cost_breakdown
            .iter()
            .find(|i| i.item.starts_with("Balsa"))
            .expect("ferry line item")
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected_before_any_lookup() {
        let mut rates = MockExchangeRateProvider::new();
        rates.expect_current_rates().never();
        let service = service(MockCrossingPointStore::new(), MockDistanceService::new(), rates);

        let mut bad = request(0.0);
        bad.origin = " ".to_string();
        let err = service.calculate_freight(bad).await.unwrap_err();
        assert!(matches!(err, FreightError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_pin_is_a_validation_error() {
        let mut rates = MockExchangeRateProvider::new();
        rates.expect_current_rates().never();
        let service = service(MockCrossingPointStore::new(), MockDistanceService::new(), rates);

        let pinned = with_options(
            request(100.0),
            CustomsOptions {
                preferred_aduana: Some("Ponta Porã".to_string()),
                ..Default::default()
            },
        );
        let err = service.calculate_freight(pinned).await.unwrap_err();
        assert!(matches!(err, FreightError::Validation(msg) if msg.contains("Ponta Porã")));
    }

    #[tokio::test]
    async fn test_auto_mode_recommends_minimum_and_sorts_comparison() {
        let service = service(store(), distance(400.0), rates());

        let result = service.calculate_freight(request(1000.0)).await.unwrap();

        assert_eq!(result.selection_mode, SelectionMode::Auto);
        assert_eq!(result.recommended_aduana, "Foz do Iguaçu");
        assert_eq!(result.partner_aduana, "Ciudad del Este");
        assert_eq!(result.aduana_comparison.len(), 4);
        assert!(result.aduana_comparison[0].is_recommended);
        assert_eq!(
            result.aduana_comparison.iter().filter(|r| r.is_recommended).count(),
            1
        );
        assert!(
            result
                .aduana_comparison
                .windows(2)
                .all(|w| w[0].comparison_total <= w[1].comparison_total)
        );
        assert_eq!(result.customs_details.customs_point, "Foz do Iguaçu / Ciudad del Este");
        assert_eq!(result.customs_details.preferred_aduana, "auto");
    }

    #[tokio::test]
    async fn test_scenario_totals() {
        let pinned = with_options(
            request(1000.0),
            CustomsOptions {
                preferred_aduana: Some("Foz do Iguaçu".to_string()),
                ..Default::default()
            },
        );
        let service = service(store(), distance(400.0), rates());

        let result = service.calculate_freight(pinned).await.unwrap();

        assert_eq!(result.required_trucks, 32);
        assert_eq!(result.exchange_rate, 5.40);
        let faf = &result.cost_breakdown[1];
        assert_eq!(faf.item, "FAF");
        assert!((faf.value - 240.0).abs() < 1e-9);
        let expected = 240.0 + 100.0 / 5.40 + 5000.0;
        assert!((result.total_cost - expected).abs() < 1e-6);
        assert_eq!(result.estimated_profit, 5000.0);
    }

    #[tokio::test]
    async fn test_reference_base_freight_is_excluded_from_total() {
        let service = service(store(), distance(650.0), rates());

        let result = service.calculate_freight(request(480.0)).await.unwrap();

        let reference: Vec<_> = result
            .cost_breakdown
            .iter()
            .filter(|i| i.is_reference_only)
            .collect();
        assert_eq!(reference.len(), 1);
        assert!((billable_sum(&result.cost_breakdown) - result.total_cost).abs() < 1e-9);
        assert_eq!(result.freight_base_info.value, reference[0].value);
        assert_eq!(result.freight_base_info.value, (650.0 / 25.0) * 480.0);
    }

    #[tokio::test]
    async fn test_pinned_santa_helena_wins_regardless_of_cost() {
        let pinned = with_options(
            request(1000.0),
            CustomsOptions {
                preferred_aduana: Some("Santa Helena".to_string()),
                company_pays_balsa: Some(false),
                ..Default::default()
            },
        );
        let mut store = MockCrossingPointStore::new();
        store.expect_get_all_crossing_points().never();
        store
            .expect_get_crossing_point()
            .withf(|name| name == "Santa Helena")
            .times(1)
            .returning(|name| Ok(config(name)));
        let service = service(store, distance(400.0), rates());

        let result = service.calculate_freight(pinned).await.unwrap();

        assert_eq!(result.selection_mode, SelectionMode::Pinned);
        assert_eq!(result.recommended_aduana, "Santa Helena");
        assert_eq!(result.aduana_comparison.len(), 1);
        assert!(result.aduana_comparison[0].is_recommended);

        // Santa Helena ferry is company-paid even with the toggle off
        let ferry = ferry_item(&result);
        assert_eq!(ferry.item, "Balsa (Puerto Indio)");
        assert!((ferry.value - 32.0 * 450.0 / 5.40).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_force_flag_pins_over_preferred_field() {
        let mut pinned = with_options(
            request(200.0),
            CustomsOptions {
                preferred_aduana: Some("auto".to_string()),
                ..Default::default()
            },
        );
        pinned.force_aduana = Some(true);
        pinned.selected_aduana = Some("mundo novo".to_string());
        let service = service(store(), distance(400.0), rates());

        let result = service.calculate_freight(pinned).await.unwrap();

        assert_eq!(result.recommended_aduana, "Mundo Novo");
        assert_eq!(result.customs_details.selected_aduana, "Mundo Novo");
        assert_eq!(result.customs_details.preferred_aduana, "auto");
    }

    #[tokio::test]
    async fn test_guaira_ferry_is_driver_paid_unless_company_pays() {
        let guaira = |company_pays: Option<bool>, force: Option<bool>| {
            let mut request = with_options(
                request(100.0),
                CustomsOptions {
                    preferred_aduana: Some("Guaíra".to_string()),
                    company_pays_balsa: company_pays,
                    ..Default::default()
                },
            );
            request.force_balsa_payment = force;
            request
        };

        let service = service(store(), distance(300.0), rates());

        let driver = service.calculate_freight(guaira(Some(false), None)).await.unwrap();
        let ferry = ferry_item(&driver);
        assert_eq!(ferry.value, 0.0);
        assert_eq!(ferry.details, "Motorista paga (não incluso no custo)");
        assert!(!ferry.is_reference_only);

        let company = service.calculate_freight(guaira(Some(true), None)).await.unwrap();
        assert!((ferry_item(&company).value - 4.0 * 350.0 / 5.40).abs() < 1e-9);

        let forced = service.calculate_freight(guaira(Some(false), Some(true))).await.unwrap();
        assert!(ferry_item(&forced).value > 0.0);
        assert_eq!(forced.customs_details.force_balsa_payment, Some(true));
    }

    #[tokio::test]
    async fn test_pinned_point_without_configuration_is_fatal() {
        let mut store = MockCrossingPointStore::new();
        store.expect_get_crossing_point().returning(|_| Ok(None));
        let service = service(store, MockDistanceService::new(), rates());

        let pinned = with_options(
            request(100.0),
            CustomsOptions {
                preferred_aduana: Some("Guaíra".to_string()),
                ..Default::default()
            },
        );
        let err = service.calculate_freight(pinned).await.unwrap_err();
        assert!(matches!(err, FreightError::ConfigurationNotFound(_)));
    }

    #[tokio::test]
    async fn test_auto_mode_survives_a_failing_point() {
        let mut store = MockCrossingPointStore::new();
        store
            .expect_get_all_crossing_points()
            .returning(|| Ok(all_configs()));
        store.expect_get_crossing_point().returning(|name| match name {
            "Foz do Iguaçu" => Err(FreightError::ExternalService("502".into())),
            other => Ok(config(other)),
        });
        let service = service(store, distance(400.0), rates());

        let result = service.calculate_freight(request(1000.0)).await.unwrap();

        assert_eq!(result.aduana_comparison.len(), 3);
        assert!(result.aduana_comparison.iter().all(|r| r.name != "Foz do Iguaçu"));
    }

    #[tokio::test]
    async fn test_auto_mode_fails_when_every_point_fails() {
        let mut store = MockCrossingPointStore::new();
        store
            .expect_get_all_crossing_points()
            .returning(|| Ok(all_configs()));
        store.expect_get_crossing_point().returning(|_| Ok(None));
        let service = service(store, distance(400.0), rates());

        let err = service.calculate_freight(request(1000.0)).await.unwrap_err();
        assert!(matches!(err, FreightError::ConfigurationNotFound(_)));
    }

    #[tokio::test]
    async fn test_recommendation_drops_unrouted_points() {
        let mut distance = MockDistanceService::new();
        distance.expect_route_distance().returning(|query| {
            if query.crossing == "Mundo Novo" {
                Err(FreightError::ExternalService("NOT_FOUND".into()))
            } else {
                Ok(RouteDistance {
                    total_distance: 420.0,
                    origin_to_aduana_py: 200.0,
                    aduana_br_to_destination: 215.0,
                })
            }
        });
        let service = service(store(), distance, rates());

        let recommendation = service
            .recommend_aduana(RecommendationQuery {
                origin: "Cascavel".to_string(),
                destination: "Asunción".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(recommendation.all_results.len(), 3);
        assert!(!recommendation.distances.contains_key("Mundo Novo"));
        assert_eq!(recommendation.recommendation, "Foz do Iguaçu");
        assert_eq!(recommendation.distances["Guaíra"], 420.0);
        // Guaíra ferry counted as company-paid by default here
        let guaira = recommendation
            .all_results
            .iter()
            .find(|r| r.name == "Guaíra")
            .unwrap();
        assert!(guaira.balsa_cost > 0.0);
    }

    #[tokio::test]
    async fn test_convert_reports_bad_codes_as_validation() {
        let service = service(MockCrossingPointStore::new(), MockDistanceService::new(), rates());

        let converted = service
            .convert(ConvertQuery {
                amount: 540.0,
                from: "brl".to_string(),
                to: "USD".to_string(),
            })
            .await
            .unwrap();
        assert!((converted.converted - 100.0).abs() < 1e-9);
        assert_eq!(converted.from, Currency::Brl);

        let err = service
            .convert(ConvertQuery {
                amount: 1.0,
                from: "EUR".to_string(),
                to: "USD".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FreightError::Validation(_)));
    }

    #[tokio::test]
    async fn test_crossing_points_are_parsed() {
        let service = service(store(), MockDistanceService::new(), rates());
        let points = service.crossing_points().await.unwrap();

        assert_eq!(points.len(), 4);
        let guaira = &points[0];
        assert_eq!(guaira.partner, "Salto del Guaíra");
        assert_eq!(guaira.faf.per_truck_gs, 50_000.0);
        assert_eq!(guaira.parking_brl_per_truck, Some(40.0));
    }
}
