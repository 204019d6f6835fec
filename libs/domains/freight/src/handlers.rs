use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::crossing_point::{
    CrossingPoint, FafSchedule, FerryPayerPolicy, FerrySchedule, FerryVariant, MapaFee,
};
use crate::currency::{Currency, ExchangeRates};
use crate::distance::DistanceService;
use crate::error::FreightResult;
use crate::extractors::{FreightJson, FreightQuery};
use crate::models::{
    AduanaCandidateResult, AduanaRecommendation, ConversionResult, ConvertQuery, Coordinates,
    CostLineItem, CustomsOptions, CustomsProcess, ExchangeRateSnapshot, FerryPayer,
    FreightBaseInfo, QuoteRequest, QuoteResult, RateSource, RecommendationQuery,
    ResolvedCustomsDetails, RouteSegments, SelectionMode,
};
use crate::rates::ExchangeRateProvider;
use crate::repository::CrossingPointStore;
use crate::service::FreightService;

pub const TAG: &str = "Freight";

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

/// OpenAPI documentation for the freight API
#[derive(OpenApi)]
#[openapi(
    paths(
        calculate_freight,
        recommend_aduana,
        list_crossing_points,
        get_exchange_rates,
        set_exchange_rates,
        convert_currency,
    ),
    components(schemas(
        QuoteRequest,
        QuoteResult,
        CustomsOptions,
        CustomsProcess,
        ResolvedCustomsDetails,
        CostLineItem,
        AduanaCandidateResult,
        AduanaRecommendation,
        FreightBaseInfo,
        RouteSegments,
        SelectionMode,
        FerryPayer,
        Coordinates,
        ExchangeRates,
        ExchangeRateSnapshot,
        RateSource,
        Currency,
        ConversionResult,
        CrossingPoint,
        FafSchedule,
        MapaFee,
        FerrySchedule,
        FerryVariant,
        FerryPayerPolicy,
        ErrorBody,
    )),
    tags(
        (name = TAG, description = "Freight quotes, crossing point recommendation and exchange rates")
    )
)]
pub struct ApiDoc;

type SharedService<S, D, X> = State<Arc<FreightService<S, D, X>>>;

/// Create the freight router with all HTTP endpoints
pub fn router<S, D, X>(service: FreightService<S, D, X>) -> Router
where
    S: CrossingPointStore + 'static,
    D: DistanceService + 'static,
    X: ExchangeRateProvider + 'static,
{
    let shared_service = Arc::new(service);

    Router::new()
        .route("/freight/calculate", post(calculate_freight))
        .route("/aduanas/recommendation", get(recommend_aduana))
        .route("/crossing-points", get(list_crossing_points))
        .route(
            "/exchange-rates",
            get(get_exchange_rates).put(set_exchange_rates),
        )
        .route("/currency/convert", get(convert_currency))
        .with_state(shared_service)
}

/// Quote a shipment and recommend a crossing point
#[utoipa::path(
    post,
    path = "/freight/calculate",
    tag = TAG,
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Itemized quote", body = QuoteResult),
        (status = 400, description = "Invalid request or unknown crossing point", body = ErrorBody),
        (status = 404, description = "Crossing point configuration unavailable", body = ErrorBody),
        (status = 502, description = "Configuration store unreachable", body = ErrorBody)
    )
)]
async fn calculate_freight<S, D, X>(
    State(service): SharedService<S, D, X>,
    FreightJson(request): FreightJson<QuoteRequest>,
) -> FreightResult<Json<QuoteResult>>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    let quote = service.calculate_freight(request).await?;
    Ok(Json(quote))
}

/// Rank the active crossing points for an origin/destination pair
#[utoipa::path(
    get,
    path = "/aduanas/recommendation",
    tag = TAG,
    params(RecommendationQuery),
    responses(
        (status = 200, description = "Ranked crossing points", body = AduanaRecommendation),
        (status = 400, description = "Missing origin or destination", body = ErrorBody),
        (status = 502, description = "No crossing point could be routed", body = ErrorBody)
    )
)]
async fn recommend_aduana<S, D, X>(
    State(service): SharedService<S, D, X>,
    FreightQuery(query): FreightQuery<RecommendationQuery>,
) -> FreightResult<Json<AduanaRecommendation>>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    let recommendation = service.recommend_aduana(query).await?;
    Ok(Json(recommendation))
}

/// Parsed fee configuration of every crossing point
#[utoipa::path(
    get,
    path = "/crossing-points",
    tag = TAG,
    responses(
        (status = 200, description = "Crossing points", body = Vec<CrossingPoint>),
        (status = 502, description = "Configuration store unreachable", body = ErrorBody)
    )
)]
async fn list_crossing_points<S, D, X>(
    State(service): SharedService<S, D, X>,
) -> FreightResult<Json<Vec<CrossingPoint>>>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    let points = service.crossing_points().await?;
    Ok(Json(points))
}

/// Current exchange rates and where they came from
#[utoipa::path(
    get,
    path = "/exchange-rates",
    tag = TAG,
    responses(
        (status = 200, description = "Current rates", body = ExchangeRateSnapshot)
    )
)]
async fn get_exchange_rates<S, D, X>(
    State(service): SharedService<S, D, X>,
) -> Json<ExchangeRateSnapshot>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    Json(service.exchange_rates().await)
}

/// Store a manually entered rate pair
#[utoipa::path(
    put,
    path = "/exchange-rates",
    tag = TAG,
    request_body = ExchangeRates,
    responses(
        (status = 200, description = "Rates stored", body = ExchangeRateSnapshot),
        (status = 400, description = "Rates must be positive", body = ErrorBody)
    )
)]
async fn set_exchange_rates<S, D, X>(
    State(service): SharedService<S, D, X>,
    FreightJson(rates): FreightJson<ExchangeRates>,
) -> FreightResult<Json<ExchangeRateSnapshot>>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    let snapshot = service.set_exchange_rates(rates).await?;
    Ok(Json(snapshot))
}

/// Convert an amount between USD, BRL and GS
#[utoipa::path(
    get,
    path = "/currency/convert",
    tag = TAG,
    params(ConvertQuery),
    responses(
        (status = 200, description = "Converted amount", body = ConversionResult),
        (status = 400, description = "Unknown currency or invalid amount", body = ErrorBody)
    )
)]
async fn convert_currency<S, D, X>(
    State(service): SharedService<S, D, X>,
    FreightQuery(query): FreightQuery<ConvertQuery>,
) -> FreightResult<Json<ConversionResult>>
where
    S: CrossingPointStore,
    D: DistanceService,
    X: ExchangeRateProvider,
{
    let conversion = service.convert(query).await?;
    Ok(Json(conversion))
}
