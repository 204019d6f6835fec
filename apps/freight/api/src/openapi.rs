use utoipa::OpenApi;

/// Freight API documentation, domain endpoints nested under `/api`
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Freight API",
        description = "Road freight quotes between Brazil and Paraguay"
    ),
    paths(crate::server::health),
    components(schemas(crate::server::HealthResponse)),
    nest(
        (path = "/api", api = domain_freight::handlers::ApiDoc)
    ),
    tags((name = "health", description = "Liveness"))
)]
pub struct ApiDoc;
