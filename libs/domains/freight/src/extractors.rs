//! Request extractors whose rejections use the freight error body.

use axum::{
    extract::{FromRequest, FromRequestParts, Json, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::FreightError;

/// JSON body extractor that rejects with a `{error, code}` 400.
///
/// Plain `axum::Json` answers a body that does not deserialize with a
/// plain-text 422; quote and rate endpoints report it as invalid input.
pub struct FreightJson<T>(pub T);

impl<T, S> FromRequest<S> for FreightJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FreightError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(FreightJson(value))
    }
}

/// Query string extractor that rejects with a `{error, code}` 400.
pub struct FreightQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for FreightQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FreightError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(FreightQuery(value))
    }
}
