use async_trait::async_trait;

use crate::crossing_point::CrossingPointRecord;
use crate::error::FreightResult;

/// Source of crossing point fee configuration.
///
/// Implementations must hit the backing store on every call. Pricing
/// changes administratively and a quote has to reflect the current policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrossingPointStore: Send + Sync {
    /// Every configured crossing point, active or not
    async fn get_all_crossing_points(&self) -> FreightResult<Vec<CrossingPointRecord>>;

    /// One crossing point by its Brazilian side name (case-insensitive)
    async fn get_crossing_point(&self, name: &str) -> FreightResult<Option<CrossingPointRecord>>;
}
