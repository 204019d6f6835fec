//! [`CrossingPointStore`] implementations: the admin HTTP API and a JSON file.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::crossing_point::{CrossingPointRecord, names_match};
use crate::error::{FreightError, FreightResult};
use crate::repository::CrossingPointStore;

fn find_by_name(records: Vec<CrossingPointRecord>, name: &str) -> Option<CrossingPointRecord> {
    records
        .into_iter()
        .find(|record| names_match(record.crossing_name(), name))
}

/// Reads crossing points from the administrative API with no-cache semantics
#[derive(Clone)]
pub struct HttpCrossingPointStore {
    client: Client,
    url: String,
}

impl HttpCrossingPointStore {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CrossingPointStore for HttpCrossingPointStore {
    async fn get_all_crossing_points(&self) -> FreightResult<Vec<CrossingPointRecord>> {
        debug!(url = %self.url, "Fetching crossing points");

        let response = self
            .client
            .get(&self.url)
            .header(header::CACHE_CONTROL, "no-cache, no-store")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FreightError::ExternalService(format!(
                "crossing point store returned {}",
                response.status()
            )));
        }

        let records: Vec<CrossingPointRecord> = response.json().await?;
        info!("Fetched {} crossing points", records.len());
        Ok(records)
    }

    async fn get_crossing_point(&self, name: &str) -> FreightResult<Option<CrossingPointRecord>> {
        Ok(find_by_name(self.get_all_crossing_points().await?, name))
    }
}

/// Reads crossing points from a JSON array on disk, re-reading it on every call
#[derive(Clone, Debug)]
pub struct FileCrossingPointStore {
    path: PathBuf,
}

impl FileCrossingPointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CrossingPointStore for FileCrossingPointStore {
    async fn get_all_crossing_points(&self) -> FreightResult<Vec<CrossingPointRecord>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            FreightError::ExternalService(format!(
                "cannot read crossing points from {}: {e}",
                self.path.display()
            ))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            FreightError::ExternalService(format!(
                "malformed crossing points in {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn get_crossing_point(&self, name: &str) -> FreightResult<Option<CrossingPointRecord>> {
        Ok(find_by_name(self.get_all_crossing_points().await?, name))
    }
}

/// Store picked at startup from configuration
#[derive(Clone)]
pub enum CrossingPointSource {
    Http(HttpCrossingPointStore),
    File(FileCrossingPointStore),
}

#[async_trait]
impl CrossingPointStore for CrossingPointSource {
    async fn get_all_crossing_points(&self) -> FreightResult<Vec<CrossingPointRecord>> {
        match self {
            CrossingPointSource::Http(store) => store.get_all_crossing_points().await,
            CrossingPointSource::File(store) => store.get_all_crossing_points().await,
        }
    }

    async fn get_crossing_point(&self, name: &str) -> FreightResult<Option<CrossingPointRecord>> {
        match self {
            CrossingPointSource::Http(store) => store.get_crossing_point(name).await,
            CrossingPointSource::File(store) => store.get_crossing_point(name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::numeric_or_zero;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(contents: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("crossing_points_{nanos}.json"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_file_store_reads_fresh_every_call() {
        let path = temp_file(r#"[{"brazilianSide": {"name": "Guaíra"}, "faf": {"perTruck": "1"}}]"#);
        let store = FileCrossingPointStore::new(&path);

        let first = store.get_crossing_point("guaíra").await.unwrap().unwrap();
        assert_eq!(numeric_or_zero(first.faf.per_truck.as_ref()), 1.0);

        std::fs::write(&path, r#"[{"brazilianSide": {"name": "Guaíra"}, "faf": {"perTruck": "2"}}]"#)
            .unwrap();
        let second = store.get_crossing_point("Guaíra").await.unwrap().unwrap();
        assert_eq!(numeric_or_zero(second.faf.per_truck.as_ref()), 2.0);

        assert!(store.get_crossing_point("Santa Helena").await.unwrap().is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_file_store_reports_missing_file() {
        let store = FileCrossingPointStore::new("/nonexistent/crossing_points.json");
        let err = store.get_all_crossing_points().await.unwrap_err();
        assert!(matches!(err, FreightError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_file_store_reports_malformed_json() {
        let path = temp_file("{ not json");
        let err = FileCrossingPointStore::new(&path)
            .get_all_crossing_points()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed"));
        std::fs::remove_file(path).ok();
    }
}
