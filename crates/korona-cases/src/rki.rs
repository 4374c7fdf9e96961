//! RKI county dataset via the Opendatasoft records API (opendata.wuerzburg.de).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use korona_core::config::DataConfig;
use korona_core::error::{KoronaError, Result};
use korona_core::traits::MetricSource;
use korona_core::types::RegionMetric;

const SEARCH_PATH: &str = "/api/records/1.0/search/";
const METRIC_FIELD: &str = "cases7_per_100k";

/// HTTP client for the `rki_corona_landkreise` dataset.
pub struct RkiClient {
    client: reqwest::Client,
    api_base: String,
    dataset: String,
    rows: u32,
    timeout: Duration,
}

impl RkiClient {
    pub fn new(config: &DataConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            dataset: config.dataset.clone(),
            rows: config.rows,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn search_url(&self) -> String {
        format!("{}{}", self.api_base, SEARCH_PATH)
    }
}

#[async_trait]
impl MetricSource for RkiClient {
    async fn fetch_all(&self) -> Result<Vec<RegionMetric>> {
        let rows = self.rows.to_string();
        let response = self
            .client
            .get(self.search_url())
            .query(&[
                ("dataset", self.dataset.as_str()),
                ("lang", "DE"),
                ("rows", rows.as_str()),
                ("facet", METRIC_FIELD),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| KoronaError::fetch(format!("RKI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(KoronaError::fetch(format!("RKI API error {status}: {body}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| KoronaError::fetch(format!("Invalid RKI response: {e}")))?;

        let metrics: Vec<RegionMetric> = body
            .records
            .into_iter()
            .filter_map(|r| {
                let county = r.fields.county?;
                Some(RegionMetric::new(county, r.fields.cases7_per_100k))
            })
            .collect();

        tracing::debug!("📥 Fetched {} county records", metrics.len());
        Ok(metrics)
    }
}

// --- Opendatasoft API Types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    fields: CountyFields,
}

#[derive(Debug, Deserialize)]
struct CountyFields {
    county: Option<String>,
    cases7_per_100k: Option<f64>,
}
