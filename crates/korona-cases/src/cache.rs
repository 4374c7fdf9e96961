//! In-memory snapshot of the metric dataset.
//! Fetched lazily on first use; `refresh()` replaces it wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use async_trait::async_trait;

use crate::region;
use korona_core::error::Result;
use korona_core::traits::{MetricLookup, MetricSource};
use korona_core::types::RegionMetric;

#[derive(Debug, Clone)]
struct Snapshot {
    /// Distinct county names, first-seen order.
    regions: Vec<String>,
    values: HashMap<String, Option<f64>>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    fn from_metrics(metrics: Vec<RegionMetric>) -> Self {
        let mut regions = Vec::with_capacity(metrics.len());
        let mut values = HashMap::with_capacity(metrics.len());
        for m in metrics {
            // Later records for the same county overwrite earlier ones
            if values.insert(m.region.clone(), m.value).is_none() {
                regions.push(m.region);
            }
        }
        Self {
            regions,
            values,
            fetched_at: Utc::now(),
        }
    }
}

/// Lazily loaded cache in front of a [`MetricSource`].
pub struct MetricCache {
    source: Arc<dyn MetricSource>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl MetricCache {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    /// Re-fetch the dataset. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<usize> {
        let metrics = self.source.fetch_all().await?;
        let snapshot = Arc::new(Snapshot::from_metrics(metrics));
        let count = snapshot.regions.len();
        *self.snapshot.write().await = Some(snapshot);
        tracing::info!("🔄 Case data refreshed: {count} counties");
        Ok(count)
    }

    async fn current(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut guard = self.snapshot.write().await;
        // Another task may have loaded it while we waited for the write lock
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(Snapshot::from_metrics(self.source.fetch_all().await?));
        tracing::info!("📥 Case data loaded: {} counties", snapshot.regions.len());
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// All known county names.
    pub async fn regions(&self) -> Result<Vec<String>> {
        Ok(self.current().await?.regions.clone())
    }

    /// Latest value for `region`; `None` if the county is unknown or has no value.
    pub async fn value_for(&self, region: &str) -> Result<Option<f64>> {
        Ok(self.current().await?.values.get(region).copied().flatten())
    }

    /// County lookup against the cached names.
    pub async fn find_regions(&self, query: &str) -> Result<Vec<String>> {
        let snapshot = self.current().await?;
        Ok(region::resolve(query, &snapshot.regions))
    }

    /// When the current snapshot was fetched, if any.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.as_ref().map(|s| s.fetched_at)
    }
}

#[async_trait]
impl MetricLookup for MetricCache {
    async fn value_for(&self, region: &str) -> Result<Option<f64>> {
        MetricCache::value_for(self, region).await
    }

    async fn refresh(&self) -> Result<usize> {
        MetricCache::refresh(self).await
    }
}
