//! Notification dispatch. Sends each subscribed user the picture for their
//! county. One user's failure never aborts the batch: every per-user error is
//! logged and counted, and the batch moves on.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use korona_cases::asset::{AssetBucket, AssetCatalog, map_to_asset};
use korona_core::error::{KoronaError, Result};
use korona_core::traits::{MetricLookup, Transport, UserStore};
use korona_core::types::UserTarget;

/// Sent to users who have not picked a county yet.
pub const REGION_PROMPT: &str = "Please type the name of your county.";

/// Result of notifying a single user.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Picture sent.
    Delivered(AssetBucket),
    /// User has no county; the selection prompt was sent instead.
    NeedsRegion,
    /// Metric lookup or delivery failed.
    Failed(KoronaError),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered(_))
    }
}

/// Tally of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub total: usize,
    pub delivered: usize,
    pub needs_region: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(mut self, outcome: &DispatchOutcome) -> Self {
        self.total += 1;
        match outcome {
            DispatchOutcome::Delivered(_) => self.delivered += 1,
            DispatchOutcome::NeedsRegion => self.needs_region += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
        }
        self
    }
}

/// Caption under the picture.
pub fn caption(region: &str, value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{region}: {v}"),
        None => format!("{region}: no data"),
    }
}

/// Per-user notification pipeline. Holds only shared handles, so one
/// instance serves the daily batch and on-demand requests concurrently.
pub struct Dispatcher {
    users: Arc<dyn UserStore>,
    metrics: Arc<dyn MetricLookup>,
    transport: Arc<dyn Transport>,
    assets: AssetCatalog,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        users: Arc<dyn UserStore>,
        metrics: Arc<dyn MetricLookup>,
        transport: Arc<dyn Transport>,
        assets: AssetCatalog,
    ) -> Self {
        Self {
            users,
            metrics,
            transport,
            assets,
            concurrency: 4,
        }
    }

    /// Users notified in parallel by [`dispatch_to_all`](Self::dispatch_to_all).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Notify a single user. Never returns an error; failures are logged and
    /// reported as [`DispatchOutcome::Failed`].
    pub async fn dispatch_to_one(&self, user: &UserTarget) -> DispatchOutcome {
        let outcome = self.notify(user).await;
        match &outcome {
            DispatchOutcome::Delivered(bucket) => {
                tracing::info!("✅ Sent bucket {} to {}", bucket, user.user_id)
            }
            DispatchOutcome::NeedsRegion => {
                tracing::info!("📍 User {} has no county, prompted", user.user_id)
            }
            DispatchOutcome::Failed(e) => {
                tracing::warn!("⚠️ Could not notify {}: {e}", user.user_id)
            }
        }
        outcome
    }

    async fn notify(&self, user: &UserTarget) -> DispatchOutcome {
        let Some(region) = user.region.as_deref() else {
            return match self.transport.send_text(&user.user_id, REGION_PROMPT).await {
                Ok(()) => DispatchOutcome::NeedsRegion,
                Err(e) => DispatchOutcome::Failed(e),
            };
        };

        let value = match self.metrics.value_for(region).await {
            Ok(v) => v,
            Err(e) => return DispatchOutcome::Failed(e),
        };

        let bucket = map_to_asset(value);
        let path = self.assets.path_for(bucket);
        match self
            .transport
            .send_image(&user.user_id, &path, &caption(region, value))
            .await
        {
            Ok(()) => DispatchOutcome::Delivered(bucket),
            Err(e) => DispatchOutcome::Failed(e),
        }
    }

    /// Notify every stored user. Only a failure to list the users is an
    /// error; per-user failures end up in the report.
    pub async fn dispatch_to_all(&self) -> Result<DispatchReport> {
        let users = self.users.list_users().await?;
        tracing::info!("📣 Dispatching to {} users", users.len());

        let report = stream::iter(users)
            .map(|user| async move { self.dispatch_to_one(&user).await })
            .buffer_unordered(self.concurrency)
            .fold(DispatchReport::default(), |report, outcome| async move {
                report.record(&outcome)
            })
            .await;

        tracing::info!(
            "📊 Dispatch done: {} delivered, {} need a county, {} failed (of {})",
            report.delivered,
            report.needs_region,
            report.failed,
            report.total
        );
        Ok(report)
    }

    /// Scheduled entry point: optionally refresh the data, then notify all.
    /// A failed refresh is logged and the batch runs on the previous data.
    pub async fn refresh_and_dispatch_all(&self, refresh: bool) -> Result<DispatchReport> {
        if refresh && let Err(e) = self.metrics.refresh().await {
            tracing::warn!("⚠️ Case data refresh failed, using previous data: {e}");
        }
        self.dispatch_to_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        users: Vec<UserTarget>,
        fail_list: bool,
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn list_users(&self) -> Result<Vec<UserTarget>> {
            if self.fail_list {
                return Err(KoronaError::store("database locked"));
            }
            Ok(self.users.clone())
        }
        async fn get_user(&self, user_id: &str) -> Result<Option<UserTarget>> {
            Ok(self.users.iter().find(|u| u.user_id == user_id).cloned())
        }
        async fn upsert(&self, _user: &UserTarget) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _user: &UserTarget) -> Result<()> {
            Ok(())
        }
    }

    /// Regions missing from the map fail the lookup.
    #[derive(Default)]
    struct StaticMetrics {
        values: HashMap<String, Option<f64>>,
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    #[async_trait]
    impl MetricLookup for StaticMetrics {
        async fn value_for(&self, region: &str) -> Result<Option<f64>> {
            self.values
                .get(region)
                .copied()
                .ok_or_else(|| KoronaError::fetch(format!("no data source for {region}")))
        }
        async fn refresh(&self) -> Result<usize> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(KoronaError::fetch("down"));
            }
            Ok(self.values.len())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String, String),
        Image(String, PathBuf, String),
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        blocked: Vec<String>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn check(&self, user_id: &str) -> Result<()> {
            if self.blocked.iter().any(|b| b == user_id) {
                return Err(KoronaError::delivery("bot was blocked by the user"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send_text(&self, user_id: &str, text: &str) -> Result<()> {
            self.check(user_id)?;
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(user_id.into(), text.into()));
            Ok(())
        }
        async fn send_image(&self, user_id: &str, path: &Path, caption: &str) -> Result<()> {
            self.check(user_id)?;
            self.sent.lock().unwrap().push(Sent::Image(
                user_id.into(),
                path.to_path_buf(),
                caption.into(),
            ));
            Ok(())
        }
    }

    fn metrics(values: &[(&str, Option<f64>)]) -> StaticMetrics {
        StaticMetrics {
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..StaticMetrics::default()
        }
    }

    fn dispatcher(
        store: MemoryStore,
        metrics: StaticMetrics,
        transport: Arc<RecordingTransport>,
    ) -> (Dispatcher, Arc<StaticMetrics>) {
        let metrics = Arc::new(metrics);
        let d = Dispatcher::new(
            Arc::new(store),
            metrics.clone(),
            transport,
            AssetCatalog::new("Assets"),
        );
        (d, metrics)
    }

    #[tokio::test]
    async fn test_batch_contains_per_user_failures() {
        let store = MemoryStore {
            users: vec![
                UserTarget::new("A", None),
                UserTarget::new("B", Some("X".into())),
                UserTarget::new("C", Some("Y".into())),
            ],
            ..MemoryStore::default()
        };
        let transport = Arc::new(RecordingTransport::default());
        let (d, _) = dispatcher(store, metrics(&[("Y", Some(80.0))]), transport.clone());

        let report = d.dispatch_to_all().await.unwrap();
        assert_eq!(
            report,
            DispatchReport {
                total: 3,
                delivered: 1,
                needs_region: 1,
                failed: 1
            }
        );

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&Sent::Text("A".into(), REGION_PROMPT.into())));
        assert!(sent.contains(&Sent::Image(
            "C".into(),
            PathBuf::from("Assets").join("75.jpg"),
            "Y: 80".into()
        )));
        assert!(!sent.iter().any(|s| matches!(s, Sent::Text(u, _) | Sent::Image(u, _, _) if u == "B")));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_contained() {
        let store = MemoryStore {
            users: vec![
                UserTarget::new("1", Some("Y".into())),
                UserTarget::new("2", Some("Y".into())),
                UserTarget::new("3", None),
            ],
            ..MemoryStore::default()
        };
        let transport = Arc::new(RecordingTransport {
            blocked: vec!["1".into(), "3".into()],
            ..RecordingTransport::default()
        });
        let (d, _) = dispatcher(store, metrics(&[("Y", Some(5.0))]), transport.clone());

        let report = d.with_concurrency(1).dispatch_to_all().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_list_failure_is_an_error() {
        let store = MemoryStore {
            fail_list: true,
            ..MemoryStore::default()
        };
        let transport = Arc::new(RecordingTransport::default());
        let (d, _) = dispatcher(store, metrics(&[]), transport.clone());
        assert!(matches!(d.dispatch_to_all().await, Err(KoronaError::Store(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_value_sends_error_picture() {
        let transport = Arc::new(RecordingTransport::default());
        let (d, _) = dispatcher(
            MemoryStore::default(),
            metrics(&[("LK Fulda", None)]),
            transport.clone(),
        );

        let outcome = d
            .dispatch_to_one(&UserTarget::new("9", Some("LK Fulda".into())))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Delivered(AssetBucket::Unavailable)));
        assert_eq!(
            transport.sent(),
            vec![Sent::Image(
                "9".into(),
                PathBuf::from("Assets").join("error.jpg"),
                "LK Fulda: no data".into()
            )]
        );
    }

    #[tokio::test]
    async fn test_unset_region_skips_metric_lookup() {
        let transport = Arc::new(RecordingTransport::default());
        // Any lookup would fail: the map is empty
        let (d, _) = dispatcher(MemoryStore::default(), metrics(&[]), transport.clone());
        let outcome = d.dispatch_to_one(&UserTarget::unregistered("5")).await;
        assert!(matches!(outcome, DispatchOutcome::NeedsRegion));
        assert!(!outcome.is_delivered());
    }

    #[tokio::test]
    async fn test_refresh_before_batch() {
        let store = MemoryStore {
            users: vec![UserTarget::new("1", Some("Y".into()))],
            ..MemoryStore::default()
        };
        let transport = Arc::new(RecordingTransport::default());
        let failing = StaticMetrics {
            fail_refresh: true,
            ..metrics(&[("Y", Some(200.0))])
        };
        let (d, m) = dispatcher(store, failing, transport.clone());

        let report = d.refresh_and_dispatch_all(true).await.unwrap();
        assert_eq!(m.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered, 1);

        d.refresh_and_dispatch_all(false).await.unwrap();
        assert_eq!(m.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_batch_and_on_demand() {
        let users: Vec<UserTarget> = (0..20)
            .map(|i| UserTarget::new(i.to_string(), Some("Y".into())))
            .collect();
        let store = MemoryStore {
            users,
            ..MemoryStore::default()
        };
        let transport = Arc::new(RecordingTransport::default());
        let (d, _) = dispatcher(store, metrics(&[("Y", Some(42.0))]), transport.clone());
        let d = Arc::new(d);

        let batch = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.dispatch_to_all().await }
        });
        let single = d
            .dispatch_to_one(&UserTarget::new("x", Some("Y".into())))
            .await;

        assert!(single.is_delivered());
        assert_eq!(batch.await.unwrap().unwrap().delivered, 20);
        assert_eq!(transport.sent().len(), 21);
    }

    #[test]
    fn test_caption() {
        assert_eq!(caption("SK Kassel", Some(12.5)), "SK Kassel: 12.5");
        assert_eq!(caption("SK Kassel", Some(100.0)), "SK Kassel: 100");
        assert_eq!(caption("SK Kassel", None), "SK Kassel: no data");
    }
}
