//! Discovery of apps from container and cluster metadata.
//!
//! | Module       | Role                                                  |
//! |--------------|-------------------------------------------------------|
//! | `labels`     | Parse label/annotation sets into app declarations     |
//! | `docker`     | Running containers from the Docker Engine API         |
//! | `kubernetes` | Ingress annotations from the in-cluster API server    |
//! | `reconcile`  | Upsert declarations into the app table                |
//!
//! [`IntegrationSync`] ties these together. A refresh reads the current
//! settings, fetches from every enabled provider, then reconciles all of the
//! answers in a single transaction. Concurrent refreshes collapse into one.

pub mod docker;
pub mod kubernetes;
pub mod labels;
pub mod reconcile;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::errors::IntegrationError;
use crate::server::db::DbHandle;
use crate::settings::Settings;
use labels::{Declaration, Labels, Provider, parse_declarations};
pub use reconcile::ReconcileReport;

/// Something that lists label sets for one provider.
#[async_trait]
pub trait InventorySource: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(&self) -> Result<Vec<Labels>, IntegrationError>;
}

type SourceFactory = Box<dyn Fn(&Settings) -> Vec<Arc<dyn InventorySource>> + Send + Sync>;

/// Single-flight coordinator for integration refreshes.
pub struct IntegrationSync {
    running: Mutex<()>,
    generation: AtomicU64,
    sources: SourceFactory,
}

impl Default for IntegrationSync {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationSync {
    /// Sources follow the `dockerApps`, `dockerHost` and `kubernetesApps` settings.
    pub fn new() -> Self {
        Self {
            running: Mutex::new(()),
            generation: AtomicU64::new(0),
            sources: Box::new(sources_from_settings),
        }
    }

    /// Use a fixed set of sources whenever any integration is enabled.
    pub fn with_sources(sources: Vec<Arc<dyn InventorySource>>) -> Self {
        Self {
            running: Mutex::new(()),
            generation: AtomicU64::new(0),
            sources: Box::new(move |_| sources.clone()),
        }
    }

    /// Run one refresh cycle.
    ///
    /// Returns `None` when integrations are disabled, when no provider
    /// answered, or when a concurrent caller completed a cycle while this one
    /// waited for it.
    pub async fn refresh(&self, db: &DbHandle) -> Result<Option<ReconcileReport>> {
        let seen = self.generation.load(Ordering::Acquire);
        let _guard = self.running.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            tracing::debug!("integration refresh satisfied by concurrent cycle");
            return Ok(None);
        }
        let result = self.run_cycle(db).await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn run_cycle(&self, db: &DbHandle) -> Result<Option<ReconcileReport>> {
        let settings = db.call(|db| db.load_settings()).await?;
        if !settings.integrations_enabled() {
            return Ok(None);
        }

        let mut batches: Vec<(Provider, Vec<Declaration>)> = Vec::new();
        let mut any_failed = false;
        for source in (self.sources)(&settings) {
            let provider = source.provider();
            match source.fetch().await {
                Ok(sets) => {
                    let declarations: Vec<Declaration> = sets
                        .iter()
                        .flat_map(|labels| parse_declarations(labels, provider))
                        .collect();
                    tracing::debug!(
                        %provider,
                        label_sets = sets.len(),
                        declarations = declarations.len(),
                        "fetched inventory"
                    );
                    batches.push((provider, declarations));
                }
                Err(e) => {
                    tracing::warn!(%provider, error = %e, "inventory fetch failed");
                    any_failed = true;
                }
            }
        }

        if batches.is_empty() {
            return Ok(None);
        }

        // A provider that did not answer must not have its apps unpinned.
        let unpin = settings.unpin_stopped_apps && !any_failed;
        let report = db
            .call(move |db| reconcile::apply(db, &batches, unpin))
            .await?;
        tracing::info!(
            created = report.created,
            updated = report.updated,
            unpinned = report.unpinned,
            categories_created = report.categories_created,
            "integration refresh complete"
        );
        Ok(Some(report))
    }

    /// Refresh every `period` in the background, starting immediately.
    pub fn spawn_periodic(self: Arc<Self>, db: DbHandle, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh(&db).await {
                    tracing::warn!(error = %e, "periodic integration refresh failed");
                }
            }
        })
    }
}

fn sources_from_settings(settings: &Settings) -> Vec<Arc<dyn InventorySource>> {
    let mut sources: Vec<Arc<dyn InventorySource>> = Vec::new();
    if settings.docker_apps {
        sources.push(Arc::new(docker::DockerSource::new(settings.docker_host.clone())));
    }
    if settings.kubernetes_apps {
        sources.push(Arc::new(kubernetes::KubernetesSource::in_cluster()));
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::db::FlameDb;
    use std::sync::atomic::AtomicUsize;

    struct FakeSource {
        provider: Provider,
        labels: Option<Vec<Labels>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeSource {
        fn up(provider: Provider, sets: Vec<Vec<(&str, &str)>>) -> Arc<Self> {
            let labels = sets
                .into_iter()
                .map(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect();
            Arc::new(Self {
                provider,
                labels: Some(labels),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn down(provider: Provider) -> Arc<Self> {
            Arc::new(Self {
                provider,
                labels: None,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl InventorySource for FakeSource {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch(&self) -> Result<Vec<Labels>, IntegrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.labels
                .clone()
                .ok_or_else(|| IntegrationError::NotInCluster("fake source down".into()))
        }
    }

    fn db_with(settings: serde_json::Value) -> Result<DbHandle> {
        let db = FlameDb::new_in_memory()?;
        if let serde_json::Value::Object(patch) = settings {
            db.update_settings(&patch)?;
        }
        Ok(DbHandle::new(db))
    }

    fn docker_app(name: &str) -> Vec<(&str, &str)> {
        vec![
            ("flame.type", "app"),
            ("flame.name", name),
            ("flame.url", "http://svc.lan"),
        ]
    }

    #[tokio::test]
    async fn test_disabled_integrations_do_nothing() -> Result<()> {
        let db = db_with(serde_json::json!({}))?;
        let source = FakeSource::up(Provider::Docker, vec![docker_app("A")]);
        let sync = IntegrationSync::with_sources(vec![source.clone()]);

        assert!(sync.refresh(&db).await?.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_creates_discovered_apps() -> Result<()> {
        let db = db_with(serde_json::json!({ "dockerApps": true }))?;
        let sync = IntegrationSync::with_sources(vec![FakeSource::up(
            Provider::Docker,
            vec![docker_app("A"), docker_app("B"), vec![("other", "label")]],
        )]);

        let report = sync.refresh(&db).await?.expect("cycle ran");
        assert_eq!(report.created, 2);
        let found = db.call(|db| db.find_app_by_name("B")).await?;
        assert!(found.is_some_and(|app| app.is_pinned));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_provider_skips_unpin() -> Result<()> {
        let db = db_with(serde_json::json!({
            "dockerApps": true,
            "kubernetesApps": true,
            "unpinStoppedApps": true
        }))?;
        let first = IntegrationSync::with_sources(vec![
            FakeSource::up(Provider::Docker, vec![docker_app("A")]),
            FakeSource::up(
                Provider::Kubernetes,
                vec![vec![
                    ("flame.pawelmalak/type", "app"),
                    ("flame.pawelmalak/name", "K"),
                    ("flame.pawelmalak/url", "http://k"),
                ]],
            ),
        ]);
        first.refresh(&db).await?;

        let second = IntegrationSync::with_sources(vec![
            FakeSource::up(Provider::Docker, vec![docker_app("A")]),
            FakeSource::down(Provider::Kubernetes),
        ]);
        let report = second.refresh(&db).await?.expect("docker answered");
        assert_eq!(report.unpinned, 0);
        assert_eq!(report.updated, 1);

        let k = db.call(|db| db.find_app_by_name("K")).await?.unwrap();
        assert!(k.is_pinned);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_providers_down_writes_nothing() -> Result<()> {
        let db = db_with(serde_json::json!({ "dockerApps": true, "unpinStoppedApps": true }))?;
        let sync = IntegrationSync::with_sources(vec![FakeSource::down(Provider::Docker)]);
        assert!(sync.refresh(&db).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_collapse() -> Result<()> {
        let db = db_with(serde_json::json!({ "dockerApps": true }))?;
        let source = Arc::new(FakeSource {
            provider: Provider::Docker,
            labels: Some(vec![
                docker_app("A")
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ]),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let sync = IntegrationSync::with_sources(vec![source.clone()]);

        let (a, b) = tokio::join!(sync.refresh(&db), sync.refresh(&db));
        let ran = [a?, b?].iter().filter(|r| r.is_some()).count();
        assert_eq!(ran, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let apps = db
            .call(|db| {
                db.list_apps(
                    flame_common::OrderingStrategy::CreatedAt,
                    crate::server::db::Visibility::ALL,
                )
            })
            .await?;
        assert_eq!(apps.len(), 1);
        Ok(())
    }

    #[test]
    fn test_sources_follow_settings() {
        let mut settings = Settings::default();
        assert!(sources_from_settings(&settings).is_empty());
        settings.docker_apps = true;
        settings.kubernetes_apps = true;
        let providers: Vec<Provider> = sources_from_settings(&settings)
            .iter()
            .map(|s| s.provider())
            .collect();
        assert_eq!(providers, vec![Provider::Docker, Provider::Kubernetes]);
    }
}
