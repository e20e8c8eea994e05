//! Upsert of discovered apps into the app table.

use std::collections::HashMap;

use anyhow::{Context, Result};
use flame_common::{App, Category, CategoryKind};

use super::labels::{Declaration, Provider};
use crate::server::db::FlameDb;

/// What one reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub unpinned: usize,
    pub categories_created: usize,
}

/// Reconcile declarations from every provider that answered this cycle.
///
/// Runs in one transaction: categories are resolved (and created when
/// missing), then every app is unpinned when `unpin_stopped` is set, then each
/// declaration is upserted by exact name and pinned.
pub fn apply(
    db: &FlameDb,
    batches: &[(Provider, Vec<Declaration>)],
    unpin_stopped: bool,
) -> Result<ReconcileReport> {
    db.transaction(|db| {
        let mut report = ReconcileReport::default();
        let mut resolver = CategoryResolver::default();

        let mut candidates = Vec::new();
        for (provider, declarations) in batches {
            for decl in declarations {
                let category_id = resolver.resolve(db, *provider, decl, &mut report)?;
                candidates.push((*provider, decl, category_id));
            }
        }

        if unpin_stopped {
            report.unpinned = db.unpin_all_apps()?;
        }

        for (provider, decl, category_id) in candidates {
            upsert(db, provider, decl, category_id, &mut report)?;
        }
        Ok(report)
    })
}

fn upsert(
    db: &FlameDb,
    provider: Provider,
    decl: &Declaration,
    category_id: i64,
    report: &mut ReconcileReport,
) -> Result<()> {
    let sentinel = provider.sentinel_icon();
    match db.find_app_by_name(&decl.name)? {
        Some(mut app) => {
            let keep_icon =
                decl.icon == "custom" || (decl.icon == sentinel && app.icon != sentinel);
            app.name = decl.name.clone();
            app.url = decl.url.clone();
            app.is_pinned = true;
            if !keep_icon {
                app.icon = decl.icon.clone();
                app.category_id = category_id;
                app.order_id = Some(decl.order_id);
            }
            db.write_app(&app)
                .with_context(|| format!("Failed to update discovered app {}", decl.name))?;
            tracing::debug!(app = %decl.name, %provider, keep_icon, "updated discovered app");
            report.updated += 1;
        }
        None => {
            let icon = if decl.icon == "custom" {
                sentinel.to_string()
            } else {
                decl.icon.clone()
            };
            db.insert_app(&App {
                id: 0,
                name: decl.name.clone(),
                url: decl.url.clone(),
                description: String::new(),
                category_id,
                icon,
                is_pinned: true,
                is_public: true,
                order_id: Some(decl.order_id),
                created_at: String::new(),
                updated_at: String::new(),
            })
            .with_context(|| format!("Failed to create discovered app {}", decl.name))?;
            tracing::debug!(app = %decl.name, %provider, "created discovered app");
            report.created += 1;
        }
    }
    Ok(())
}

/// Maps category labels to ids, creating categories the first time they are referenced.
#[derive(Default)]
struct CategoryResolver {
    by_name: HashMap<String, i64>,
}

impl CategoryResolver {
    fn resolve(
        &mut self,
        db: &FlameDb,
        provider: Provider,
        decl: &Declaration,
        report: &mut ReconcileReport,
    ) -> Result<i64> {
        let Some(name) = &decl.category else {
            return self.ensure_default(db, provider);
        };
        let key = name.to_lowercase();
        if let Some(id) = self.by_name.get(&key) {
            return Ok(*id);
        }
        let id = match db.find_category_by_name(name, CategoryKind::Apps)? {
            Some(category) => category.id,
            None => {
                let category = db.create_integration_category(name)?;
                tracing::info!(category = %name, %provider, "created category for discovered apps");
                report.categories_created += 1;
                category.id
            }
        };
        self.by_name.insert(key, id);
        Ok(id)
    }

    /// The synthetic provider category becomes a real row on first use.
    fn ensure_default(&mut self, db: &FlameDb, provider: Provider) -> Result<i64> {
        let id = provider.default_category_id();
        if db.get_category(id)?.is_none() {
            let synthetic = Category::synthetic(id)
                .with_context(|| format!("No default category for {}", provider))?;
            db.insert_category_with_id(&synthetic)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::labels::{Labels, parse_declarations};
    use crate::server::db::Visibility;
    use flame_common::{
        DOCKER_CATEGORY_ID, NEW_CATEGORY_ORDER, NewApp, NewCategory, OrderingStrategy,
    };

    fn decl(name: &str, url: &str, icon: &str, category: Option<&str>) -> Declaration {
        Declaration {
            name: name.to_string(),
            url: url.to_string(),
            icon: icon.to_string(),
            category: category.map(str::to_string),
            order_id: 500,
        }
    }

    fn apps(db: &FlameDb) -> Vec<App> {
        db.list_apps(OrderingStrategy::CreatedAt, Visibility::ALL)
            .unwrap()
    }

    #[test]
    fn test_two_declarations_create_two_pinned_apps() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let labels: Labels = [
            ("flame.type", "app"),
            ("flame.name", "A;B"),
            ("flame.url", "http://a;http://b"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let decls = parse_declarations(&labels, Provider::Docker);

        let report = apply(&db, &[(Provider::Docker, decls)], false)?;
        assert_eq!(report.created, 2);

        let apps = apps(&db);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "A");
        assert_eq!(apps[0].url, "http://a");
        assert_eq!(apps[1].name, "B");
        assert_eq!(apps[1].url, "http://b");
        assert!(apps.iter().all(|a| a.is_pinned));
        assert!(apps.iter().all(|a| a.category_id == DOCKER_CATEGORY_ID));

        let docker = db.get_category(DOCKER_CATEGORY_ID)?.expect("persisted on first use");
        assert_eq!(docker.name, "Docker");
        assert_eq!(docker.order_id, Some(998));
        Ok(())
    }

    #[test]
    fn test_default_category_not_created_without_reference() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        apply(
            &db,
            &[(Provider::Docker, vec![decl("A", "http://a", "docker", Some("Media"))])],
            false,
        )?;
        assert!(db.get_category(DOCKER_CATEGORY_ID)?.is_none());
        Ok(())
    }

    #[test]
    fn test_category_labels_match_case_insensitively_or_create() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(
            &NewCategory {
                name: "Media".into(),
                kind: Some(CategoryKind::Apps),
                ..Default::default()
            },
            true,
        )?;

        let report = apply(
            &db,
            &[(
                Provider::Docker,
                vec![
                    decl("Plex", "http://plex", "docker", Some("MEDIA")),
                    decl("Grafana", "http://grafana", "docker", Some("Monitoring")),
                    decl("Loki", "http://loki", "docker", Some("monitoring")),
                ],
            )],
            false,
        )?;
        assert_eq!(report.categories_created, 1);

        let plex = db.find_app_by_name("Plex")?.unwrap();
        assert_eq!(plex.category_id, media.id);

        let monitoring = db
            .find_category_by_name("Monitoring", CategoryKind::Apps)?
            .unwrap();
        assert_eq!(monitoring.order_id, Some(NEW_CATEGORY_ORDER));
        assert!(monitoring.is_pinned);
        let loki = db.find_app_by_name("Loki")?.unwrap();
        assert_eq!(loki.category_id, monitoring.id);
        Ok(())
    }

    #[test]
    fn test_stopped_apps_are_unpinned_not_deleted() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        apply(
            &db,
            &[(
                Provider::Docker,
                vec![decl("A", "http://a", "docker", None), decl("B", "http://b", "docker", None)],
            )],
            true,
        )?;

        let report = apply(
            &db,
            &[(Provider::Docker, vec![decl("A", "http://a", "docker", None)])],
            true,
        )?;
        assert_eq!(report.unpinned, 2);
        assert_eq!(report.updated, 1);

        let a = db.find_app_by_name("A")?.unwrap();
        let b = db.find_app_by_name("B")?.expect("row survives");
        assert!(a.is_pinned);
        assert!(!b.is_pinned);
        Ok(())
    }

    #[test]
    fn test_custom_icon_is_preserved() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let app = db.create_app(
            &NewApp {
                name: "Plex".into(),
                url: "http://old".into(),
                icon: Some("plex.png".into()),
                ..Default::default()
            },
            false,
        )?;

        apply(
            &db,
            &[(Provider::Docker, vec![decl("Plex", "http://new", "docker", None)])],
            false,
        )?;
        let updated = db.get_app(app.id)?.unwrap();
        assert_eq!(updated.icon, "plex.png");
        assert_eq!(updated.url, "http://new");
        assert!(updated.is_pinned);
        assert_eq!(updated.category_id, app.category_id);

        apply(
            &db,
            &[(Provider::Docker, vec![decl("Plex", "http://new", "custom", None)])],
            false,
        )?;
        assert_eq!(db.get_app(app.id)?.unwrap().icon, "plex.png");

        apply(
            &db,
            &[(Provider::Docker, vec![decl("Plex", "http://new", "movie", None)])],
            false,
        )?;
        let overwritten = db.get_app(app.id)?.unwrap();
        assert_eq!(overwritten.icon, "movie");
        assert_eq!(overwritten.category_id, DOCKER_CATEGORY_ID);
        Ok(())
    }

    #[test]
    fn test_custom_icon_on_new_app_becomes_sentinel() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        apply(
            &db,
            &[(Provider::Kubernetes, vec![decl("Dash", "http://dash", "custom", None)])],
            false,
        )?;
        let dash = db.find_app_by_name("Dash")?.unwrap();
        assert_eq!(dash.icon, "kubernetes");
        assert_eq!(dash.category_id, -3);
        Ok(())
    }

    #[test]
    fn test_sentinel_icon_overwrites_sentinel() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        apply(
            &db,
            &[(Provider::Docker, vec![decl("A", "http://a", "docker", None)])],
            false,
        )?;
        let mut moved = decl("A", "http://a2", "docker", None);
        moved.order_id = 7;
        apply(&db, &[(Provider::Docker, vec![moved])], false)?;
        let a = db.find_app_by_name("A")?.unwrap();
        assert_eq!(a.order_id, Some(7));
        assert_eq!(a.url, "http://a2");
        Ok(())
    }
}
