#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::error::AppError;
    use crate::metrics::Metrics;
    use crate::service::{DataService, PageRequest, ServiceConfig};
    use crate::sse::testing::RecordingSink;
    use crate::sse::{Broadcaster, ChannelRegistry};
    use crate::store::{
        Condition, FindQuery, Predicate, Record, RecordId, RecordStore, SqliteStore, StoreError, StoreResult,
    };

    struct Fixture {
        service: DataService<SqliteStore>,
        registry: ChannelRegistry,
        _dir: TempDir,
    }

    async fn fixture(config: ServiceConfig) -> Fixture {
        fixture_with_connections(config, 2).await
    }

    async fn fixture_with_connections(config: ServiceConfig, max_connections: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db_cfg = crate::config::DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("svc.db").display()),
            max_connections,
        };
        let pool = crate::db::connect(&db_cfg).await.unwrap();
        crate::db::init_db(&pool).await.unwrap();
        crate::db::ensure_resource_table(&pool, "widgets", &["slug"]).await.unwrap();

        let registry = ChannelRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone(), Metrics::new());
        let store = SqliteStore::new(pool, "widgets").unwrap();
        let service = DataService::new(store, "widget", config).with_broadcaster(broadcaster);
        Fixture { service, registry, _dir: dir }
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_soft_delete_hides_record_but_keeps_row() {
        let fx = fixture(ServiceConfig::default()).await;
        let created = fx.service.create(record(json!({"name": "a"})), &[]).await.unwrap();
        let id = created["id"].as_i64().unwrap();

        let deleted = fx.service.delete_by_id(id, &[]).await.unwrap();
        assert_eq!(deleted["is_deleted"], json!(true));
        assert!(deleted["deleted_at"].is_string());

        assert!(fx.service.find_by_id(id).await.unwrap().is_none());
        assert_eq!(fx.service.count(Predicate::new()).await.unwrap(), 0);
        assert!(!fx.service.exists(Predicate::new().equals("name", "a")).await.unwrap());
        // Row is still in the store
        assert!(fx.service.store().find_first(&Predicate::new().equals("id", id)).await.unwrap().is_some());

        assert!(matches!(fx.service.delete_by_id(id, &[]).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            fx.service.update_by_id(id, record(json!({"name": "b"})), &[]).await,
            Err(AppError::NotFound(msg)) if msg == "Widget not found"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_on_one_record() {
        let fx = fixture_with_connections(ServiceConfig::default(), 8).await;
        let id = fx.service.create(record(json!({"n": -1})), &[]).await.unwrap()["id"].as_i64().unwrap();
        let service = Arc::new(fx.service);

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.update_by_id(id, record(json!({"n": i})), &[]).await })
            })
            .collect();
        let mut failures = Vec::new();
        for task in tasks {
            if let Err(e) = task.await.unwrap() {
                failures.push(e.to_string());
            }
        }
        assert!(failures.is_empty(), "{} updates failed, first: {:?}", failures.len(), failures.first());

        let n = service.find_by_id(id).await.unwrap().unwrap()["n"].as_i64().unwrap();
        assert!((0..64).contains(&n));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_soft_delete_and_updates() {
        let fx = fixture_with_connections(ServiceConfig::default(), 8).await;
        let id = fx.service.create(record(json!({"n": 0})), &[]).await.unwrap()["id"].as_i64().unwrap();
        let service = Arc::new(fx.service);

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    if i % 8 == 0 {
                        service.delete_by_id(id, &[]).await
                    } else {
                        service.update_by_id(id, record(json!({"n": i})), &[]).await
                    }
                })
            })
            .collect();
        let mut deletes_won = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(r) if r.get("is_deleted") == Some(&json!(true)) => deletes_won += 1,
                Ok(_) | Err(AppError::NotFound(_)) => {}
                Err(e) => panic!("mutation failed under contention: {e}"),
            }
        }
        // Exactly one delete finds the record live
        assert_eq!(deletes_won, 1);
        assert!(service.find_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hard_delete_when_soft_delete_disabled() {
        let fx = fixture(ServiceConfig { enable_soft_delete: false, ..ServiceConfig::default() }).await;
        let id = fx.service.create(record(json!({"name": "a"})), &[]).await.unwrap()["id"].as_i64().unwrap();
        fx.service.delete_by_id(id, &[]).await.unwrap();
        assert!(fx.service.store().find_first(&Predicate::new().equals("id", id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_fields() {
        let fx = fixture(ServiceConfig::default()).await;
        let created = fx.service.create(record(json!({"name": "a", "created_at": "forged"})), &[]).await.unwrap();
        assert_ne!(created["created_at"], json!("forged"));
        assert!(created["updated_at"].is_string());
        let id = created["id"].as_i64().unwrap();

        let updated = fx.service.update_by_id(id, record(json!({"created_at": "forged"})), &[]).await.unwrap();
        assert_eq!(updated["created_at"], created["created_at"]);

        let fx = fixture(ServiceConfig { enable_audit_fields: false, ..ServiceConfig::default() }).await;
        let created = fx.service.create(record(json!({"name": "a"})), &[]).await.unwrap();
        assert!(created.get("created_at").is_none());
    }

    #[tokio::test]
    async fn test_update_is_a_shallow_merge() {
        let fx = fixture(ServiceConfig::default()).await;
        let created = fx.service.create(record(json!({"name": "a", "meta": {"x": 1, "y": 2}})), &[]).await.unwrap();
        let id = created["id"].as_i64().unwrap();

        let updated = fx.service.update_by_id(id, record(json!({"meta": {"x": 9}})), &[]).await.unwrap();
        assert_eq!(updated["name"], "a");
        assert_eq!(updated["meta"], json!({"x": 9}));
    }

    #[tokio::test]
    async fn test_create_broadcasts_to_channels_and_wildcard() {
        let fx = fixture(ServiceConfig::default()).await;
        let (posts, posts_sink) = RecordingSink::handle();
        let (all, all_sink) = RecordingSink::handle();
        fx.registry.subscribe("widgets", posts);
        fx.registry.subscribe("all", all);

        let created = fx.service.create(record(json!({"name": "a"})), &channels(&["widgets"])).await.unwrap();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(posts_sink.written().len(), 1);
        assert!(posts_sink.written()[0].starts_with("event: created\ndata: {"));
        assert_eq!(all_sink.written().len(), 1);

        // Updates and deletes only reach explicit channels
        fx.service.update_by_id(id, record(json!({"name": "b"})), &channels(&["widgets"])).await.unwrap();
        fx.service.delete_by_id(id, &channels(&["widgets"])).await.unwrap();
        let events: Vec<String> = posts_sink.written();
        assert_eq!(events.len(), 3);
        assert!(events[1].starts_with("event: updated\n"));
        assert!(events[2].starts_with("event: deleted\n"));
        assert_eq!(all_sink.written().len(), 1);
    }

    #[tokio::test]
    async fn test_wildcard_is_not_duplicated() {
        let fx = fixture(ServiceConfig::default()).await;
        let (all, all_sink) = RecordingSink::handle();
        fx.registry.subscribe("all", all);
        fx.service.create(record(json!({"name": "a"})), &channels(&["all"])).await.unwrap();
        assert_eq!(all_sink.written().len(), 1);
    }

    #[tokio::test]
    async fn test_sse_disabled_sends_nothing() {
        let fx = fixture(ServiceConfig { enable_sse: false, ..ServiceConfig::default() }).await;
        let (all, all_sink) = RecordingSink::handle();
        fx.registry.subscribe("all", all);
        fx.service.create(record(json!({"name": "a"})), &[]).await.unwrap();
        assert!(all_sink.written().is_empty());
    }

    #[tokio::test]
    async fn test_dead_subscriber_does_not_fail_mutation() {
        let fx = fixture(ServiceConfig::default()).await;
        let (dead, dead_sink) = RecordingSink::handle();
        dead_sink.fail_writes();
        fx.registry.subscribe("all", dead);

        assert!(fx.service.create(record(json!({"name": "a"})), &[]).await.is_ok());
        assert_eq!(fx.registry.count_total(), 0);
    }

    #[tokio::test]
    async fn test_find_many_combines_filters_paging_and_soft_delete() {
        let fx = fixture(ServiceConfig { default_page_size: 2, max_page_size: 3, ..ServiceConfig::default() }).await;
        for n in 1..=5 {
            let kind = if n % 2 == 0 { "even" } else { "odd" };
            fx.service.create(record(json!({"n": n, "kind": kind})), &[]).await.unwrap();
        }
        let first = fx.service.find_one(Predicate::new().equals("n", 1)).await.unwrap().unwrap();
        fx.service.delete_by_id(first["id"].as_i64().unwrap(), &[]).await.unwrap();

        let page = fx.service.find_many(Predicate::new(), PageRequest::default(), None).await.unwrap();
        assert_eq!(page.pagination.total, 4);
        assert_eq!(page.pagination.limit, 2);
        assert_eq!(page.data[0]["n"], 5);

        let odd = fx
            .service
            .find_many(Predicate::new().equals("kind", "odd"), PageRequest::new(Some(1), Some(50)), None)
            .await
            .unwrap();
        assert_eq!(odd.pagination.total, 2);
        assert_eq!(odd.pagination.limit, 3);
        assert!(!odd.pagination.has_next);
    }

    #[tokio::test]
    async fn test_generate_unique_slug() {
        let fx = fixture(ServiceConfig::default()).await;
        assert_eq!(fx.service.generate_unique_slug("Post", None).await.unwrap(), "post");

        fx.service.create(record(json!({"slug": "post"})), &[]).await.unwrap();
        let second = fx.service.create(record(json!({"slug": "post-1"})), &[]).await.unwrap();
        fx.service.create(record(json!({"slug": "post-office"})), &[]).await.unwrap();
        assert_eq!(fx.service.generate_unique_slug("Post", None).await.unwrap(), "post-2");

        // The record being renamed does not collide with itself
        let second_id = second["id"].as_i64().unwrap();
        assert_eq!(fx.service.generate_unique_slug("post", Some(second_id)).await.unwrap(), "post-1");

        // Soft-deleted records still hold their slug
        fx.service.delete_by_id(second_id, &[]).await.unwrap();
        assert_eq!(fx.service.generate_unique_slug("post", None).await.unwrap(), "post-2");

        assert_eq!(fx.service.generate_unique_slug("!!!", None).await.unwrap(), "widget");
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_conflict() {
        let fx = fixture(ServiceConfig::default()).await;
        fx.service.create(record(json!({"slug": "x"})), &[]).await.unwrap();
        let err = fx.service.create(record(json!({"slug": "x"})), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_field_maps_to_validation_error() {
        let fx = fixture(ServiceConfig::default()).await;
        let err = fx.service.count(Predicate::new().equals("bad field", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { field, .. } if field == "bad field"));
    }

    /// Store whose every operation fails with a driver error.
    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn find_many(&self, _query: &FindQuery) -> StoreResult<Vec<Record>> {
            Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut))
        }

        async fn count(&self, _predicate: &Predicate) -> StoreResult<u64> {
            Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut))
        }

        async fn create(&self, _data: Record) -> StoreResult<Record> {
            Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut))
        }

        async fn update(&self, _id: RecordId, _patch: Record, _guard: &Predicate) -> StoreResult<Record> {
            Err(StoreError::RecordNotFound)
        }

        async fn delete(&self, _id: RecordId, _guard: &Predicate) -> StoreResult<Record> {
            Err(StoreError::Corrupt { id: 1, message: "not an object".into() })
        }

        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Sqlx(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_store_errors_are_translated() {
        let svc = DataService::new(FailingStore, "post", ServiceConfig::default());
        match svc.create(Record::new(), &[]).await {
            Err(AppError::Database { message, details }) => {
                assert_eq!(message, "Failed to create post");
                assert!(details.unwrap().contains("pool timed out"));
            }
            other => panic!("expected Database error, got {:?}", other),
        }
        assert!(matches!(svc.update_by_id(1, Record::new(), &[]).await, Err(AppError::NotFound(m)) if m == "Post not found"));
        assert!(matches!(svc.find_by_id(1).await, Err(AppError::Database { .. })));

        let svc = svc.expose_error_details(false);
        match svc.find_many(Predicate::new(), PageRequest::default(), None).await {
            Err(AppError::Database { message, details }) => {
                assert_eq!(message, "Failed to fetch post");
                assert!(details.is_none());
            }
            other => panic!("expected Database error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hard_delete_error_maps_to_database() {
        let config = ServiceConfig { enable_soft_delete: false, ..ServiceConfig::default() };
        let svc = DataService::new(FailingStore, "post", config);
        let err = svc.delete_by_id(1, &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Database { ref message, .. } if message == "Failed to delete post"));
    }

    #[test]
    fn test_scoped_predicate() {
        let svc = DataService::new(FailingStore, "post", ServiceConfig::default());
        let p = svc.scoped(Predicate::new().equals("a", 1));
        assert_eq!(p.get("deleted_at"), Some(&Condition::IsNull(true)));

        let config = ServiceConfig { enable_soft_delete: false, ..ServiceConfig::default() };
        let svc = DataService::new(FailingStore, "post", config);
        assert!(svc.scoped(Predicate::new()).is_empty());
    }
}
