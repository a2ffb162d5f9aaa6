//! Generic CRUD over a [`RecordStore`] with soft delete, audit stamps,
//! pagination and change broadcasting.

pub mod filters;
pub mod pagination;
pub mod slug;

use serde::Deserialize;
use serde_json::Value;
use tracing::Span;

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::sse::{Broadcaster, WILDCARD_CHANNEL};
use crate::store::{Condition, FindQuery, OrderBy, Predicate, Record, RecordId, RecordStore, StoreError};

pub use filters::FilterSet;
pub use pagination::{PageInfo, PageRequest, Paginated, Pagination};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub enable_soft_delete: bool,
    pub enable_audit_fields: bool,
    pub enable_sse: bool,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enable_soft_delete: true,
            enable_audit_fields: true,
            enable_sse: true,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";
pub const IS_DELETED: &str = "is_deleted";
pub const SLUG: &str = "slug";

pub struct DataService<S> {
    store: S,
    resource: String,
    config: ServiceConfig,
    broadcaster: Option<Broadcaster>,
    metrics: Option<Metrics>,
    expose_error_details: bool,
    span: Span,
}

impl<S: RecordStore> DataService<S> {
    pub fn new(store: S, resource: &str, config: ServiceConfig) -> Self {
        Self {
            store,
            resource: resource.to_string(),
            config,
            broadcaster: None,
            metrics: None,
            expose_error_details: true,
            span: tracing::info_span!("data_service", resource = %resource),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether `AppError::Database` carries the underlying error text.
    pub fn expose_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// `filters` restricted to records that are not soft-deleted.
    pub fn scoped(&self, filters: Predicate) -> Predicate {
        if self.config.enable_soft_delete {
            filters.and(live())
        } else {
            filters
        }
    }

    pub async fn find_many(
        &self,
        filters: Predicate,
        page: PageRequest,
        order_by: Option<OrderBy>,
    ) -> AppResult<Paginated<Record>> {
        let pagination = Pagination::normalize(page, self.config.default_page_size, self.config.max_page_size);
        let predicate = self.scoped(filters);
        let query = FindQuery {
            predicate,
            order_by: order_by.unwrap_or_default(),
            limit: Some(pagination.limit),
            offset: pagination.offset(),
        };
        let (data, total) = tokio::try_join!(self.store.find_many(&query), self.store.count(&query.predicate))
            .map_err(|e| self.fail("fetch", e))?;
        Ok(Paginated::new(data, total, pagination))
    }

    pub async fn find_by_id(&self, id: RecordId) -> AppResult<Option<Record>> {
        self.find_one(Predicate::new().equals("id", id)).await
    }

    pub async fn find_one(&self, filters: Predicate) -> AppResult<Option<Record>> {
        self.store.find_first(&self.scoped(filters)).await.map_err(|e| self.fail("fetch", e))
    }

    pub async fn exists(&self, filters: Predicate) -> AppResult<bool> {
        Ok(self.count(filters).await? > 0)
    }

    pub async fn count(&self, filters: Predicate) -> AppResult<u64> {
        self.store.count(&self.scoped(filters)).await.map_err(|e| self.fail("count", e))
    }

    /// Persists `data` and announces it on `channels` plus the wildcard channel.
    pub async fn create(&self, mut data: Record, channels: &[String]) -> AppResult<Record> {
        data.remove("id");
        if self.config.enable_audit_fields {
            let now = Value::String(now());
            data.insert(CREATED_AT.to_string(), now.clone());
            data.insert(UPDATED_AT.to_string(), now);
        }
        let record = self.store.create(data).await.map_err(|e| self.fail("create", e))?;
        if let Some(m) = &self.metrics {
            m.inc_records_created();
        }

        let mut targets: Vec<&str> = channels.iter().map(String::as_str).collect();
        if !targets.contains(&WILDCARD_CHANNEL) {
            targets.push(WILDCARD_CHANNEL);
        }
        self.announce(&targets, "created", &record);
        Ok(record)
    }

    /// Shallow-merges `data` into a live record. Only `channels` are notified.
    pub async fn update_by_id(&self, id: RecordId, mut data: Record, channels: &[String]) -> AppResult<Record> {
        data.remove("id");
        if self.config.enable_audit_fields {
            data.remove(CREATED_AT);
            data.insert(UPDATED_AT.to_string(), Value::String(now()));
        }
        let guard = self.scoped(Predicate::new());
        let record = self.store.update(id, data, &guard).await.map_err(|e| self.fail("update", e))?;
        if let Some(m) = &self.metrics {
            m.inc_records_updated();
        }
        self.announce(channels, "updated", &record);
        Ok(record)
    }

    /// Soft or hard delete depending on configuration. Only `channels` are notified.
    pub async fn delete_by_id(&self, id: RecordId, channels: &[String]) -> AppResult<Record> {
        let record = if self.config.enable_soft_delete {
            let now = Value::String(now());
            let mut patch = Record::new();
            patch.insert(DELETED_AT.to_string(), now.clone());
            patch.insert(IS_DELETED.to_string(), Value::Bool(true));
            if self.config.enable_audit_fields {
                patch.insert(UPDATED_AT.to_string(), now);
            }
            self.store.update(id, patch, &live()).await
        } else {
            self.store.delete(id, &Predicate::new()).await
        }
        .map_err(|e| self.fail("delete", e))?;

        if let Some(m) = &self.metrics {
            m.inc_records_deleted();
        }
        self.announce(channels, "deleted", &record);
        Ok(record)
    }

    /// Slug derived from `title` that no other record (soft-deleted ones included)
    /// currently uses. The store's unique index remains the final authority.
    pub async fn generate_unique_slug(&self, title: &str, exclude_id: Option<RecordId>) -> AppResult<String> {
        let mut base = slug::slugify(title);
        if base.is_empty() {
            base = slug::slugify(&self.resource);
        }

        let mut predicate = Predicate::new().with(SLUG, Condition::StartsWith(base.clone()));
        if let Some(id) = exclude_id {
            predicate = predicate.with("id", Condition::NotEquals(Value::from(id)));
        }
        let rows = self.store.find_many(&FindQuery::new(predicate)).await.map_err(|e| self.fail("fetch", e))?;

        let prefix = format!("{base}-");
        let existing: Vec<&str> = rows
            .iter()
            .filter_map(|r| r.get(SLUG).and_then(Value::as_str))
            .filter(|s| *s == base || s.starts_with(&prefix))
            .collect();
        Ok(slug::next_free_slug(&base, &existing))
    }

    fn announce<C: AsRef<str>>(&self, channels: &[C], event_type: &str, record: &Record) {
        if !self.config.enable_sse || channels.is_empty() {
            return;
        }
        let Some(broadcaster) = &self.broadcaster else { return };
        let outcomes = broadcaster.broadcast_many(channels, event_type, record);
        let delivered: usize = outcomes.iter().map(|o| o.delivered).sum();
        tracing::debug!(parent: &self.span, event_type, channels = channels.len(), delivered, "change broadcast");
    }

    fn fail(&self, action: &str, err: StoreError) -> AppError {
        match err {
            StoreError::RecordNotFound => AppError::NotFound(format!("{} not found", capitalize(&self.resource))),
            StoreError::InvalidField(field) => {
                tracing::warn!(parent: &self.span, action, field = %field, "rejected invalid field");
                AppError::ValidationError { field, message: "Unknown or invalid field name".to_string() }
            }
            StoreError::UniqueViolation(msg) => {
                tracing::warn!(parent: &self.span, action, error = %msg, "unique constraint violated");
                AppError::Conflict(format!("{} already exists", capitalize(&self.resource)))
            }
            other => {
                tracing::error!(parent: &self.span, action, error = %other, "store operation failed");
                AppError::Database {
                    message: format!("Failed to {} {}", action, self.resource),
                    details: self.expose_error_details.then(|| other.to_string()),
                }
            }
        }
    }
}

fn live() -> Predicate {
    Predicate::new().with(DELETED_AT, Condition::IsNull(true))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
