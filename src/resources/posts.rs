use std::collections::HashMap;

use serde_json::Value;
use sqlx::SqlitePool;

use crate::db;
use crate::error::{AppError, AppResult, OptionExt};
use crate::metrics::Metrics;
use crate::service::{DataService, FilterSet, PageRequest, Paginated, ServiceConfig, SLUG};
use crate::sse::Broadcaster;
use crate::store::{OrderBy, Record, RecordId, SortDirection, SqliteStore};
use crate::types::{CreatePostRequest, UpdatePostRequest};

pub const TABLE: &str = "posts";
pub const RESOURCE: &str = "post";
pub const CHANNEL: &str = "posts";

const STATUSES: &[&str] = &["draft", "published", "archived"];
const SORTABLE: &[&str] = &["id", "title", "views", "status", "created_at", "updated_at"];
const MAX_TITLE_LEN: usize = 200;
const SLUG_ATTEMPTS: usize = 3;

/// Channel that only carries changes to one post.
pub fn item_channel(id: RecordId) -> String {
    format!("{CHANNEL}:{id}")
}

pub async fn ensure_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    db::ensure_resource_table(pool, TABLE, &[SLUG]).await
}

pub struct PostService {
    data: DataService<SqliteStore>,
    filters: FilterSet,
}

impl PostService {
    pub fn new(pool: SqlitePool, config: ServiceConfig) -> anyhow::Result<Self> {
        let store = SqliteStore::new(pool, TABLE)?;
        Ok(Self { data: DataService::new(store, RESOURCE, config), filters: filters() })
    }

    pub fn with_broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.data = self.data.with_broadcaster(broadcaster);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.data = self.data.with_metrics(metrics);
        self
    }

    pub fn expose_error_details(mut self, expose: bool) -> Self {
        self.data = self.data.expose_error_details(expose);
        self
    }

    pub fn data(&self) -> &DataService<SqliteStore> {
        &self.data
    }

    pub async fn list(&self, query: &HashMap<String, String>) -> AppResult<Paginated<Record>> {
        let predicate = self.filters.apply(query);
        let order_by = order_from_query(query)?;
        self.data.find_many(predicate, PageRequest::from_query(query), order_by).await
    }

    pub async fn get(&self, id: RecordId) -> AppResult<Record> {
        self.data.find_by_id(id).await?.ok_or_not_found("Post")
    }

    pub async fn create(&self, req: CreatePostRequest) -> AppResult<Record> {
        let title = validate_title(&req.title)?;
        let status = match req.status.as_deref() {
            Some(s) => validate_status(s)?,
            None => "draft".to_string(),
        };

        let mut record = Record::new();
        record.insert("title".into(), Value::String(title.clone()));
        record.insert("body".into(), Value::String(req.body.unwrap_or_default()));
        record.insert("author".into(), req.author.map(Value::String).unwrap_or(Value::Null));
        record.insert("status".into(), Value::String(status));
        record.insert("tags".into(), Value::from(req.tags));
        record.insert("views".into(), Value::from(0));

        let channels = [CHANNEL.to_string()];
        let mut attempt = 0;
        loop {
            attempt += 1;
            let slug = self.data.generate_unique_slug(&title, None).await?;
            record.insert(SLUG.into(), Value::String(slug.clone()));
            match self.data.create(record.clone(), &channels).await {
                // Another writer took the slug between the check and the insert
                Err(AppError::Conflict(_)) if attempt < SLUG_ATTEMPTS => {
                    tracing::debug!(slug = %slug, attempt, "slug taken concurrently, retrying");
                }
                other => return other,
            }
        }
    }

    pub async fn update(&self, id: RecordId, req: UpdatePostRequest) -> AppResult<Record> {
        if req.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let mut patch = Record::new();
        if let Some(title) = req.title {
            let title = validate_title(&title)?;
            let current = self.get(id).await?;
            if current.get("title").and_then(Value::as_str) != Some(title.as_str()) {
                let slug = self.data.generate_unique_slug(&title, Some(id)).await?;
                patch.insert(SLUG.into(), Value::String(slug));
            }
            patch.insert("title".into(), Value::String(title));
        }
        if let Some(status) = req.status {
            patch.insert("status".into(), Value::String(validate_status(&status)?));
        }
        if let Some(views) = req.views {
            if views < 0 {
                return Err(AppError::ValidationError {
                    field: "views".to_string(),
                    message: "must not be negative".to_string(),
                });
            }
            patch.insert("views".into(), Value::from(views));
        }
        if let Some(body) = req.body {
            patch.insert("body".into(), Value::String(body));
        }
        if let Some(author) = req.author {
            patch.insert("author".into(), Value::String(author));
        }
        if let Some(tags) = req.tags {
            patch.insert("tags".into(), Value::from(tags));
        }

        self.data.update_by_id(id, patch, &[CHANNEL.to_string(), item_channel(id)]).await
    }

    pub async fn delete(&self, id: RecordId) -> AppResult<Record> {
        self.data.delete_by_id(id, &[CHANNEL.to_string(), item_channel(id)]).await
    }
}

fn filters() -> FilterSet {
    FilterSet::new()
        .equals("status", "status")
        .equals("author", "author")
        .contains("q", "title")
        .starts_with("slug_prefix", SLUG)
        .one_of("statuses", "status")
        .min("views_min", "views")
        .max("views_max", "views")
        .min_text("created_after", "created_at")
        .max_text("created_before", "created_at")
}

fn order_from_query(query: &HashMap<String, String>) -> AppResult<Option<OrderBy>> {
    let Some(field) = query.get("sort").map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if !SORTABLE.contains(&field) {
        return Err(AppError::ValidationError {
            field: "sort".to_string(),
            message: format!("must be one of: {}", SORTABLE.join(", ")),
        });
    }
    let direction = match query.get("order").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => SortDirection::parse(raw).ok_or_else(|| AppError::ValidationError {
            field: "order".to_string(),
            message: "must be 'asc' or 'desc'".to_string(),
        })?,
        None => SortDirection::default(),
    };
    Ok(Some(OrderBy::new(field, direction)))
}

fn validate_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::ValidationError { field: "title".to_string(), message: "must not be empty".to_string() });
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::ValidationError {
            field: "title".to_string(),
            message: format!("must be at most {} characters", MAX_TITLE_LEN),
        });
    }
    Ok(title.to_string())
}

fn validate_status(raw: &str) -> AppResult<String> {
    let status = raw.trim().to_ascii_lowercase();
    if STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(AppError::ValidationError {
            field: "status".to_string(),
            message: format!("must be one of: {}", STATUSES.join(", ")),
        })
    }
}
