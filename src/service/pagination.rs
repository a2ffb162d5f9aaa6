use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Raw, caller-supplied paging input.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self { page, limit }
    }

    /// Reads `page` and `limit` from query parameters; unparsable values count as absent.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let parse = |key: &str| query.get(key).and_then(|v| v.trim().parse::<i64>().ok());
        Self { page: parse("page"), limit: parse("limit") }
    }
}

/// A normalized paging window: `page >= 1`, `1 <= limit <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn normalize(req: PageRequest, default_limit: u64, max_limit: u64) -> Self {
        let max_limit = max_limit.max(1);
        let page = match req.page {
            Some(p) if p >= 1 => p as u64,
            _ => 1,
        };
        let limit = match req.limit {
            Some(l) => l.clamp(1, i64::try_from(max_limit).unwrap_or(i64::MAX)) as u64,
            None => default_limit.clamp(1, max_limit),
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        let total_pages = total.div_ceil(pagination.limit);
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total,
            total_pages,
            has_next: pagination.page < total_pages,
            has_previous: pagination.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self { data, pagination: PageInfo::new(pagination, total) }
    }
}
