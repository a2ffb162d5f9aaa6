use async_trait::async_trait;
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

use super::{
    Condition, FindQuery, OrderBy, Predicate, Range, Record, RecordId, RecordStore, StoreError, StoreResult,
};
use crate::db;

/// JSON-document store: one table per resource, `(id, data)`, with fields
/// addressed through `json_extract`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, table: &str) -> StoreResult<Self> {
        if !db::is_safe_identifier(table) {
            return Err(StoreError::InvalidField(table.to_string()));
        }
        Ok(Self { pool, table: table.to_string() })
    }

    fn select(&self) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!("SELECT id, data FROM {}", self.table))
    }
}

/// SQL expression for a record field. `id` is the primary key; everything else
/// lives in the JSON document.
fn column(field: &str) -> StoreResult<String> {
    if !db::is_safe_identifier(field) {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    if field == "id" {
        Ok("id".to_string())
    } else {
        Ok(format!("json_extract(data, '$.{}')", field))
    }
}

fn push_value(qb: &mut QueryBuilder<'static, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        // json_extract yields 1/0 for JSON booleans
        Value::Bool(b) => {
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        }
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        other => {
            qb.push_bind(other.to_string());
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_range(qb: &mut QueryBuilder<'static, Sqlite>, col: &str, range: &Range) {
    if range.is_unbounded() {
        qb.push("1 = 1");
        return;
    }
    let bounds = [(">", &range.gt), (">=", &range.gte), ("<", &range.lt), ("<=", &range.lte)];
    let mut first = true;
    qb.push("(");
    for (op, bound) in bounds {
        if let Some(v) = bound {
            if !first {
                qb.push(" AND ");
            }
            first = false;
            qb.push(format!("{} {} ", col, op));
            push_value(qb, v);
        }
    }
    qb.push(")");
}

fn push_condition(qb: &mut QueryBuilder<'static, Sqlite>, col: &str, condition: &Condition) {
    match condition {
        Condition::Equals(Value::Null) | Condition::IsNull(true) => {
            qb.push(format!("{} IS NULL", col));
        }
        Condition::NotEquals(Value::Null) | Condition::IsNull(false) => {
            qb.push(format!("{} IS NOT NULL", col));
        }
        Condition::Equals(v) => {
            qb.push(format!("{} = ", col));
            push_value(qb, v);
        }
        Condition::NotEquals(v) => {
            // IS NOT keeps records where the field is absent
            qb.push(format!("{} IS NOT ", col));
            push_value(qb, v);
        }
        Condition::In(values) if values.is_empty() => {
            qb.push("0 = 1");
        }
        Condition::In(values) => {
            qb.push(format!("{} IN (", col));
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, v);
            }
            qb.push(")");
        }
        Condition::Contains(s) => {
            qb.push(format!("{} LIKE ", col));
            qb.push_bind(format!("%{}%", escape_like(s)));
            qb.push(" ESCAPE '\\'");
        }
        Condition::StartsWith(s) => {
            qb.push(format!("{} LIKE ", col));
            qb.push_bind(format!("{}%", escape_like(s)));
            qb.push(" ESCAPE '\\'");
        }
        Condition::Range(range) => push_range(qb, col, range),
    }
}

fn push_where(qb: &mut QueryBuilder<'static, Sqlite>, predicate: &Predicate) -> StoreResult<()> {
    qb.push(" WHERE 1 = 1");
    for (field, condition) in predicate.iter() {
        let col = column(field)?;
        qb.push(" AND ");
        push_condition(qb, &col, condition);
    }
    Ok(())
}

fn push_order(qb: &mut QueryBuilder<'static, Sqlite>, order_by: &OrderBy) -> StoreResult<()> {
    let col = column(&order_by.field)?;
    qb.push(format!(" ORDER BY {} {}", col, order_by.direction.as_sql()));
    // Stable paging when the sort key has ties
    if order_by.field != "id" {
        qb.push(" , id DESC");
    }
    Ok(())
}

/// `json_set(data, '$.k', json(?), ...)` replacing each top-level key of `patch`.
fn push_merge(qb: &mut QueryBuilder<'static, Sqlite>, patch: &Record) -> StoreResult<()> {
    let mut keys = patch.iter().filter(|(key, _)| key.as_str() != "id").peekable();
    if keys.peek().is_none() {
        qb.push("data");
        return Ok(());
    }
    qb.push("json_set(data");
    for (key, value) in keys {
        if !db::is_safe_identifier(key) {
            return Err(StoreError::InvalidField(key.clone()));
        }
        qb.push(format!(", '$.{}', json(", key));
        qb.push_bind(serde_json::to_string(value)?);
        qb.push(")");
    }
    qb.push(")");
    Ok(())
}

fn decode_row(row: &SqliteRow) -> StoreResult<Record> {
    let id: RecordId = row.try_get("id")?;
    let data: String = row.try_get("data")?;
    decode(id, &data)
}

fn decode(id: RecordId, data: &str) -> StoreResult<Record> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(mut map)) => {
            map.insert("id".to_string(), Value::from(id));
            Ok(map)
        }
        Ok(other) => Err(StoreError::Corrupt { id, message: format!("found {}", type_name(&other)) }),
        Err(e) => Err(StoreError::Corrupt { id, message: e.to_string() }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn encode(mut record: Record) -> StoreResult<String> {
    record.remove("id");
    Ok(serde_json::to_string(&record)?)
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_many(&self, query: &FindQuery) -> StoreResult<Vec<Record>> {
        let mut qb = self.select();
        push_where(&mut qb, &query.predicate)?;
        push_order(&mut qb, &query.order_by)?;
        match query.limit {
            Some(limit) => {
                qb.push(" LIMIT ");
                qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            None => {
                qb.push(" LIMIT -1");
            }
        }
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, predicate: &Predicate) -> StoreResult<u64> {
        let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_where(&mut qb, predicate)?;
        let n = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or_default())
    }

    async fn create(&self, data: Record) -> StoreResult<Record> {
        let encoded = encode(data.clone())?;
        let id: RecordId = sqlx::query_scalar(&format!("INSERT INTO {} (data) VALUES (?1) RETURNING id", self.table))
            .bind(encoded)
            .fetch_one(&self.pool)
            .await?;
        let mut record = data;
        record.insert("id".to_string(), Value::from(id));
        Ok(record)
    }

    /// Single guarded `UPDATE ... RETURNING`; the merge runs inside SQLite.
    async fn update(&self, id: RecordId, patch: Record, guard: &Predicate) -> StoreResult<Record> {
        let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new(format!("UPDATE {} SET data = ", self.table));
        push_merge(&mut qb, &patch)?;
        push_where(&mut qb, &guard.clone().equals("id", id))?;
        qb.push(" RETURNING id, data");

        let row = qb.build().fetch_optional(&self.pool).await?;
        let Some(row) = row else {
            return Err(StoreError::RecordNotFound);
        };
        decode_row(&row)
    }

    async fn delete(&self, id: RecordId, guard: &Predicate) -> StoreResult<Record> {
        let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new(format!("DELETE FROM {}", self.table));
        push_where(&mut qb, &guard.clone().equals("id", id))?;
        qb.push(" RETURNING id, data");

        let row = qb.build().fetch_optional(&self.pool).await?;
        let Some(row) = row else {
            return Err(StoreError::RecordNotFound);
        };
        decode_row(&row)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
