use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use timeline_common::{
    BatchKey, BatchProgress, CategoryRecord, DateField, EntityRef, EventRecord, EventTypeRecord,
    Location,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{EventFilter, EventOrder, EventStore, EventUpsert, StoredEvent, UpsertCounts};
use crate::error::{IngestError, Result};

const EVENT_COLUMNS: &str = "id, external_id, category_id, event_type_id, title, description, \
    point_in_time, start_time, end_time, location_name, location_qid, location_lat, location_lon, \
    external_url, article_url, article_title, article_extract, sitelink_count, pageviews_30d, \
    backlink_count, part_of_ids, sort_key, importance_score";

/// Postgres-backed [`EventStore`].
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// --- Row types ---

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    external_id: String,
    category_id: Option<String>,
    event_type_id: Option<String>,
    title: String,
    description: String,
    point_in_time: Option<Json<DateField>>,
    start_time: Option<Json<DateField>>,
    end_time: Option<Json<DateField>>,
    location_name: String,
    location_qid: String,
    location_lat: Option<f64>,
    location_lon: Option<f64>,
    external_url: String,
    article_url: String,
    article_title: String,
    article_extract: String,
    sitelink_count: i32,
    pageviews_30d: i64,
    backlink_count: i32,
    part_of_ids: Vec<String>,
    sort_key: String,
    importance_score: Option<f64>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        let record = EventRecord {
            external_id: row.external_id,
            label: row.title,
            description: row.description,
            point_in_time: row.point_in_time.map(|j| j.0),
            start_time: row.start_time.map(|j| j.0),
            end_time: row.end_time.map(|j| j.0),
            location: Location {
                qid: non_empty(row.location_qid),
                name: non_empty(row.location_name),
                lat: row.location_lat,
                lon: row.location_lon,
            },
            external_url: non_empty(row.external_url),
            article_url: non_empty(row.article_url),
            article_title: non_empty(row.article_title),
            article_extract: non_empty(row.article_extract),
            sitelink_count: row.sitelink_count.max(0) as u32,
            pageviews_30d: row.pageviews_30d.max(0) as u64,
            backlink_count: row.backlink_count.max(0) as u32,
            part_of_ids: row.part_of_ids,
            sort_key: row.sort_key,
            importance_score: row.importance_score,
        };
        StoredEvent {
            id: row.id,
            category_id: row.category_id,
            event_type_id: row.event_type_id,
            record,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    external_id: String,
    name: String,
    instance_of: Json<Vec<EntityRef>>,
    subclass_of: Json<Vec<EntityRef>>,
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    last_updated_at: DateTime<Utc>,
    events_created: i32,
    error_count: i32,
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    if let Some(ids) = &filter.ids {
        qb.push(" AND external_id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
    if filter.only_uncategorized {
        qb.push(" AND category_id IS NULL");
    }
    if filter.has_article {
        qb.push(" AND article_url <> ''");
    }
    if filter.missing_extract {
        qb.push(" AND article_extract = ''");
    }
    if let Some(from) = &filter.sort_key_from {
        qb.push(" AND sort_key >= ");
        qb.push_bind(from.clone());
    }
    if let Some(to) = &filter.sort_key_to {
        qb.push(" AND sort_key <= ");
        qb.push_bind(to.clone());
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn upsert_category(&self, category: &CategoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (external_id, name, url, instance_of, subclass_of)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE SET
                name = EXCLUDED.name,
                url = EXCLUDED.url,
                instance_of = EXCLUDED.instance_of,
                subclass_of = EXCLUDED.subclass_of,
                updated_at = now()
            "#,
        )
        .bind(&category.external_id)
        .bind(super::truncate(&category.name, super::MAX_TEXT))
        .bind(category.url())
        .bind(Json(&category.instance_of))
        .bind(Json(&category.subclass_of))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_event_type(&self, event_type: &EventTypeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO event_types (external_id, name, url)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(&event_type.external_id)
        .bind(super::truncate(&event_type.name, super::MAX_TEXT))
        .bind(timeline_common::entity_url(&event_type.external_id))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_events(&self, events: &[EventUpsert]) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        let mut tx = self.pool.begin().await?;

        for event in events {
            let r = &event.record;
            let inserted: bool = sqlx::query_scalar(
                r#"
                INSERT INTO events (
                    id, external_id, category_id, event_type_id, title, description,
                    point_in_time, start_time, end_time,
                    location_name, location_qid, location_lat, location_lon,
                    external_url, article_url, article_title,
                    sitelink_count, pageviews_30d, backlink_count,
                    part_of_ids, sort_key, importance_score
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                        $14, $15, $16, $17, $18, $19, $20, $21, $22)
                ON CONFLICT (external_id) DO UPDATE SET
                    category_id = COALESCE(EXCLUDED.category_id, events.category_id),
                    event_type_id = COALESCE(EXCLUDED.event_type_id, events.event_type_id),
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    point_in_time = EXCLUDED.point_in_time,
                    start_time = EXCLUDED.start_time,
                    end_time = EXCLUDED.end_time,
                    location_name = EXCLUDED.location_name,
                    location_qid = EXCLUDED.location_qid,
                    location_lat = EXCLUDED.location_lat,
                    location_lon = EXCLUDED.location_lon,
                    external_url = EXCLUDED.external_url,
                    article_url = EXCLUDED.article_url,
                    article_title = EXCLUDED.article_title,
                    sitelink_count = EXCLUDED.sitelink_count,
                    pageviews_30d = EXCLUDED.pageviews_30d,
                    backlink_count = EXCLUDED.backlink_count,
                    part_of_ids = EXCLUDED.part_of_ids,
                    sort_key = EXCLUDED.sort_key,
                    importance_score = EXCLUDED.importance_score,
                    updated_at = now()
                RETURNING (xmax = 0)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&r.external_id)
            .bind(&event.category_id)
            .bind(&event.event_type_id)
            .bind(&r.label)
            .bind(&r.description)
            .bind(r.point_in_time.as_ref().map(Json))
            .bind(r.start_time.as_ref().map(Json))
            .bind(r.end_time.as_ref().map(Json))
            .bind(r.location.name.as_deref().unwrap_or_default())
            .bind(r.location.qid.as_deref().unwrap_or_default())
            .bind(r.location.lat)
            .bind(r.location.lon)
            .bind(r.external_url.as_deref().unwrap_or_default())
            .bind(r.article_url.as_deref().unwrap_or_default())
            .bind(r.article_title.as_deref().unwrap_or_default())
            .bind(to_i32(r.sitelink_count))
            .bind(i64::try_from(r.pageviews_30d).unwrap_or(i64::MAX))
            .bind(to_i32(r.backlink_count))
            .bind(&r.part_of_ids)
            .bind(&r.sort_key)
            .bind(r.importance_score)
            .fetch_one(&mut *tx)
            .await?;

            if inserted {
                counts.created += 1;
            } else {
                counts.updated += 1;
            }
        }

        tx.commit().await?;
        debug!(created = counts.created, updated = counts.updated, "Events upserted");
        Ok(counts)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"
        ));
        push_filter(&mut qb, filter);
        qb.push(match filter.order {
            EventOrder::Chronological => " ORDER BY sort_key ASC, external_id ASC",
            EventOrder::ImportanceDesc => {
                " ORDER BY importance_score DESC NULLS LAST, sort_key ASC, external_id ASC"
            }
        });

        let rows = qb.build_query_as::<EventRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn categories(&self) -> Result<Vec<CategoryRecord>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT external_id, name, instance_of, subclass_of FROM categories ORDER BY external_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryRecord {
                external_id: row.external_id,
                name: row.name,
                instance_of: row.instance_of.0,
                subclass_of: row.subclass_of.0,
            })
            .collect())
    }

    async fn update_scores(&self, scores: &[(String, f64)]) -> Result<u64> {
        let (ids, values): (Vec<String>, Vec<f64>) = scores.iter().cloned().unzip();
        let result = sqlx::query(
            r#"
            UPDATE events e
            SET importance_score = v.score, updated_at = now()
            FROM UNNEST($1::text[], $2::float8[]) AS v(external_id, score)
            WHERE e.external_id = v.external_id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn assign_categories(&self, assignments: &[(String, String)]) -> Result<u64> {
        let (ids, categories): (Vec<String>, Vec<String>) = assignments.iter().cloned().unzip();
        let result = sqlx::query(
            r#"
            UPDATE events e
            SET category_id = v.category_id, updated_at = now()
            FROM UNNEST($1::text[], $2::text[]) AS v(external_id, category_id)
            WHERE e.external_id = v.external_id
            "#,
        )
        .bind(&ids)
        .bind(&categories)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn assign_category_to_all(&self, filter: &EventFilter, category_id: &str) -> Result<u64> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE external_id = $1)")
                .bind(category_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(IngestError::NotFound(format!("category {category_id}")));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE events SET updated_at = now(), category_id = ");
        qb.push_bind(category_id.to_string());
        qb.push(" WHERE TRUE");
        push_filter(&mut qb, filter);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn set_extract(&self, external_id: &str, extract: &str) -> Result<()> {
        sqlx::query("UPDATE events SET article_extract = $2, updated_at = now() WHERE external_id = $1")
            .bind(external_id)
            .bind(extract)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn batch_progress(&self, key: &BatchKey) -> Result<Option<BatchProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT last_updated_at, events_created, error_count
            FROM batch_progress
            WHERE type_id = $1 AND year_start = $2 AND year_end = $3
            "#,
        )
        .bind(&key.type_id)
        .bind(key.year_start)
        .bind(key.year_end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BatchProgress {
            last_updated_at: r.last_updated_at,
            events_created: r.events_created.max(0) as u32,
            error_count: r.error_count.max(0) as u32,
        }))
    }

    async fn record_batch_progress(&self, key: &BatchKey, progress: &BatchProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_progress (type_id, year_start, year_end, last_updated_at, events_created, error_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (type_id, year_start, year_end) DO UPDATE SET
                last_updated_at = EXCLUDED.last_updated_at,
                events_created = EXCLUDED.events_created,
                error_count = EXCLUDED.error_count
            "#,
        )
        .bind(&key.type_id)
        .bind(key.year_start)
        .bind(key.year_end)
        .bind(progress.last_updated_at)
        .bind(to_i32(progress.events_created))
        .bind(to_i32(progress.error_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
