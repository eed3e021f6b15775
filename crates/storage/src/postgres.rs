//! PostGIS-backed result store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Point};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::fmt::Write as _;
use tracing::{debug, instrument};
use wkt::{ToWkt, TryFromWkt};

use psa_common::{Color, ColorScale, PsaError, PsaResult, VariableSpec};

use crate::store::{ContourRecord, RecordQuery, ResultStore, SampleRecord, VariableRecord};

const SRID: i32 = 4326;

/// Transaction-scoped lock that serializes writers of one slot.
const SLOT_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

/// Advisory lock key for a `(table, variable, date)` slot.
///
/// FNV-1a over the slot identity, so every process derives the same key.
fn slot_lock_key(table: &str, variable_id: i64, date: Option<DateTime<Utc>>) -> i64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let date_bytes = match date {
        Some(d) => d.timestamp_micros().to_le_bytes(),
        None => [0xff; 8],
    };
    let mut hash = OFFSET;
    for byte in table
        .bytes()
        .chain([0u8])
        .chain(variable_id.to_le_bytes())
        .chain([u8::from(date.is_some())])
        .chain(date_bytes)
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash as i64
}

/// Result store on PostgreSQL with PostGIS.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection from database URL.
    pub async fn connect(database_url: &str) -> PsaResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| PsaError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> PsaResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| PsaError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Delete the slot and COPY `csv` into `table` in one transaction.
    ///
    /// Writers of the same slot take an advisory lock first, so two
    /// concurrent replaces cannot both delete an empty slot and then both
    /// insert.
    async fn replace_slot(
        &self,
        table: &str,
        columns: &str,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        csv: String,
    ) -> PsaResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PsaError::DatabaseError(format!("Begin failed: {}", e)))?;

        sqlx::query(SLOT_LOCK_SQL)
            .bind(slot_lock_key(table, variable_id, date))
            .execute(&mut *tx)
            .await
            .map_err(|e| PsaError::DatabaseError(format!("Slot lock failed: {}", e)))?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE variable_id = $1 AND date IS NOT DISTINCT FROM $2",
            table
        ))
        .bind(variable_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Delete failed: {}", e)))?
        .rows_affected();

        let inserted = if csv.is_empty() {
            0
        } else {
            let mut copy = tx
                .copy_in_raw(&format!(
                    "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
                    table, columns
                ))
                .await
                .map_err(|e| PsaError::DatabaseError(format!("Copy failed: {}", e)))?;
            copy.send(csv.into_bytes())
                .await
                .map_err(|e| PsaError::DatabaseError(format!("Copy failed: {}", e)))?;
            copy.finish()
                .await
                .map_err(|e| PsaError::DatabaseError(format!("Copy failed: {}", e)))?
        };

        tx.commit()
            .await
            .map_err(|e| PsaError::DatabaseError(format!("Commit failed: {}", e)))?;

        debug!(table, deleted, inserted, "Replaced slot");
        Ok(inserted)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    #[instrument(skip(self, spec), fields(variable = %spec.name))]
    async fn get_or_create_variable(
        &self,
        psa_id: i64,
        spec: &VariableSpec,
    ) -> PsaResult<VariableRecord> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, VariableRow>(
            r#"
            INSERT INTO psa_variables (
                psa_id, name, display_name, units,
                geo_type, data_type, element_type,
                auto_displayed, color_map
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (psa_id, name)
            DO UPDATE SET name = EXCLUDED.name
            RETURNING id, psa_id, name, display_name, units,
                geo_type, data_type, element_type,
                auto_displayed, color_map, color_bar, metadata
            "#,
        )
        .bind(psa_id)
        .bind(&spec.name)
        .bind(&spec.display_name)
        .bind(&spec.units)
        .bind(spec.geo_type.as_str())
        .bind(spec.data_type.as_str())
        .bind(spec.element_type.as_str())
        .bind(spec.auto_displayed)
        .bind(spec.color_map.map(|m| m.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Insert failed: {}", e)))?;

        row.try_into()
    }

    async fn update_variable(&self, record: &VariableRecord) -> PsaResult<()> {
        let result = sqlx::query(
            "UPDATE psa_variables SET color_bar = $2, metadata = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.color_bar.to_json())
        .bind(&record.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Update failed: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(PsaError::DatabaseError(format!(
                "No variable with id {}",
                record.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn replace_contours(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[ContourRecord],
    ) -> PsaResult<u64> {
        let mut csv = String::new();
        for record in records {
            let _ = writeln!(
                csv,
                "{},{},\"SRID={};{}\",{},{}",
                record.variable_id,
                csv_date(record.date),
                SRID,
                record.geometry.wkt_string(),
                record.value,
                record.color.to_hex()
            );
        }
        self.replace_slot(
            "psa_contours",
            "variable_id, date, geom, value, color",
            variable_id,
            date,
            csv,
        )
        .await
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn replace_samples(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[SampleRecord],
    ) -> PsaResult<u64> {
        let mut csv = String::new();
        for record in records {
            let _ = writeln!(
                csv,
                "{},{},\"SRID={};{}\",{}",
                record.variable_id,
                csv_date(record.date),
                SRID,
                record.point.wkt_string(),
                record.value
            );
        }
        self.replace_slot(
            "psa_samples",
            "variable_id, date, geom, value",
            variable_id,
            date,
            csv,
        )
        .await
    }

    async fn find_contours(&self, query: &RecordQuery) -> PsaResult<Vec<ContourRecord>> {
        let rows = sqlx::query_as::<_, ContourRow>(
            r#"
            SELECT variable_id, date, ST_AsText(geom) AS wkt, value, color
            FROM psa_contours
            WHERE variable_id = $1
              AND date IS NOT DISTINCT FROM $2
              AND ($3::float8 IS NULL
                   OR ST_Intersects(geom, ST_MakeEnvelope($3, $4, $5, $6, 4326)))
            ORDER BY value, id
            "#,
        )
        .bind(query.variable_id)
        .bind(query.date)
        .bind(query.bbox.map(|b| b.min_x))
        .bind(query.bbox.map(|b| b.min_y))
        .bind(query.bbox.map(|b| b.max_x))
        .bind(query.bbox.map(|b| b.max_y))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Query failed: {}", e)))?;

        rows.into_iter().map(ContourRecord::try_from).collect()
    }

    async fn find_samples(&self, query: &RecordQuery) -> PsaResult<Vec<SampleRecord>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT variable_id, date, ST_AsText(geom) AS wkt, value
            FROM psa_samples
            WHERE variable_id = $1
              AND date IS NOT DISTINCT FROM $2
              AND ($3::float8 IS NULL
                   OR ST_Intersects(geom, ST_MakeEnvelope($3, $4, $5, $6, 4326)))
            ORDER BY id
            "#,
        )
        .bind(query.variable_id)
        .bind(query.date)
        .bind(query.bbox.map(|b| b.min_x))
        .bind(query.bbox.map(|b| b.min_y))
        .bind(query.bbox.map(|b| b.max_x))
        .bind(query.bbox.map(|b| b.max_y))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Query failed: {}", e)))?;

        rows.into_iter().map(SampleRecord::try_from).collect()
    }

    async fn save_dataset_metadata(
        &self,
        dataset_id: i64,
        metadata: &serde_json::Value,
    ) -> PsaResult<()> {
        sqlx::query(
            r#"
            INSERT INTO psa_dataset_metadata (dataset_id, metadata, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (dataset_id)
            DO UPDATE SET metadata = EXCLUDED.metadata, updated_at = NOW()
            "#,
        )
        .bind(dataset_id)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| PsaError::DatabaseError(format!("Insert failed: {}", e)))?;

        Ok(())
    }

    async fn dataset_metadata(&self, dataset_id: i64) -> PsaResult<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT metadata FROM psa_dataset_metadata WHERE dataset_id = $1")
                .bind(dataset_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PsaError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(row.map(|(metadata,)| metadata))
    }
}

/// Unquoted empty field is NULL in COPY csv.
fn csv_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_default()
}

fn parse_wkt<T>(text: &str) -> PsaResult<T>
where
    T: TryFromWkt<f64>,
    T::Error: std::fmt::Display,
{
    T::try_from_wkt_str(text)
        .map_err(|e| PsaError::Geometry(format!("Invalid WKT from database: {}", e)))
}

#[derive(FromRow)]
struct VariableRow {
    id: i64,
    psa_id: i64,
    name: String,
    display_name: String,
    units: String,
    geo_type: String,
    data_type: String,
    element_type: String,
    auto_displayed: bool,
    color_map: Option<String>,
    color_bar: serde_json::Value,
    metadata: serde_json::Value,
}

impl TryFrom<VariableRow> for VariableRecord {
    type Error = PsaError;

    fn try_from(row: VariableRow) -> PsaResult<Self> {
        Ok(Self {
            id: row.id,
            psa_id: row.psa_id,
            name: row.name,
            display_name: row.display_name,
            units: row.units,
            geo_type: row.geo_type.parse()?,
            data_type: row.data_type.parse()?,
            element_type: row.element_type.parse()?,
            auto_displayed: row.auto_displayed,
            color_map: row.color_map.as_deref().map(str::parse).transpose()?,
            color_bar: ColorScale::from_json(&row.color_bar)?,
            metadata: row.metadata,
        })
    }
}

#[derive(FromRow)]
struct ContourRow {
    variable_id: i64,
    date: Option<DateTime<Utc>>,
    wkt: String,
    value: f64,
    color: String,
}

impl TryFrom<ContourRow> for ContourRecord {
    type Error = PsaError;

    fn try_from(row: ContourRow) -> PsaResult<Self> {
        Ok(Self {
            variable_id: row.variable_id,
            date: row.date,
            geometry: parse_wkt::<MultiPolygon<f64>>(&row.wkt)?,
            value: row.value,
            color: Color::from_hex(&row.color)?,
        })
    }
}

#[derive(FromRow)]
struct SampleRow {
    variable_id: i64,
    date: Option<DateTime<Utc>>,
    wkt: String,
    value: f64,
}

impl TryFrom<SampleRow> for SampleRecord {
    type Error = PsaError;

    fn try_from(row: SampleRow) -> PsaResult<Self> {
        Ok(Self {
            variable_id: row.variable_id,
            date: row.date,
            point: parse_wkt::<Point<f64>>(&row.wkt)?,
            value: row.value,
        })
    }
}

const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;

CREATE TABLE IF NOT EXISTS psa_variables (
    id BIGSERIAL PRIMARY KEY,
    psa_id BIGINT NOT NULL,
    name VARCHAR(100) NOT NULL,
    display_name VARCHAR(200) NOT NULL,
    units VARCHAR(50) NOT NULL,
    geo_type VARCHAR(20) NOT NULL,
    data_type VARCHAR(20) NOT NULL,
    element_type VARCHAR(20) NOT NULL,
    auto_displayed BOOLEAN NOT NULL DEFAULT FALSE,
    color_map VARCHAR(20),
    color_bar JSONB NOT NULL DEFAULT '[]'::jsonb,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (psa_id, name)
);

CREATE TABLE IF NOT EXISTS psa_contours (
    id BIGSERIAL PRIMARY KEY,
    variable_id BIGINT NOT NULL REFERENCES psa_variables(id) ON DELETE CASCADE,
    date TIMESTAMPTZ,
    geom geometry(MultiPolygon, 4326) NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    color VARCHAR(7) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_psa_contours_slot ON psa_contours(variable_id, date, value);
CREATE INDEX IF NOT EXISTS idx_psa_contours_geom ON psa_contours USING GIST(geom);

CREATE TABLE IF NOT EXISTS psa_samples (
    id BIGSERIAL PRIMARY KEY,
    variable_id BIGINT NOT NULL REFERENCES psa_variables(id) ON DELETE CASCADE,
    date TIMESTAMPTZ,
    geom geometry(Point, 4326) NOT NULL,
    value DOUBLE PRECISION NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_psa_samples_slot ON psa_samples(variable_id, date);
CREATE INDEX IF NOT EXISTS idx_psa_samples_geom ON psa_samples USING GIST(geom);

CREATE TABLE IF NOT EXISTS psa_dataset_metadata (
    dataset_id BIGINT PRIMARY KEY,
    metadata JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;
