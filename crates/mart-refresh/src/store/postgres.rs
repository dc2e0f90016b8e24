//! PostgreSQL 마트 저장소.
//!
//! 각 단계는 `<table>__next` 스테이징 테이블을 새로 만들어 UNNEST로 일괄 삽입하고,
//! `commit_staged`가 한 트랜잭션 안에서 기존 테이블을 내리고 스테이징 테이블의 이름을
//! 바꿉니다. 제약조건 이름도 함께 바꿔 다음 실행의 스테이징과 충돌하지 않게 합니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mart_core::{
    AssetDim, AssetRow, CalendarDay, CalendarDim, EnrichedPrice, FactPrice, MartConfig,
    MovingAverageWindows, PublishedTables, RawObservation, SourceConfig, TableNames,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use super::{ensure_ma_width, MartStore, MartTable};
use crate::error::RefreshError;
use crate::run_log::{RunRecord, MAX_ERROR_MESSAGE_CHARS};
use crate::Result;

/// UNNEST 일괄 삽입 청크 크기
const INSERT_CHUNK: usize = 500;

/// 스테이징 테이블 접미사
const STAGING_SUFFIX: &str = "__next";

/// 원시 관측 레코드
#[derive(Debug, Clone, FromRow)]
struct RawPriceRecord {
    symbol: Option<String>,
    date: Option<NaiveDate>,
    source: Option<String>,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    volume: Option<i64>,
    load_ts: Option<DateTime<Utc>>,
}

impl RawPriceRecord {
    fn into_observation(self) -> RawObservation {
        RawObservation {
            symbol: self.symbol,
            date: self.date,
            source: self.source,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            load_ts: self.load_ts,
        }
    }
}

/// 달력 차원 레코드
#[derive(Debug, Clone, FromRow)]
struct CalendarRecord {
    date: NaiveDate,
    year: i32,
    month: i32,
    day: i32,
    day_of_week: i32,
    week: i32,
}

impl CalendarRecord {
    fn into_day(self) -> CalendarDay {
        CalendarDay {
            date: self.date,
            year: self.year,
            month: self.month,
            day: self.day,
            day_of_week: self.day_of_week,
            week: self.week,
        }
    }
}

/// 팩트 레코드
#[derive(Debug, Clone, FromRow)]
struct FactRecord {
    date: NaiveDate,
    asset_id: Option<i32>,
    symbol: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
}

impl FactRecord {
    fn into_fact(self) -> FactPrice {
        FactPrice {
            date: self.date,
            asset_id: self.asset_id,
            symbol: self.symbol,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// PostgreSQL 저장소
#[derive(Clone)]
pub struct PgMartStore {
    pool: PgPool,
    source: SourceConfig,
    tables: TableNames,
}

impl PgMartStore {
    /// 연결 풀과 설정으로 저장소 생성
    pub fn new(pool: PgPool, config: &MartConfig) -> Self {
        Self {
            pool,
            source: config.source.clone(),
            tables: config.tables.clone(),
        }
    }

    fn table_name(&self, table: MartTable) -> &str {
        match table {
            MartTable::DimAsset => &self.tables.dim_asset,
            MartTable::DimCalendar => &self.tables.dim_calendar,
            MartTable::FactPrices => &self.tables.fact_prices,
            MartTable::FactPricesEnriched => &self.tables.fact_prices_enriched,
        }
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// 스테이징 테이블을 새로 만들고 트랜잭션을 반환합니다.
    async fn begin_staging(
        &self,
        table: MartTable,
        ma_columns: &[String],
    ) -> Result<Transaction<'static, Postgres>> {
        let name = self.table_name(table);
        let staging = staging_name(name);
        let ddl = create_table_sql(table, &staging, &constraint_prefix(&staging), ma_columns);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
            .execute(&mut *tx)
            .await
            .map_err(|e| RefreshError::publish(name, e))?;
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(|e| RefreshError::publish(name, e))?;
        Ok(tx)
    }

    fn enriched_select(&self, ma_columns: &[String]) -> String {
        let mut columns = vec![
            "\"date\"".to_string(),
            "asset_id".to_string(),
            "symbol".to_string(),
            "close".to_string(),
            "prev_close".to_string(),
            "daily_return_pct".to_string(),
        ];
        columns.extend(ma_columns.iter().cloned());
        format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.tables.fact_prices_enriched
        )
    }
}

/// 파생 테이블 한 행을 읽습니다.
fn enriched_from_row(
    row: &PgRow,
    ma_columns: &[String],
) -> std::result::Result<EnrichedPrice, sqlx::Error> {
    let moving_averages = ma_columns
        .iter()
        .map(|column| row.try_get::<Decimal, _>(column.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(EnrichedPrice {
        date: row.try_get("date")?,
        asset_id: row.try_get("asset_id")?,
        symbol: row.try_get("symbol")?,
        close: row.try_get("close")?,
        prev_close: row.try_get("prev_close")?,
        daily_return_pct: row.try_get("daily_return_pct")?,
        moving_averages,
    })
}

#[async_trait]
impl MartStore for PgMartStore {
    #[instrument(skip(self), fields(table = %self.source.table))]
    async fn load_observations(&self) -> Result<Vec<RawObservation>> {
        let sql = observations_sql(&self.source);
        let records: Vec<RawPriceRecord> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        info!(rows = records.len(), "원시 관측 로드");
        Ok(records
            .into_iter()
            .map(RawPriceRecord::into_observation)
            .collect())
    }

    async fn load_assets(&self) -> Result<Option<AssetDim>> {
        if !self.table_exists(&self.tables.dim_asset).await? {
            return Ok(None);
        }

        let rows: Vec<(i32, String)> = sqlx::query_as(&format!(
            "SELECT asset_id, symbol FROM {} ORDER BY asset_id",
            self.tables.dim_asset
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(AssetDim::from_rows(
            rows.into_iter()
                .map(|(asset_id, symbol)| AssetRow { asset_id, symbol }),
        )))
    }

    async fn published_ma_columns(&self) -> Result<Option<Vec<String>>> {
        let table = &self.tables.fact_prices_enriched;
        if !self.table_exists(table).await? {
            return Ok(None);
        }

        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT attname::text FROM pg_attribute
            WHERE attrelid = to_regclass($1) AND attnum > 0 AND NOT attisdropped
              AND attname ~ '^ma_[0-9]+d$'
            ORDER BY attnum
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(columns))
    }

    #[instrument(skip(self))]
    async fn load_published(&self) -> Result<PublishedTables> {
        let mut tables = PublishedTables::default();

        if self.table_exists(&self.tables.dim_calendar).await? {
            let records: Vec<CalendarRecord> = sqlx::query_as(&format!(
                r#"SELECT "date", year, month, day, day_of_week, week FROM {} ORDER BY "date""#,
                self.tables.dim_calendar
            ))
            .fetch_all(&self.pool)
            .await?;
            tables.calendar = records.into_iter().map(CalendarRecord::into_day).collect();
        }

        if let Some(assets) = self.load_assets().await? {
            tables.assets = assets.rows();
        }

        if self.table_exists(&self.tables.fact_prices).await? {
            let records: Vec<FactRecord> = sqlx::query_as(&format!(
                r#"
                SELECT "date", asset_id, symbol, open, high, low, close, volume
                FROM {} ORDER BY symbol, "date"
                "#,
                self.tables.fact_prices
            ))
            .fetch_all(&self.pool)
            .await?;
            tables.facts = records.into_iter().map(FactRecord::into_fact).collect();
        }

        if let Some(ma_columns) = self.published_ma_columns().await? {
            let sql = format!(
                "{} ORDER BY symbol, \"date\"",
                self.enriched_select(&ma_columns)
            );
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            tables.enriched = rows
                .iter()
                .map(|row| enriched_from_row(row, &ma_columns))
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }

        debug!(
            calendar = tables.calendar.len(),
            assets = tables.assets.len(),
            facts = tables.facts.len(),
            enriched = tables.enriched.len(),
            "게시 테이블 로드"
        );
        Ok(tables)
    }

    #[instrument(skip(self))]
    async fn load_enriched_series(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<EnrichedPrice>> {
        let Some(ma_columns) = self.published_ma_columns().await? else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"{}
            WHERE symbol = $1
              AND ($2::date IS NULL OR "date" >= $2)
              AND ($3::date IS NULL OR "date" <= $3)
            ORDER BY "date" ASC"#,
            self.enriched_select(&ma_columns)
        );

        let rows = sqlx::query(&sql)
            .bind(symbol)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| enriched_from_row(row, &ma_columns))
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn prepare(&self) -> Result<()> {
        self.discard_staged().await
    }

    #[instrument(skip(self, calendar), fields(rows = calendar.len()))]
    async fn stage_calendar(&self, calendar: &CalendarDim) -> Result<usize> {
        let name = self.table_name(MartTable::DimCalendar);
        let staging = staging_name(name);
        let days: Vec<&CalendarDay> = calendar.days().collect();
        let mut tx = self.begin_staging(MartTable::DimCalendar, &[]).await?;

        for chunk in days.chunks(INSERT_CHUNK) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|d| d.date).collect();
            let years: Vec<i32> = chunk.iter().map(|d| d.year).collect();
            let months: Vec<i32> = chunk.iter().map(|d| d.month).collect();
            let day_numbers: Vec<i32> = chunk.iter().map(|d| d.day).collect();
            let weekdays: Vec<i32> = chunk.iter().map(|d| d.day_of_week).collect();
            let weeks: Vec<i32> = chunk.iter().map(|d| d.week).collect();

            sqlx::query(&format!(
                r#"
                INSERT INTO {} ("date", year, month, day, day_of_week, week)
                SELECT * FROM UNNEST(
                    $1::date[], $2::int4[], $3::int4[], $4::int4[], $5::int4[], $6::int4[]
                )
                "#,
                staging
            ))
            .bind(&dates)
            .bind(&years)
            .bind(&months)
            .bind(&day_numbers)
            .bind(&weekdays)
            .bind(&weeks)
            .execute(&mut *tx)
            .await
            .map_err(|e| RefreshError::publish(name, e))?;
        }

        tx.commit().await.map_err(|e| RefreshError::publish(name, e))?;
        debug!(table = %staging, rows = days.len(), "달력 차원 스테이징");
        Ok(days.len())
    }

    #[instrument(skip(self, assets), fields(rows = assets.len()))]
    async fn stage_assets(&self, assets: &AssetDim) -> Result<usize> {
        let name = self.table_name(MartTable::DimAsset);
        let staging = staging_name(name);
        let rows = assets.rows();
        let mut tx = self.begin_staging(MartTable::DimAsset, &[]).await?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let ids: Vec<i32> = chunk.iter().map(|r| r.asset_id).collect();
            let symbols: Vec<&str> = chunk.iter().map(|r| r.symbol.as_str()).collect();

            sqlx::query(&format!(
                "INSERT INTO {} (asset_id, symbol) SELECT * FROM UNNEST($1::int4[], $2::text[])",
                staging
            ))
            .bind(&ids)
            .bind(&symbols)
            .execute(&mut *tx)
            .await
            .map_err(|e| RefreshError::publish(name, e))?;
        }

        tx.commit().await.map_err(|e| RefreshError::publish(name, e))?;
        debug!(table = %staging, rows = rows.len(), "자산 차원 스테이징");
        Ok(rows.len())
    }

    #[instrument(skip(self, facts), fields(rows = facts.len()))]
    async fn stage_facts(&self, facts: &[FactPrice]) -> Result<usize> {
        let name = self.table_name(MartTable::FactPrices);
        let staging = staging_name(name);
        let mut tx = self.begin_staging(MartTable::FactPrices, &[]).await?;

        for chunk in facts.chunks(INSERT_CHUNK) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|f| f.date).collect();
            let asset_ids: Vec<Option<i32>> = chunk.iter().map(|f| f.asset_id).collect();
            let symbols: Vec<&str> = chunk.iter().map(|f| f.symbol.as_str()).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|f| f.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|f| f.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|f| f.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|f| f.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|f| f.volume).collect();

            sqlx::query(&format!(
                r#"
                INSERT INTO {} ("date", asset_id, symbol, open, high, low, close, volume)
                SELECT * FROM UNNEST(
                    $1::date[], $2::int4[], $3::text[],
                    $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[],
                    $8::int8[]
                )
                "#,
                staging
            ))
            .bind(&dates)
            .bind(&asset_ids)
            .bind(&symbols)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .execute(&mut *tx)
            .await
            .map_err(|e| RefreshError::publish(name, e))?;
        }

        tx.commit().await.map_err(|e| RefreshError::publish(name, e))?;
        debug!(table = %staging, rows = facts.len(), "팩트 스테이징");
        Ok(facts.len())
    }

    #[instrument(skip(self, rows, windows), fields(rows = rows.len()))]
    async fn stage_enriched(
        &self,
        rows: &[EnrichedPrice],
        windows: &MovingAverageWindows,
    ) -> Result<usize> {
        let name = self.table_name(MartTable::FactPricesEnriched);
        ensure_ma_width(name, rows, windows)?;
        let staging = staging_name(name);
        let ma_columns = windows.column_names();
        let sql = enriched_insert_sql(&staging, &ma_columns);
        let mut tx = self
            .begin_staging(MartTable::FactPricesEnriched, &ma_columns)
            .await?;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.date).collect();
            let asset_ids: Vec<Option<i32>> = chunk.iter().map(|r| r.asset_id).collect();
            let symbols: Vec<&str> = chunk.iter().map(|r| r.symbol.as_str()).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|r| r.close).collect();
            let prev_closes: Vec<Option<Decimal>> = chunk.iter().map(|r| r.prev_close).collect();
            let returns: Vec<Option<Decimal>> =
                chunk.iter().map(|r| r.daily_return_pct).collect();

            let mut query = sqlx::query(&sql)
                .bind(dates)
                .bind(asset_ids)
                .bind(symbols)
                .bind(closes)
                .bind(prev_closes)
                .bind(returns);

            for index in 0..ma_columns.len() {
                let averages: Vec<Decimal> = chunk
                    .iter()
                    .map(|r| r.moving_averages[index])
                    .collect();
                query = query.bind(averages);
            }

            query
                .execute(&mut *tx)
                .await
                .map_err(|e| RefreshError::publish(name, e))?;
        }

        tx.commit().await.map_err(|e| RefreshError::publish(name, e))?;
        debug!(table = %staging, rows = rows.len(), "파생 지표 스테이징");
        Ok(rows.len())
    }

    #[instrument(skip(self))]
    async fn commit_staged(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in MartTable::ALL {
            let name = self.table_name(table);
            let staging = staging_name(name);

            let staged: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(&staging)
                .fetch_one(&mut *tx)
                .await?;
            if staged.is_none() {
                // tx는 커밋 없이 드롭되어 롤백됨
                return Err(RefreshError::publish(name, "staging table missing"));
            }

            for statement in swap_statements(table, name) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| RefreshError::publish(name, e))?;
            }
        }

        tx.commit().await.map_err(|e| RefreshError::publish("commit", e))?;
        info!(tables = ?self.tables.published(), "스테이징 테이블 게시");
        Ok(())
    }

    async fn discard_staged(&self) -> Result<()> {
        for table in MartTable::ALL {
            let staging = staging_name(self.table_name(table));
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
                .execute(&self.pool)
                .await?;
        }
        debug!("스테이징 테이블 정리");
        Ok(())
    }

    async fn record_run(&self, record: &RunRecord) -> Result<()> {
        let table = &self.tables.run_log;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                run_id uuid PRIMARY KEY,
                mode text NOT NULL,
                started_at timestamptz NOT NULL,
                ended_at timestamptz,
                status text NOT NULL,
                details jsonb,
                error_message varchar({})
            )
            "#,
            table, MAX_ERROR_MESSAGE_CHARS
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (run_id, mode, started_at, ended_at, status, details, error_message)
            VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7)
            "#,
            table
        ))
        .bind(record.run_id)
        .bind(record.mode.as_str())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.status.as_str())
        .bind(record.details_json())
        .bind(record.error_message.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// 원시 관측 조회문. 유한하지 않은 가격(`NaN`, `Infinity`)은 NULL로 읽어 정제 단계에서 거부되게 합니다.
fn observations_sql(source: &SourceConfig) -> String {
    let source_expr = match source.source_column() {
        Some(column) => format!("{}::text", column),
        None => "NULL::text".to_string(),
    };

    format!(
        r#"
        SELECT symbol::text AS symbol, "date"::date AS "date", {source} AS source,
               {open} AS open, {high} AS high, {low} AS low, {close} AS close,
               volume::bigint AS volume, {load_ts}::timestamptz AS load_ts
        FROM {table}
        ORDER BY symbol, "date", load_ts NULLS FIRST, source
        "#,
        source = source_expr,
        open = finite_numeric("open"),
        high = finite_numeric("high"),
        low = finite_numeric("low"),
        close = finite_numeric("close"),
        load_ts = source.load_ts_column,
        table = source.table,
    )
}

fn finite_numeric(column: &str) -> String {
    format!(
        "CASE WHEN {column}::numeric::text IN ('NaN', 'Infinity', '-Infinity') \
         THEN NULL ELSE {column}::numeric END"
    )
}

/// `schema.table` → `schema.table__next`
fn staging_name(table: &str) -> String {
    format!("{}{}", table, STAGING_SUFFIX)
}

/// 스키마를 뺀 테이블 이름.
fn unqualified(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// 제약조건 이름 접두사 (스키마 제외).
fn constraint_prefix(table: &str) -> String {
    unqualified(table).to_string()
}

fn create_table_sql(table: MartTable, name: &str, prefix: &str, ma_columns: &[String]) -> String {
    match table {
        MartTable::DimCalendar => format!(
            r#"
            CREATE TABLE {name} (
                "date" date NOT NULL,
                year int4 NOT NULL,
                month int4 NOT NULL,
                day int4 NOT NULL,
                day_of_week int4 NOT NULL,
                week int4 NOT NULL,
                CONSTRAINT {prefix}_pk PRIMARY KEY ("date")
            )
            "#
        ),
        MartTable::DimAsset => format!(
            r#"
            CREATE TABLE {name} (
                asset_id int4 NOT NULL,
                symbol text NOT NULL,
                CONSTRAINT {prefix}_pk PRIMARY KEY (asset_id),
                CONSTRAINT {prefix}_symbol_key UNIQUE (symbol)
            )
            "#
        ),
        MartTable::FactPrices => format!(
            r#"
            CREATE TABLE {name} (
                "date" date NOT NULL,
                asset_id int4,
                symbol text NOT NULL,
                open numeric NOT NULL,
                high numeric NOT NULL,
                low numeric NOT NULL,
                close numeric NOT NULL,
                volume int8 NOT NULL,
                CONSTRAINT {prefix}_pk PRIMARY KEY (symbol, "date")
            )
            "#
        ),
        MartTable::FactPricesEnriched => {
            let ma_columns: String = ma_columns
                .iter()
                .map(|c| format!("{} numeric NOT NULL,\n", c))
                .collect();
            format!(
                r#"
                CREATE TABLE {name} (
                    "date" date NOT NULL,
                    asset_id int4,
                    symbol text NOT NULL,
                    close numeric NOT NULL,
                    prev_close numeric,
                    daily_return_pct numeric,
                    {ma_columns}
                    CONSTRAINT {prefix}_pk PRIMARY KEY (symbol, "date")
                )
                "#
            )
        }
    }
}

fn enriched_insert_sql(staging: &str, ma_columns: &[String]) -> String {
    let mut columns = vec![
        "\"date\"".to_string(),
        "asset_id".to_string(),
        "symbol".to_string(),
        "close".to_string(),
        "prev_close".to_string(),
        "daily_return_pct".to_string(),
    ];
    let mut arrays = vec![
        "$1::date[]".to_string(),
        "$2::int4[]".to_string(),
        "$3::text[]".to_string(),
        "$4::numeric[]".to_string(),
        "$5::numeric[]".to_string(),
        "$6::numeric[]".to_string(),
    ];
    for (offset, column) in ma_columns.iter().enumerate() {
        columns.push(column.clone());
        arrays.push(format!("${}::numeric[]", offset + 7));
    }

    format!(
        "INSERT INTO {} ({}) SELECT * FROM UNNEST({})",
        staging,
        columns.join(", "),
        arrays.join(", ")
    )
}

/// 게시 테이블 하나를 스테이징 테이블로 교체하는 문장들.
fn swap_statements(table: MartTable, name: &str) -> Vec<String> {
    let staging = staging_name(name);
    let target = unqualified(name);
    let staged_prefix = constraint_prefix(&staging);

    let mut statements = vec![
        format!("DROP TABLE IF EXISTS {}", name),
        format!("ALTER TABLE {} RENAME TO {}", staging, target),
        format!(
            "ALTER TABLE {} RENAME CONSTRAINT {}_pk TO {}_pk",
            name, staged_prefix, target
        ),
    ];
    if table == MartTable::DimAsset {
        statements.push(format!(
            "ALTER TABLE {} RENAME CONSTRAINT {}_symbol_key TO {}_symbol_key",
            name, staged_prefix, target
        ));
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_names_keep_schema() {
        assert_eq!(staging_name("mart.fact_prices"), "mart.fact_prices__next");
        assert_eq!(unqualified("mart.fact_prices__next"), "fact_prices__next");
        assert_eq!(constraint_prefix("dim_asset__next"), "dim_asset__next");
    }

    #[test]
    fn test_swap_renames_table_and_constraints() {
        let statements = swap_statements(MartTable::DimAsset, "mart.dim_asset");
        assert_eq!(
            statements,
            vec![
                "DROP TABLE IF EXISTS mart.dim_asset",
                "ALTER TABLE mart.dim_asset__next RENAME TO dim_asset",
                "ALTER TABLE mart.dim_asset RENAME CONSTRAINT dim_asset__next_pk TO dim_asset_pk",
                "ALTER TABLE mart.dim_asset RENAME CONSTRAINT dim_asset__next_symbol_key TO dim_asset_symbol_key",
            ]
        );
        assert_eq!(swap_statements(MartTable::FactPrices, "fact_prices").len(), 3);
    }

    #[test]
    fn test_enriched_insert_binds_one_array_per_window() {
        let windows = MovingAverageWindows::new(vec![7, 30]).unwrap();
        let sql = enriched_insert_sql("fact_prices_enriched__next", &windows.column_names());
        assert!(sql.contains("ma_7d, ma_30d"));
        assert!(sql.contains("$7::numeric[], $8::numeric[]"));
        assert!(!sql.contains("$9"));
    }

    #[test]
    fn test_observations_read_non_finite_prices_as_null() {
        let sql = observations_sql(&SourceConfig::default());
        for column in ["open", "high", "low", "close"] {
            let guard = format!(
                "CASE WHEN {column}::numeric::text IN ('NaN', 'Infinity', '-Infinity') THEN NULL"
            );
            assert!(sql.contains(&guard), "{column}");
        }
        assert!(sql.contains("ORDER BY symbol, \"date\", load_ts NULLS FIRST, source"));
    }

    #[test]
    fn test_enriched_ddl_has_moving_average_columns() {
        let windows = MovingAverageWindows::new(vec![5]).unwrap();
        let ddl = create_table_sql(
            MartTable::FactPricesEnriched,
            "fact_prices_enriched__next",
            "fact_prices_enriched__next",
            &windows.column_names(),
        );
        assert!(ddl.contains("ma_5d numeric NOT NULL"));
        assert!(ddl.contains("CONSTRAINT fact_prices_enriched__next_pk PRIMARY KEY"));
    }
}
