use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{AssetQuote, HistoryEntry};
use crate::storage::{HistoryStore, SnapshotStore};
use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;

const INSERT_BATCH_SIZE: usize = 1000;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS current_coins (
        coin_id     TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        symbol      TEXT NOT NULL,
        price       DOUBLE PRECISION NOT NULL CHECK (price >= 0),
        market_cap  DOUBLE PRECISION CHECK (market_cap >= 0),
        change_24h  DOUBLE PRECISION,
        observed_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS current_coins_symbol_idx ON current_coins (symbol)",
    "CREATE INDEX IF NOT EXISTS current_coins_price_idx ON current_coins (price)",
    "CREATE INDEX IF NOT EXISTS current_coins_market_cap_idx ON current_coins (market_cap)",
    r#"
    CREATE TABLE IF NOT EXISTS coin_history (
        id          BIGSERIAL PRIMARY KEY,
        coin_id     TEXT NOT NULL,
        name        TEXT NOT NULL,
        symbol      TEXT NOT NULL,
        price       DOUBLE PRECISION NOT NULL,
        market_cap  DOUBLE PRECISION,
        change_24h  DOUBLE PRECISION,
        snapshot_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS coin_history_coin_time_idx ON coin_history (coin_id, snapshot_at)",
];

/// Postgres-backed snapshot and history store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await?;
        info!("Connected to Postgres (max {} connections)", config.max_connections);
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes when missing.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Database schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quote_from_row(row: &PgRow) -> std::result::Result<AssetQuote, sqlx::Error> {
    Ok(AssetQuote {
        coin_id: row.try_get("coin_id")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        price: row.try_get("price")?,
        market_cap: row.try_get("market_cap")?,
        change_24h: row.try_get("change_24h")?,
        observed_at: row.try_get("observed_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> std::result::Result<HistoryEntry, sqlx::Error> {
    Ok(HistoryEntry {
        coin_id: row.try_get("coin_id")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        price: row.try_get("price")?,
        market_cap: row.try_get("market_cap")?,
        change_24h: row.try_get("change_24h")?,
        snapshot_at: row.try_get("snapshot_at")?,
    })
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn replace_all(&self, quotes: &[AssetQuote]) -> Result<usize> {
        // Delete and insert share one transaction so readers never see an
        // empty table mid-refresh.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM current_coins").execute(&mut *tx).await?;

        let mut inserted = 0;
        for chunk in quotes.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO current_coins (coin_id, name, symbol, price, market_cap, change_24h, observed_at) ",
            );
            builder.push_values(chunk, |mut row, quote| {
                row.push_bind(quote.coin_id.clone())
                    .push_bind(quote.name.clone())
                    .push_bind(quote.symbol.clone())
                    .push_bind(quote.price)
                    .push_bind(quote.market_cap)
                    .push_bind(quote.change_24h)
                    .push_bind(quote.observed_at);
            });
            builder.push(" ON CONFLICT (coin_id) DO NOTHING");
            inserted += builder.build().execute(&mut *tx).await?.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Replaced current snapshot with {} rows", inserted);
        Ok(inserted)
    }

    async fn load_all(&self) -> Result<Vec<AssetQuote>> {
        let rows = sqlx::query(
            r#"
            SELECT coin_id, name, symbol, price, market_cap, change_24h, observed_at
            FROM current_coins
            ORDER BY market_cap DESC NULLS LAST, coin_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(quote_from_row).collect::<std::result::Result<_, _>>()?)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append(&self, entries: &[HistoryEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in entries.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO coin_history (coin_id, name, symbol, price, market_cap, change_24h, snapshot_at) ",
            );
            builder.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.coin_id.clone())
                    .push_bind(entry.name.clone())
                    .push_bind(entry.symbol.clone())
                    .push_bind(entry.price)
                    .push_bind(entry.market_cap)
                    .push_bind(entry.change_24h)
                    .push_bind(entry.snapshot_at);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected() as usize;
        }
        tx.commit().await?;

        debug!("Appended {} history rows", inserted);
        Ok(inserted)
    }

    async fn find_by_coin(&self, coin_id: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT coin_id, name, symbol, price, market_cap, change_24h, snapshot_at
            FROM coin_history
            WHERE coin_id = $1
            ORDER BY snapshot_at ASC, id ASC
            "#,
        )
        .bind(coin_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(entry_from_row).collect::<std::result::Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::{create_test_entry, create_test_quote};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    async fn connect_from_env() -> PgStore {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            max_connections: 2,
        };
        let store = PgStore::connect(&config).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires a Postgres instance in DATABASE_URL"]
    async fn test_pg_replace_and_history_roundtrip() {
        let store = connect_from_env().await;

        store
            .replace_all(&[create_test_quote("pg-test-a", 1.0), create_test_quote("pg-test-b", 2.0)])
            .await
            .unwrap();
        store.replace_all(&[create_test_quote("pg-test-a", 3.0)]).await.unwrap();
        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 3.0);

        let coin = format!("pg-test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store
            .append(&[
                create_test_entry(&coin, 1.0, t1),
                create_test_entry(&coin, 3.0, t1 + ChronoDuration::hours(2)),
                create_test_entry(&coin, 2.0, t1 + ChronoDuration::hours(1)),
            ])
            .await
            .unwrap();
        let prices: Vec<f64> = store
            .find_by_coin(&coin)
            .await
            .unwrap()
            .iter()
            .map(|e| e.price)
            .collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
    }
}
