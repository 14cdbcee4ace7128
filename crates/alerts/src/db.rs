//! SQLite alert storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricestep_core::{Alert, AlertId, FixedPoint, NewAlert, Step};
use pricestep_engine::{AlertStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("Alert not found: {0}")]
    NotFound(AlertId),
    #[error("Alert {0} was changed since it was loaded")]
    Stale(AlertId),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(id) => StoreError::NotFound(id),
            DbError::Stale(id) => StoreError::Stale(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

type AlertRow = (i64, String, String, i64, Option<i64>, Option<String>, bool);

const SELECT_ALERT: &str =
    "SELECT id, owner, symbol, step, baseline_price, baseline_time, active FROM token_alerts";

fn row_to_alert(row: AlertRow) -> Result<Alert, DbError> {
    let (id, owner, symbol, step_raw, baseline_raw, baseline_time, active) = row;
    let corrupt = |reason: String| DbError::Corrupt { id, reason };

    let step = FixedPoint::from_raw_i64(step_raw)
        .ok_or_else(|| corrupt(format!("negative step {}", step_raw)))
        .and_then(|v| Step::new(v).map_err(|e| corrupt(e.to_string())))?;

    let baseline_price = match baseline_raw {
        Some(raw) => Some(
            FixedPoint::from_raw_i64(raw)
                .ok_or_else(|| corrupt(format!("negative baseline {}", raw)))?,
        ),
        None => None,
    };

    let baseline_time = match baseline_time {
        Some(text) => Some(
            DateTime::parse_from_rfc3339(&text)
                .map_err(|e| corrupt(format!("baseline_time {:?}: {}", text, e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Alert {
        id: AlertId(id),
        owner,
        symbol,
        step,
        baseline_price,
        baseline_time,
        active,
    })
}

/// Database connection for alerts.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given path.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS token_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                symbol TEXT NOT NULL,
                step INTEGER NOT NULL,
                baseline_price INTEGER,
                baseline_time TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_token_alerts_active ON token_alerts(active)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_alerts_owner ON token_alerts(owner, symbol)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_many(&self, sql: &str, bind: Option<&str>) -> Result<Vec<Alert>, DbError> {
        let mut query = sqlx::query_as::<_, AlertRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_alert)
            .collect()
    }

    fn check_affected(id: AlertId, rows: u64) -> Result<(), DbError> {
        if rows == 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    async fn exists(&self, id: AlertId) -> Result<bool, DbError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM token_alerts WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl AlertStore for Database {
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError> {
        let sql = format!("{} WHERE active = 1 ORDER BY id", SELECT_ALERT);
        Ok(self.fetch_many(&sql, None).await?)
    }

    async fn update_baseline(
        &self,
        loaded: &Alert,
        price: FixedPoint,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = loaded.id;
        let result = sqlx::query(
            r#"
            UPDATE token_alerts SET baseline_price = ?, baseline_time = ?
            WHERE id = ? AND active = 1 AND step = ? AND baseline_price IS ?
            "#,
        )
        .bind(price.to_raw_i64())
        .bind(time.to_rfc3339())
        .bind(id.0)
        .bind(loaded.step.value().to_raw_i64())
        .bind(loaded.baseline_price.map(FixedPoint::to_raw_i64))
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        if self.exists(id).await? {
            Err(DbError::Stale(id).into())
        } else {
            Err(DbError::NotFound(id).into())
        }
    }

    async fn toggle(&self, id: AlertId, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE token_alerts SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(Self::check_affected(id, result.rows_affected())?)
    }

    async fn create(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO token_alerts (owner, symbol, step, baseline_price, baseline_time, active)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&alert.owner)
        .bind(&alert.symbol)
        .bind(alert.step.value().to_raw_i64())
        .bind(alert.baseline_price.map(FixedPoint::to_raw_i64))
        .bind(alert.baseline_time.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Alert {
            id: AlertId(result.last_insert_rowid()),
            owner: alert.owner,
            symbol: alert.symbol,
            step: alert.step,
            baseline_price: alert.baseline_price,
            baseline_time: Some(alert.baseline_time),
            active: true,
        })
    }

    async fn get(&self, id: AlertId) -> Result<Option<Alert>, StoreError> {
        let sql = format!("{} WHERE id = ?", SELECT_ALERT);
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(row.map(row_to_alert).transpose()?)
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Alert>, StoreError> {
        let sql = format!("{} WHERE owner = ? ORDER BY id", SELECT_ALERT);
        Ok(self.fetch_many(&sql, Some(owner)).await?)
    }

    async fn find_existing(
        &self,
        owner: &str,
        symbol: &str,
        step: Step,
    ) -> Result<Option<Alert>, StoreError> {
        let sql = format!(
            "{} WHERE owner = ? AND symbol = ? AND step = ? ORDER BY id LIMIT 1",
            SELECT_ALERT
        );
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(owner)
            .bind(symbol)
            .bind(step.value().to_raw_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(row.map(row_to_alert).transpose()?)
    }

    async fn update_step(
        &self,
        id: AlertId,
        step: Step,
        baseline: Option<FixedPoint>,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE token_alerts SET step = ?, baseline_price = ?, baseline_time = ? WHERE id = ?",
        )
        .bind(step.value().to_raw_i64())
        .bind(baseline.map(FixedPoint::to_raw_i64))
        .bind(time.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Self::check_affected(id, result.rows_affected())?)
    }

    async fn remove(&self, id: AlertId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM token_alerts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(Self::check_affected(id, result.rows_affected())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn price(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn step(s: &str) -> Step {
        s.parse().unwrap()
    }

    async fn db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_active() {
        let db = db().await;
        let btc = db
            .create(NewAlert::new("100", "btc", step("1000"), Some(price("97000.5"))))
            .await
            .unwrap();
        let eth = db
            .create(NewAlert::new("100", "ETH", step("50"), None))
            .await
            .unwrap();

        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, btc.id);
        assert_eq!(active[0].symbol, "BTC");
        assert_eq!(active[0].baseline_price, Some(price("97000.5")));
        assert_eq!(active[1].id, eth.id);
        assert_eq!(active[1].baseline_price, None);
        assert_eq!(db.list_for_owner("100").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sub_cent_values_round_trip_exactly() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("7", "PEPE", step("0.00000001"), Some(price("0.00001234"))))
            .await
            .unwrap();

        let loaded = db.get(alert.id).await.unwrap().unwrap();
        assert_eq!(loaded.step.value(), FixedPoint(1));
        assert_eq!(loaded.baseline_price, Some(FixedPoint(1234)));
    }

    #[tokio::test]
    async fn test_update_baseline() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "BTC", step("1000"), Some(price("30000"))))
            .await
            .unwrap();

        let now = Utc::now();
        db.update_baseline(&alert, price("31000"), now).await.unwrap();

        let loaded = db.get(alert.id).await.unwrap().unwrap();
        assert_eq!(loaded.baseline_price, Some(price("31000")));
        assert_eq!(
            loaded.baseline_time.map(|t| t.timestamp()),
            Some(now.timestamp())
        );
    }

    #[tokio::test]
    async fn test_update_baseline_from_missing_baseline() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "DOGE", step("0.01"), None))
            .await
            .unwrap();

        db.update_baseline(&alert, price("0.1234"), Utc::now())
            .await
            .unwrap();
        let loaded = db.get(alert.id).await.unwrap().unwrap();
        assert_eq!(loaded.baseline_price, Some(price("0.1234")));
    }

    #[tokio::test]
    async fn test_update_baseline_skips_edited_rows() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "BTC", step("1000"), Some(price("30000"))))
            .await
            .unwrap();

        // Step changed after the alert was loaded
        db.update_step(alert.id, step("5000"), Some(price("31050")), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            db.update_baseline(&alert, price("31000"), Utc::now()).await,
            Err(StoreError::Stale(alert.id))
        );
        let loaded = db.get(alert.id).await.unwrap().unwrap();
        assert_eq!(loaded.baseline_price, Some(price("31050")));

        // Paused after the alert was loaded
        db.toggle(alert.id, false).await.unwrap();
        assert_eq!(
            db.update_baseline(&loaded, price("40000"), Utc::now()).await,
            Err(StoreError::Stale(alert.id))
        );

        db.remove(alert.id).await.unwrap();
        assert_eq!(
            db.update_baseline(&loaded, price("40000"), Utc::now()).await,
            Err(StoreError::NotFound(alert.id))
        );
    }

    #[tokio::test]
    async fn test_toggle_keeps_baseline() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "BTC", step("1000"), Some(price("30000"))))
            .await
            .unwrap();

        db.toggle(alert.id, false).await.unwrap();
        assert!(db.list_active().await.unwrap().is_empty());
        assert_eq!(db.list_for_owner("1").await.unwrap().len(), 1);

        db.toggle(alert.id, true).await.unwrap();
        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].baseline_price, Some(price("30000")));
    }

    #[tokio::test]
    async fn test_find_existing_and_owner_listing() {
        let db = db().await;
        db.create(NewAlert::new("1", "BTC", step("1000"), None))
            .await
            .unwrap();
        db.create(NewAlert::new("2", "BTC", step("1000"), None))
            .await
            .unwrap();

        let found = db.find_existing("1", "BTC", step("1000")).await.unwrap();
        assert_eq!(found.map(|a| a.owner), Some("1".to_string()));
        assert!(db
            .find_existing("1", "BTC", step("500"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(db.list_for_owner("2").await.unwrap().len(), 1);
        assert!(db.list_for_owner("3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_step_resets_baseline() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "ETH", step("100"), Some(price("2500"))))
            .await
            .unwrap();

        db.update_step(alert.id, step("10"), Some(price("2600")), Utc::now())
            .await
            .unwrap();

        let loaded = db.get(alert.id).await.unwrap().unwrap();
        assert_eq!(loaded.step, step("10"));
        assert_eq!(loaded.baseline_price, Some(price("2600")));
    }

    #[tokio::test]
    async fn test_missing_alert_is_not_found() {
        let db = db().await;
        let missing = AlertId(404);
        let loaded = Alert {
            id: missing,
            owner: "1".to_string(),
            symbol: "BTC".to_string(),
            step: step("1"),
            baseline_price: None,
            baseline_time: None,
            active: true,
        };

        assert_eq!(db.remove(missing).await, Err(StoreError::NotFound(missing)));
        assert_eq!(
            db.update_baseline(&loaded, price("1"), Utc::now()).await,
            Err(StoreError::NotFound(missing))
        );
        assert_eq!(db.toggle(missing, true).await, Err(StoreError::NotFound(missing)));
        assert_eq!(db.get(missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let db = db().await;
        let alert = db
            .create(NewAlert::new("1", "SOL", step("1"), None))
            .await
            .unwrap();

        db.remove(alert.id).await.unwrap();
        assert_eq!(db.get(alert.id).await.unwrap(), None);
        assert!(db.list_for_owner("1").await.unwrap().is_empty());
    }
}
