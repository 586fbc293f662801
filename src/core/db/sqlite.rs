use std::time::Duration;

use sqlx::{
    Sqlite,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};

use crate::config::SqliteConfig;
use crate::core::db::ObjectCountRepository;
use crate::core::db::state::PoolState;
use crate::core::db::util::{placeholders, validate_deltas, validate_identifier};
use crate::error::{Error, Result};
use crate::models::ObjectCount;

const MAX_CONNECTIONS: u32 = 5;

/// Running totals in a single-file SQLite database.
///
/// The file and table are created on first connection.
#[derive(Debug)]
pub struct SqliteCountRepo {
    state: PoolState<Sqlite>,
    config: SqliteConfig,
    table: String,
}

impl SqliteCountRepo {
    pub fn new(config: SqliteConfig, timeout: Duration) -> Result<Self> {
        let table = validate_identifier(&config.table)?.to_string();
        let name = format!("sqlite://{}?table={}", config.path.display(), table);
        Ok(Self {
            state: PoolState::new(name, timeout),
            config,
            table,
        })
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.state
            .pool(|| async {
                let connect_opts = SqliteConnectOptions::new()
                    .filename(&self.config.path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .busy_timeout(self.state.timeout());

                let pool = SqlitePoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(self.state.timeout())
                    .connect_with(connect_opts)
                    .await?;
                sqlx::query(&format!(
                    r#"CREATE TABLE IF NOT EXISTS "{}" (
                        object_class TEXT NOT NULL PRIMARY KEY,
                        count INTEGER NOT NULL CHECK (count >= 0)
                    )"#,
                    self.table
                ))
                .execute(&pool)
                .await?;
                Ok::<_, sqlx::Error>(pool)
            })
            .await
    }

    pub async fn close(&self) {
        self.state.close().await
    }
}

impl ObjectCountRepository for SqliteCountRepo {
    fn name(&self) -> &str {
        self.state.store()
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        if object_classes.is_some_and(|classes| classes.is_empty()) {
            return Ok(Vec::new());
        }
        let pool = self.pool().await?;

        let sql = match object_classes {
            None => format!(
                r#"SELECT object_class, count FROM "{}" ORDER BY object_class"#,
                self.table
            ),
            Some(classes) => format!(
                r#"SELECT object_class, count FROM "{}" WHERE object_class IN ({}) ORDER BY object_class"#,
                self.table,
                placeholders(classes.len())
            ),
        };
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for class in object_classes.unwrap_or_default() {
            query = query.bind(class);
        }
        let rows = self.state.bounded(query.fetch_all(pool)).await?;

        rows.into_iter()
            .map(|(object_class, count)| {
                let count = u64::try_from(count).map_err(|_| {
                    self.state
                        .unavailable(format!("negative count {} stored for {:?}", count, object_class))
                })?;
                Ok(ObjectCount { object_class, count })
            })
            .collect()
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        validate_deltas(new_values)?;
        if new_values.is_empty() {
            return Ok(());
        }
        let pool = self.pool().await?;
        // Sums past i64::MAX leave the row untouched (rows_affected == 0).
        let upsert = format!(
            r#"INSERT INTO "{}" (object_class, count) VALUES ($1, $2)
            ON CONFLICT (object_class) DO UPDATE SET count = count + EXCLUDED.count
            WHERE count <= {} - EXCLUDED.count"#,
            self.table,
            i64::MAX
        );

        let overflowed = self
            .state
            .bounded(async {
                let mut tx = pool.begin().await?;
                for value in new_values {
                    // validate_deltas guarantees the count fits
                    let result = sqlx::query(&upsert)
                        .bind(&value.object_class)
                        .bind(value.count as i64)
                        .execute(&mut *tx)
                        .await?;
                    if result.rows_affected() == 0 {
                        tx.rollback().await?;
                        return Ok::<_, sqlx::Error>(Some(value.object_class.as_str()));
                    }
                }
                tx.commit().await?;
                Ok::<_, sqlx::Error>(None)
            })
            .await?;

        if let Some(object_class) = overflowed {
            return Err(Error::Validation(format!(
                "count for {:?} would overflow",
                object_class
            )));
        }

        tracing::debug!(store = %self.name(), classes = new_values.len(), "Applied count deltas");
        Ok(())
    }
}
