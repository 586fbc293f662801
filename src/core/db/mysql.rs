use std::time::Duration;

use sqlx::{
    Connection, MySql,
    mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions},
};

use crate::config::MySqlConfig;
use crate::core::db::ObjectCountRepository;
use crate::core::db::state::PoolState;
use crate::core::db::util::{placeholders, validate_deltas, validate_identifier};
use crate::error::Result;
use crate::models::ObjectCount;

const MAX_CONNECTIONS: u32 = 5;

/// Running totals in a MySQL table keyed by `object_class`.
///
/// The database and table are created on first connection. Class names are
/// compared byte for byte (`utf8mb4_bin`). Counts are read through an
/// unsigned cast, so tables with a signed `count int` column work too.
#[derive(Debug)]
pub struct MySqlCountRepo {
    state: PoolState<MySql>,
    config: MySqlConfig,
    sql: Statements,
}

#[derive(Debug)]
struct Statements {
    create_database: String,
    create_table: String,
    upsert: String,
    select_all: String,
    table: String,
}

impl Statements {
    fn new(database: &str, table: &str) -> Result<Self> {
        let database = validate_identifier(database)?;
        let table = validate_identifier(table)?;
        Ok(Self {
            create_database: format!("CREATE DATABASE IF NOT EXISTS `{}`", database),
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS `{}` (
                    `object_class` VARCHAR(50) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
                    `count` BIGINT UNSIGNED NOT NULL,
                    PRIMARY KEY (`object_class`)
                )",
                table
            ),
            upsert: format!(
                "INSERT INTO `{}` (`object_class`, `count`) VALUES (?, ?)
                ON DUPLICATE KEY UPDATE `count` = `count` + ?",
                table
            ),
            select_all: format!(
                "SELECT `object_class`, CAST(`count` AS UNSIGNED) FROM `{}` ORDER BY `object_class`",
                table
            ),
            table: table.to_string(),
        })
    }

    fn select_some(&self, n: usize) -> String {
        format!(
            "SELECT `object_class`, CAST(`count` AS UNSIGNED) FROM `{}` WHERE `object_class` IN ({}) ORDER BY `object_class`",
            self.table,
            placeholders(n)
        )
    }
}

impl MySqlCountRepo {
    /// No connection is made until the first read or update.
    pub fn new(config: MySqlConfig, timeout: Duration) -> Result<Self> {
        let sql = Statements::new(&config.database, &config.table)?;
        let name = format!(
            "mysql://{}:{}/{}.{}",
            config.host, config.port, config.database, config.table
        );
        Ok(Self {
            state: PoolState::new(name, timeout),
            config,
            sql,
        })
    }

    fn server_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
    }

    async fn pool(&self) -> Result<&MySqlPool> {
        self.state
            .pool(|| async {
                let server = self.server_options();

                let mut conn = MySqlConnection::connect_with(&server).await?;
                sqlx::query(&self.sql.create_database)
                    .execute(&mut conn)
                    .await?;
                conn.close().await?;

                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(self.state.timeout())
                    .connect_with(server.database(&self.config.database))
                    .await?;
                sqlx::query(&self.sql.create_table).execute(&pool).await?;
                Ok::<_, sqlx::Error>(pool)
            })
            .await
    }

    pub async fn close(&self) {
        self.state.close().await
    }
}

impl ObjectCountRepository for MySqlCountRepo {
    fn name(&self) -> &str {
        self.state.store()
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        if object_classes.is_some_and(|classes| classes.is_empty()) {
            return Ok(Vec::new());
        }
        let pool = self.pool().await?;

        let rows: Vec<(String, u64)> = match object_classes {
            None => {
                self.state
                    .bounded(sqlx::query_as(&self.sql.select_all).fetch_all(pool))
                    .await?
            }
            Some(classes) => {
                let sql = self.sql.select_some(classes.len());
                let mut query = sqlx::query_as(&sql);
                for class in classes {
                    query = query.bind(class);
                }
                self.state.bounded(query.fetch_all(pool)).await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(object_class, count)| ObjectCount { object_class, count })
            .collect())
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        validate_deltas(new_values)?;
        if new_values.is_empty() {
            return Ok(());
        }
        let pool = self.pool().await?;

        // One transaction per batch; dropping it uncommitted rolls it back.
        self.state
            .bounded(async {
                let mut tx = pool.begin().await?;
                for value in new_values {
                    sqlx::query(&self.sql.upsert)
                        .bind(&value.object_class)
                        .bind(value.count)
                        .bind(value.count)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await
            })
            .await?;

        tracing::debug!(store = %self.name(), classes = new_values.len(), "Applied count deltas");
        Ok(())
    }
}
