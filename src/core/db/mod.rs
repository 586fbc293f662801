mod fanout;
mod memory;
mod mongo;
mod mysql;
mod sqlite;
mod state;
pub mod util;

use std::future::Future;

use crate::error::Result;
use crate::models::ObjectCount;

pub use fanout::FanOutCountRepo;
pub use memory::InMemoryCountRepo;
pub use mongo::MongoCountRepo;
pub use mysql::MySqlCountRepo;
pub use sqlite::SqliteCountRepo;

/// Durable per-class running totals.
///
/// Implementations must make every increment atomic per class: concurrent
/// `update_values` calls touching the same class never lose an update.
pub trait ObjectCountRepository: Send + Sync {
    /// Identifies the store in logs and errors. Never contains credentials.
    fn name(&self) -> &str;

    /// Totals sorted by class name.
    ///
    /// `None` returns every class ever recorded. `Some(classes)` returns the
    /// requested classes that have a record; unknown classes are omitted.
    fn read_values(
        &self,
        object_classes: Option<&[String]>,
    ) -> impl Future<Output = Result<Vec<ObjectCount>>> + Send;

    /// Add each delta to its class total, creating the total if absent.
    fn update_values(&self, new_values: &[ObjectCount]) -> impl Future<Output = Result<()>> + Send;
}

/// A concrete store chosen by configuration at startup.
#[derive(Debug)]
pub enum CountRepository {
    InMemory(InMemoryCountRepo),
    Mongo(MongoCountRepo),
    MySql(MySqlCountRepo),
    Sqlite(SqliteCountRepo),
}

impl ObjectCountRepository for CountRepository {
    fn name(&self) -> &str {
        match self {
            CountRepository::InMemory(repo) => repo.name(),
            CountRepository::Mongo(repo) => repo.name(),
            CountRepository::MySql(repo) => repo.name(),
            CountRepository::Sqlite(repo) => repo.name(),
        }
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        match self {
            CountRepository::InMemory(repo) => repo.read_values(object_classes).await,
            CountRepository::Mongo(repo) => repo.read_values(object_classes).await,
            CountRepository::MySql(repo) => repo.read_values(object_classes).await,
            CountRepository::Sqlite(repo) => repo.read_values(object_classes).await,
        }
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        match self {
            CountRepository::InMemory(repo) => repo.update_values(new_values).await,
            CountRepository::Mongo(repo) => repo.update_values(new_values).await,
            CountRepository::MySql(repo) => repo.update_values(new_values).await,
            CountRepository::Sqlite(repo) => repo.update_values(new_values).await,
        }
    }
}

impl From<InMemoryCountRepo> for CountRepository {
    fn from(repo: InMemoryCountRepo) -> Self {
        CountRepository::InMemory(repo)
    }
}

impl From<MongoCountRepo> for CountRepository {
    fn from(repo: MongoCountRepo) -> Self {
        CountRepository::Mongo(repo)
    }
}

impl From<MySqlCountRepo> for CountRepository {
    fn from(repo: MySqlCountRepo) -> Self {
        CountRepository::MySql(repo)
    }
}

impl From<SqliteCountRepo> for CountRepository {
    fn from(repo: SqliteCountRepo) -> Self {
        CountRepository::Sqlite(repo)
    }
}

impl<R: ObjectCountRepository> ObjectCountRepository for std::sync::Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read_values(
        &self,
        object_classes: Option<&[String]>,
    ) -> impl Future<Output = Result<Vec<ObjectCount>>> + Send {
        (**self).read_values(object_classes)
    }

    fn update_values(&self, new_values: &[ObjectCount]) -> impl Future<Output = Result<()>> + Send {
        (**self).update_values(new_values)
    }
}
