use std::future::Future;
use std::time::Duration;

use futures::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    bson::{Document, doc},
    options::{ClientOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::MongoConfig;
use crate::core::db::ObjectCountRepository;
use crate::core::db::util::validate_deltas;
use crate::error::{Error, Result};
use crate::models::ObjectCount;

const COLLECTION_NAME: &str = "counter";

#[derive(Debug, Serialize, Deserialize)]
struct CounterDocument {
    object_class: String,
    count: i64,
}

/// Running totals as one document per class in a MongoDB collection.
///
/// Each increment is a single `$inc` upsert, which the server applies
/// atomically. A unique index on `object_class` is created on first use.
#[derive(Debug)]
pub struct MongoCountRepo {
    name: String,
    collection: Collection<CounterDocument>,
    timeout: Duration,
    index: OnceCell<()>,
}

impl MongoCountRepo {
    /// The driver connects lazily; this only validates the options.
    pub async fn connect(config: &MongoConfig, timeout: Duration) -> Result<Self> {
        let name = format!("mongodb://{}:{}/{}", config.host, config.port, config.database);
        let unavailable = |e: mongodb::error::Error| Error::store_unavailable(&name, e);

        let uri = format!("mongodb://{}:{}", config.host, config.port);
        let mut options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(unavailable)?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options).map_err(unavailable)?;
        let collection = client
            .database(&config.database)
            .collection::<CounterDocument>(COLLECTION_NAME);

        Ok(Self {
            name,
            collection,
            timeout,
            index: OnceCell::new(),
        })
    }

    async fn bounded<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = mongodb::error::Result<T>>,
    {
        bounded(&self.name, self.timeout, fut).await
    }

    async fn ensure_index(&self) -> Result<()> {
        self.index
            .get_or_try_init(|| async {
                let index = IndexModel::builder()
                    .keys(doc! { "object_class": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build();
                self.bounded(self.collection.create_index(index).into_future())
                    .await
                    .map(|_| ())
            })
            .await?;
        Ok(())
    }
}

/// Run one driver call under `timeout`, mapping every failure to
/// `StoreUnavailable`.
async fn bounded<T, Fut>(store: &str, timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = mongodb::error::Result<T>>,
{
    let err = match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => Error::store_unavailable(store, e),
        Err(_) => Error::store_unavailable(store, format!("timed out after {:?}", timeout)),
    };
    tracing::warn!(store, error = %err, "Store call failed");
    Err(err)
}

fn class_filter(object_classes: Option<&[String]>) -> Document {
    match object_classes {
        Some(classes) => doc! { "object_class": { "$in": classes.to_vec() } },
        None => doc! {},
    }
}

fn increment(delta: i64) -> Document {
    doc! { "$inc": { "count": delta } }
}

impl ObjectCountRepository for MongoCountRepo {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        if object_classes.is_some_and(|classes| classes.is_empty()) {
            return Ok(Vec::new());
        }
        let documents: Vec<CounterDocument> = self
            .bounded(async {
                self.collection
                    .find(class_filter(object_classes))
                    .sort(doc! { "object_class": 1 })
                    .await?
                    .try_collect()
                    .await
            })
            .await?;

        documents
            .into_iter()
            .map(|document| {
                let count = u64::try_from(document.count).map_err(|_| {
                    Error::store_unavailable(
                        &self.name,
                        format!(
                            "negative count {} stored for {:?}",
                            document.count, document.object_class
                        ),
                    )
                })?;
                Ok(ObjectCount::new(document.object_class, count))
            })
            .collect()
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        validate_deltas(new_values)?;
        if new_values.is_empty() {
            return Ok(());
        }
        self.ensure_index().await?;

        for value in new_values {
            // validate_deltas guarantees the count fits
            self.bounded(
                self.collection
                    .update_one(
                        doc! { "object_class": value.object_class.as_str() },
                        increment(value.count as i64),
                    )
                    .upsert(true)
                    .into_future(),
            )
            .await?;
        }

        tracing::debug!(store = %self.name, classes = new_values.len(), "Applied count deltas");
        Ok(())
    }
}
