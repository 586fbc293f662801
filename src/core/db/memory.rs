use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::core::db::ObjectCountRepository;
use crate::core::db::util::{select_classes, validate_deltas};
use crate::error::{Error, Result};
use crate::models::ObjectCount;

/// Process-local totals. Every batch is applied under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryCountRepo {
    store: RwLock<BTreeMap<String, u64>>,
}

impl InMemoryCountRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing totals.
    pub fn with_totals(totals: impl IntoIterator<Item = ObjectCount>) -> Self {
        let store = totals
            .into_iter()
            .map(|total| (total.object_class, total.count))
            .collect();
        Self {
            store: RwLock::new(store),
        }
    }
}

impl ObjectCountRepository for InMemoryCountRepo {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        let store = self.store.read().await;
        let totals = store
            .iter()
            .map(|(object_class, count)| ObjectCount::new(object_class.clone(), *count))
            .collect();
        Ok(select_classes(totals, object_classes))
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        validate_deltas(new_values)?;
        let mut store = self.store.write().await;

        // Work out every new total first so an overflow leaves the store untouched.
        let mut updated: BTreeMap<&str, u64> = BTreeMap::new();
        for value in new_values {
            let current = match updated.get(value.object_class.as_str()) {
                Some(count) => *count,
                None => store.get(&value.object_class).copied().unwrap_or(0),
            };
            // Same ceiling as the signed relational and document columns.
            let total = current
                .checked_add(value.count)
                .filter(|total| *total <= i64::MAX as u64)
                .ok_or_else(|| {
                    Error::Validation(format!("count for {:?} would overflow", value.object_class))
                })?;
            updated.insert(value.object_class.as_str(), total);
        }

        for (object_class, count) in updated {
            store.insert(object_class.to_string(), count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_class_in_one_batch_adds_up() -> anyhow::Result<()> {
        let repo = InMemoryCountRepo::new();
        repo.update_values(&[ObjectCount::new("cat", 1), ObjectCount::new("cat", 2)])
            .await?;
        assert_eq!(repo.read_values(None).await?, vec![ObjectCount::new("cat", 3)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_overflow_rejects_whole_batch() -> anyhow::Result<()> {
        let repo = InMemoryCountRepo::with_totals([ObjectCount::new("cat", i64::MAX as u64 - 1)]);
        let result = repo
            .update_values(&[ObjectCount::new("dog", 1), ObjectCount::new("cat", 5)])
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(
            repo.read_values(None).await?,
            vec![ObjectCount::new("cat", i64::MAX as u64 - 1)]
        );
        Ok(())
    }
}
