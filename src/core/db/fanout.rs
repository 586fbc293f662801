use futures::future::join_all;

use crate::core::db::ObjectCountRepository;
use crate::core::db::util::validate_deltas;
use crate::error::{Error, Result, StoreFailure};
use crate::models::ObjectCount;

/// Writes every batch to all member stores; reads from the first one.
///
/// There is no transaction across members. When some members fail, the
/// others keep their increments and the caller gets `Error::Persistence`
/// naming each failed store.
#[derive(Debug)]
pub struct FanOutCountRepo<R> {
    repos: Vec<R>,
    name: String,
}

impl<R: ObjectCountRepository> FanOutCountRepo<R> {
    /// `repos` must not be empty; its first member answers reads.
    pub fn new(repos: Vec<R>) -> Result<Self> {
        if repos.is_empty() {
            return Err(Error::Config("at least one count store is required".to_string()));
        }
        let name = repos
            .iter()
            .map(|repo| repo.name())
            .collect::<Vec<_>>()
            .join(" + ");
        Ok(Self { repos, name })
    }

    pub fn repos(&self) -> &[R] {
        &self.repos
    }

    /// The member that answers `read_values`.
    pub fn primary(&self) -> &R {
        &self.repos[0]
    }
}

impl<R: ObjectCountRepository> ObjectCountRepository for FanOutCountRepo<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_values(&self, object_classes: Option<&[String]>) -> Result<Vec<ObjectCount>> {
        self.primary().read_values(object_classes).await
    }

    async fn update_values(&self, new_values: &[ObjectCount]) -> Result<()> {
        // A bad batch must not reach any member.
        validate_deltas(new_values)?;

        let results = join_all(self.repos.iter().map(|repo| repo.update_values(new_values))).await;

        let mut failures = Vec::new();
        for (repo, result) in self.repos.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(Error::Persistence { failures: nested }) => failures.extend(nested),
                Err(err) => failures.push(StoreFailure {
                    store: repo.name().to_string(),
                    message: match err {
                        Error::StoreUnavailable { message, .. } => message,
                        other => other.to_string(),
                    },
                }),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            tracing::error!(
                failed = failures.len(),
                members = self.repos.len(),
                "Count update failed on some stores; stores may now disagree"
            );
            Err(Error::Persistence { failures })
        }
    }
}
