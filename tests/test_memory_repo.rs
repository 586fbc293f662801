//! Integration tests for the in-memory count store.
//!
//! Tests cover:
//! - Increment arithmetic and class filters
//! - Concurrent increments from many tasks

mod common;

use std::sync::Arc;

use common::*;

#[tokio::test]
async fn test_increment_then_filtered_read() -> anyhow::Result<()> {
    let repo = InMemoryCountRepo::new();

    repo.update_values(&counts(&[("A", 3)])).await?;
    repo.update_values(&counts(&[("A", 2), ("B", 1)])).await?;

    let wanted = vec!["A".to_string(), "missing".to_string()];
    assert_eq!(
        repo.read_values(Some(wanted.as_slice())).await?,
        counts(&[("A", 5)])
    );
    assert_eq!(repo.read_values(None).await?, repo.read_values(None).await?);
    Ok(())
}

#[tokio::test]
async fn test_overflow_rejected_without_partial_write() -> anyhow::Result<()> {
    let repo = InMemoryCountRepo::with_totals(counts(&[("cat", i64::MAX as u64)]));

    let result = repo.update_values(&counts(&[("dog", 1), ("cat", 1)])).await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(
        repo.read_values(None).await?,
        counts(&[("cat", i64::MAX as u64)])
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() -> anyhow::Result<()> {
    const N: u64 = 200;
    let repo = Arc::new(InMemoryCountRepo::new());

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.update_values(&counts(&[("A", 1)])).await })
        })
        .collect();
    for task in tasks {
        task.await??;
    }

    assert_eq!(repo.read_values(None).await?, counts(&[("A", N)]));
    Ok(())
}
