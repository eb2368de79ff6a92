//! After K recorded successes and an abrupt termination,
//! `floor(K / batch_size) * batch_size` writes are durable.

use std::sync::Arc;

use prmirror_store::{connect, init_schema, CommitManager, RepositoryStore, Session};
use proptest::prelude::*;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn commit_floor_holds_for_any_batch_size(
        writes in 0usize..=20,
        batch_size in 1usize..=7,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let url = format!("sqlite://{}", dir.path().join("floor.db").display());

            {
                let pool = connect(&url).await.unwrap();
                init_schema(&pool).await.unwrap();
                let session = Arc::new(Session::begin(pool).await.unwrap());
                let repos = RepositoryStore::new(Arc::clone(&session));
                let manager = CommitManager::new(Arc::clone(&session), batch_size);

                for i in 0..writes {
                    repos.create("octo", &format!("repo-{i}")).await.unwrap();
                    manager.record_success().await.unwrap();
                }
                // Abrupt termination: no finalize, session dropped.
            }

            let pool = connect(&url).await.unwrap();
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
                .fetch_one(&pool)
                .await
                .unwrap();

            let floor = (writes / batch_size) * batch_size;
            prop_assert!(
                count as usize >= floor,
                "only {count} rows durable; floor is {floor} (writes={writes}, batch={batch_size})"
            );
            // Loss is bounded by the trailing partial batch.
            prop_assert!(
                count as usize <= writes,
                "more rows than writes?"
            );
            prop_assert!(
                writes - (count as usize) < batch_size,
                "lost {} rows, more than one partial batch",
                writes - count as usize
            );
            Ok(())
        })?;
    }
}
