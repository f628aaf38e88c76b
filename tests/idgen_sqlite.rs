//! SQLite-backed id generation under concurrent load.

use std::collections::HashSet;
use std::sync::Arc;

use svckit::config::{AdmissionConfig, SqlConfig};
use svckit::db::SqlDb;
use svckit::idgen::{IdGenerator, SqlIdGen};

fn db(dir: &tempfile::TempDir, capacity: usize) -> SqlDb {
    SqlDb::new(&SqlConfig {
        path: dir.path().join("ids.db").to_string_lossy().into_owned(),
        admission: AdmissionConfig {
            capacity,
            hesitation_ms: 0,
        },
        idle_timeout_secs: 60,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ids_are_unique_and_gated() {
    let dir = tempfile::tempdir().unwrap();
    let db = db(&dir, 1);
    let gen = Arc::new(SqlIdGen::open(db.clone(), "ids").await.unwrap());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let gen = Arc::clone(&gen);
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..25 {
                    ids.push(gen.next_id(None).await.unwrap());
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(seen.iter().min(), Some(&1));
    assert_eq!(seen.iter().max(), Some(&100));

    gen.close().await;
    assert_eq!(db.idle_connections(), 0);
    assert_eq!(db.admission().in_flight(), 0);
}
