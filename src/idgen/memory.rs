use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{IdGenError, IdGenerator};
use crate::admission::DoneSignal;

/// In-process counter. Never fails; ids reset with the process.
#[derive(Debug, Default)]
pub struct MemoryIdGen {
    last: AtomicI64,
}

impl MemoryIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdGenerator for MemoryIdGen {
    async fn next_id(&self, _cancel: Option<&DoneSignal>) -> Result<i64, IdGenError> {
        Ok(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn starts_at_one() {
        let gen = MemoryIdGen::new();
        assert_eq!(gen.next_id(None).await.unwrap(), 1);
        assert_eq!(gen.next_id(None).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ids_are_unique() {
        let gen = Arc::new(MemoryIdGen::new());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gen = Arc::clone(&gen);
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    for _ in 0..100 {
                        ids.push(gen.next_id(None).await.unwrap());
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            for id in task.await.unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(seen.iter().max(), Some(&800));
    }
}
