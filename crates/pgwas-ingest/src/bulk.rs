//! Async bulk variant loader
//!
//! Position files run to hundreds of thousands of rows, too many for the
//! row-by-row resolver. Loading happens in two phases separated by a barrier:
//!
//! 1. **pre-filter**: look every `(species, chromosome, position)` up
//!    concurrently (bounded by `prefilter_concurrency`, sharing the pool) and
//!    keep the ones that do not exist yet;
//! 2. **append**: write the survivors with one bulk append and no conflict
//!    detection.
//!
//! Phase 2 is only safe because phase 1 found the survivors absent. A second
//! writer adding the same variants between the phases makes the append fail;
//! this path assumes a single writer.

use std::collections::HashSet;
use std::path::Path;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info};

use crate::error::{IngestError, Result};
use crate::models::{Entity, Id, Variant};
use crate::parsers;
use crate::progress::create_progress_bar;
use crate::resolver::Resolver;

/// Outcome of loading one position file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkLoadReport {
    /// Rows read from the file
    pub parsed: usize,
    /// Distinct positions already stored
    pub skipped: usize,
    pub inserted: u64,
}

pub struct BulkVariantLoader<'a> {
    resolver: &'a Resolver,
}

impl<'a> BulkVariantLoader<'a> {
    pub fn new(resolver: &'a Resolver) -> Self {
        Self { resolver }
    }

    /// Load one chromosome's `.012.pos` file. Any failure after the file was
    /// found is reported as [`IngestError::BulkLoad`] for `path`.
    pub async fn load(&self, path: &Path, species: Id, chromosome: Id) -> Result<BulkLoadReport> {
        if !path.is_file() {
            return Err(IngestError::file_not_found(path));
        }
        self.load_file(path, species, chromosome).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Bulk variant load failed");
            IngestError::bulk_load(path, e)
        })
    }

    async fn load_file(&self, path: &Path, species: Id, chromosome: Id) -> Result<BulkLoadReport> {
        let positions = parsers::parse_variant_positions(path)?;
        let parsed = positions.len();

        let mut seen = HashSet::with_capacity(parsed);
        let candidates: Vec<Variant> = positions
            .into_iter()
            .filter(|p| seen.insert(*p))
            .map(|position| Variant {
                species,
                chromosome,
                position,
            })
            .collect();

        let missing = self.prefilter(&candidates).await?;
        let skipped = candidates.len() - missing.len();

        let inserted = if missing.is_empty() {
            0
        } else {
            let store = self.resolver.store();
            self.resolver
                .guard("append variants", store.append_variants(&missing))
                .await?
        };

        info!(
            path = %path.display(),
            parsed,
            skipped,
            inserted,
            "Loaded variant positions"
        );
        Ok(BulkLoadReport {
            parsed,
            skipped,
            inserted,
        })
    }

    /// Candidates with no stored row, in file order. Returns only after every
    /// lookup has finished.
    async fn prefilter(&self, candidates: &[Variant]) -> Result<Vec<Variant>> {
        let concurrency = self.resolver.options().prefilter_concurrency.max(1);
        let pb = create_progress_bar(
            candidates.len() as u64,
            "Variant pre-filter",
            self.resolver.options().show_progress,
        );

        let mut absent: Vec<(usize, Variant)> = stream::iter(candidates.iter().copied().enumerate())
            .map(|(index, variant)| {
                let pb = &pb;
                async move {
                    let query = variant.identity();
                    let found = self
                        .resolver
                        .guard("lookup variant", self.resolver.store().find_id(&query))
                        .await?;
                    pb.inc(1);
                    Ok::<_, IngestError>(found.is_none().then_some((index, variant)))
                }
            })
            .buffer_unordered(concurrency)
            .try_filter_map(|absent| async move { Ok(absent) })
            .try_collect()
            .await?;
        pb.finish_and_clear();

        absent.sort_unstable_by_key(|(index, _)| *index);
        Ok(absent.into_iter().map(|(_, variant)| variant).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ImportOptions;
    use crate::store::{IdentityQuery, IdentityStore, InsertStatement, MemoryStore};
    use crate::test_support::write;

    fn variant(position: i64) -> Variant {
        Variant {
            species: 1,
            chromosome: 2,
            position,
        }
    }

    #[tokio::test]
    async fn test_existing_positions_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chr2_maize.012.pos", "2\t400\n2\t500\n2\t600\n");
        let store = Arc::new(MemoryStore::new());
        store.append_variants(&[variant(500)]).await.unwrap();
        let resolver = Resolver::new(store.clone(), ImportOptions::default());

        let report = BulkVariantLoader::new(&resolver)
            .load(&dir.path().join("chr2_maize.012.pos"), 1, 2)
            .await
            .unwrap();

        assert_eq!(
            report,
            BulkLoadReport {
                parsed: 3,
                skipped: 1,
                inserted: 2,
            }
        );
        assert_eq!(store.variant_positions(1, 2), vec![400, 500, 600]);
    }

    #[tokio::test]
    async fn test_reload_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chr1.pos", "1\t10\n1\t20\n1\t10\n");
        let store = Arc::new(MemoryStore::new());
        let options = ImportOptions {
            prefilter_concurrency: 1,
            ..ImportOptions::default()
        };
        let resolver = Resolver::new(store.clone(), options);
        let loader = BulkVariantLoader::new(&resolver);
        let path = dir.path().join("chr1.pos");

        let first = loader.load(&path, 1, 1).await.unwrap();
        assert_eq!(first.parsed, 3);
        assert_eq!(first.inserted, 2);

        let second = loader.load(&path, 1, 1).await.unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(store.variant_positions(1, 1), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_prefilter_keeps_file_order() {
        let store = Arc::new(MemoryStore::new());
        store.append_variants(&[variant(3), variant(7)]).await.unwrap();
        let resolver = Resolver::new(store, ImportOptions::default());

        let candidates: Vec<Variant> = (0..50).rev().map(variant).collect();
        let missing = BulkVariantLoader::new(&resolver).prefilter(&candidates).await.unwrap();
        let positions: Vec<i64> = missing.iter().map(|v| v.position).collect();
        let expected: Vec<i64> = (0..50).rev().filter(|p| *p != 3 && *p != 7).collect();
        assert_eq!(positions, expected);
    }

    struct UnreachableStore;

    #[async_trait]
    impl IdentityStore for UnreachableStore {
        async fn find_id(&self, _query: &IdentityQuery) -> Result<Option<Id>> {
            Err(IngestError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn insert_ignoring_conflict(&self, _insert: &InsertStatement) -> Result<Option<Id>> {
            Err(IngestError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn insert(&self, _insert: &InsertStatement) -> Result<Id> {
            Err(IngestError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn append_variants(&self, _variants: &[Variant]) -> Result<u64> {
            Err(IngestError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn truncate_all(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connectivity_error_aborts_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chr1.pos", "1\t10\n");
        let resolver = Resolver::new(Arc::new(UnreachableStore), ImportOptions::default());

        let err = BulkVariantLoader::new(&resolver)
            .load(&dir.path().join("chr1.pos"), 1, 1)
            .await
            .unwrap_err();
        match err {
            IngestError::BulkLoad { path, source } => {
                assert!(path.ends_with("chr1.pos"));
                assert!(matches!(*source, IngestError::Database(_)));
            },
            other => panic!("expected bulk load error, got {:?}", other),
        }
    }

    /// Answers the first lookups, then stalls; records every append
    struct SlowLookupStore {
        answered: AtomicUsize,
        appended: AtomicUsize,
    }

    #[async_trait]
    impl IdentityStore for SlowLookupStore {
        async fn find_id(&self, _query: &IdentityQuery) -> Result<Option<Id>> {
            if self.answered.fetch_add(1, Ordering::SeqCst) >= 2 {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(None)
        }

        async fn insert_ignoring_conflict(&self, _insert: &InsertStatement) -> Result<Option<Id>> {
            Ok(None)
        }

        async fn insert(&self, _insert: &InsertStatement) -> Result<Id> {
            Ok(1)
        }

        async fn append_variants(&self, variants: &[Variant]) -> Result<u64> {
            self.appended.fetch_add(variants.len(), Ordering::SeqCst);
            Ok(variants.len() as u64)
        }

        async fn truncate_all(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_prefilter_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chr1.pos", "1\t10\n1\t20\n1\t30\n1\t40\n");
        let store = Arc::new(SlowLookupStore {
            answered: AtomicUsize::new(0),
            appended: AtomicUsize::new(0),
        });
        let options = ImportOptions {
            prefilter_concurrency: 1,
            ..ImportOptions::default()
        };
        let resolver = Resolver::new(store.clone(), options);
        let cancel = resolver.cancellation().clone();
        let path = dir.path().join("chr1.pos");

        let loader = BulkVariantLoader::new(&resolver);
        let (result, _) = tokio::join!(loader.load(&path, 1, 1), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        match result {
            Err(IngestError::BulkLoad { source, .. }) => {
                assert!(matches!(*source, IngestError::Cancelled))
            },
            other => panic!("expected cancelled bulk load, got {:?}", other),
        }
        assert_eq!(store.appended.load(Ordering::SeqCst), 0);
    }
}
