//! Idempotent entity resolution
//!
//! [`Resolver::resolve_or_create`] is the single find-or-create primitive every
//! entity goes through:
//!
//! 1. look the natural key up and return the existing id if there is one;
//! 2. otherwise insert with conflicts ignored and return the new id;
//! 3. if the insert was suppressed because another writer got there first,
//!    look the key up once more; only if that also finds nothing is the
//!    failure surfaced as [`IngestError::IdentityResolution`].
//!
//! Each statement commits on its own. Every store call is bounded by the
//! statement timeout and aborts as soon as the run's [`CancellationToken`] fires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ImportOptions;
use crate::error::{IngestError, Result};
use crate::models::{
    Chromosome, Entity, Genotype, GenotypeVersion, Growout, GwasResult, GwasRun, Id, Kinship, Line,
    Location, Lookup, LookupKind, Phenotype, Population, PopulationStructure, Species, Trait,
};
use crate::store::{IdentityKey, IdentityQuery, IdentityStore, InsertStatement};

pub struct Resolver {
    store: Arc<dyn IdentityStore>,
    options: ImportOptions,
    cancel: CancellationToken,
    cache: Option<Mutex<HashMap<IdentityKey, Id>>>,
}

impl Resolver {
    pub fn new(store: Arc<dyn IdentityStore>, options: ImportOptions) -> Self {
        let cache = options.identity_cache.then(|| Mutex::new(HashMap::new()));
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
            cache,
        }
    }

    /// Share a cancellation token with the caller, e.g. a Ctrl-C handler
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run one store call under the statement timeout and the cancellation token
    pub async fn guard<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let after = self.options.statement_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            result = tokio::time::timeout(after, call) => match result {
                Ok(result) => result,
                Err(_) => {
                    error!(operation, ?after, "Statement timed out");
                    Err(IngestError::Timeout {
                        operation: operation.to_string(),
                        after,
                    })
                },
            },
        }
    }

    fn cached(&self, key: &IdentityKey) -> Option<Id> {
        self.cache.as_ref().and_then(|cache| {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .copied()
        })
    }

    fn remember(&self, key: IdentityKey, id: Id) {
        if let Some(cache) = &self.cache {
            cache.lock().unwrap_or_else(PoisonError::into_inner).insert(key, id);
        }
    }

    async fn lookup(&self, query: &IdentityQuery) -> Result<Option<Id>> {
        let operation = format!("lookup {}", query.table);
        self.guard(&operation, self.store.find_id(query)).await
    }

    /// Id of an existing row, without creating one
    pub async fn find(&self, query: &IdentityQuery) -> Result<Option<Id>> {
        let key = query.cache_key();
        if let Some(id) = self.cached(&key) {
            return Ok(Some(id));
        }
        let found = self.lookup(query).await?;
        if let Some(id) = found {
            self.remember(key, id);
        }
        Ok(found)
    }

    /// Like [`find`](Self::find), but a missing row is an error
    pub async fn require(&self, query: &IdentityQuery) -> Result<Id> {
        match self.find(query).await? {
            Some(id) => Ok(id),
            None => {
                error!(key = %query, "Referenced row does not exist");
                Err(IngestError::identity(query.table.name(), query.to_string()))
            },
        }
    }

    pub async fn resolve_or_create(&self, query: &IdentityQuery, insert: &InsertStatement) -> Result<Id> {
        let key = query.cache_key();
        if let Some(id) = self.cached(&key) {
            return Ok(id);
        }

        if let Some(id) = self.lookup(query).await? {
            debug!(key = %query, id, "Found existing row");
            self.remember(key, id);
            return Ok(id);
        }

        let operation = format!("insert {}", insert.table);
        let inserted = self
            .guard(&operation, self.store.insert_ignoring_conflict(insert))
            .await?;
        if let Some(id) = inserted {
            debug!(key = %query, id, "Inserted row");
            self.remember(key, id);
            return Ok(id);
        }

        // another writer inserted the same key between lookup and insert
        warn!(key = %query, "Insert suppressed by a conflicting row, looking it up again");
        match self.lookup(query).await? {
            Some(id) => {
                self.remember(key, id);
                Ok(id)
            },
            None => {
                error!(
                    statement = %insert.shape(),
                    params = %insert.params(),
                    "Insert was suppressed but no conflicting row exists"
                );
                Err(IngestError::identity(query.table.name(), query.to_string()))
            },
        }
    }

    pub async fn resolve<E: Entity>(&self, entity: &E) -> Result<Id> {
        self.resolve_or_create(&entity.identity(), &entity.insert()).await
    }

    /// Plain insert for rows without a natural key
    pub async fn insert(&self, insert: &InsertStatement) -> Result<Id> {
        let operation = format!("insert {}", insert.table);
        self.guard(&operation, self.store.insert(insert)).await
    }

    pub async fn species(&self, species: &Species) -> Result<Id> {
        self.resolve(species).await
    }

    pub async fn population(&self, name: &str, species: Id) -> Result<Id> {
        self.resolve(&Population {
            name: name.to_string(),
            species,
        })
        .await
    }

    pub async fn chromosome(&self, name: &str, species: Id) -> Result<Id> {
        self.resolve(&Chromosome {
            name: name.to_string(),
            species,
        })
        .await
    }

    /// `chr1..chrN` for a species, in order
    pub async fn chromosomes_for_species(&self, species: Id, count: u32) -> Result<Vec<(String, Id)>> {
        let mut chromosomes = Vec::with_capacity(count as usize);
        for name in crate::manifest::chromosome_names(count) {
            let id = self.chromosome(&name, species).await?;
            chromosomes.push((name, id));
        }
        Ok(chromosomes)
    }

    pub async fn line(&self, name: &str, population: Id) -> Result<Id> {
        self.resolve(&Line {
            name: name.to_string(),
            population,
        })
        .await
    }

    pub async fn genotype_version(&self, version: &GenotypeVersion) -> Result<Id> {
        self.resolve(version).await
    }

    pub async fn genotype(&self, genotype: &Genotype) -> Result<Id> {
        self.resolve(genotype).await
    }

    pub async fn trait_(&self, name: &str) -> Result<Id> {
        self.resolve(&Trait {
            name: name.to_string(),
        })
        .await
    }

    pub async fn phenotype(&self, phenotype: &Phenotype) -> Result<Id> {
        self.resolve(phenotype).await
    }

    pub async fn lookup_value(&self, kind: LookupKind, name: &str) -> Result<Id> {
        let lookup = Lookup::new(kind, name);
        self.resolve_or_create(&lookup.identity(), &lookup.insert()).await
    }

    pub async fn kinship_algorithm(&self, name: &str) -> Result<Id> {
        self.lookup_value(LookupKind::KinshipAlgorithm, name).await
    }

    pub async fn population_structure_algorithm(&self, name: &str) -> Result<Id> {
        self.lookup_value(LookupKind::PopulationStructureAlgorithm, name).await
    }

    pub async fn gwas_algorithm(&self, name: &str) -> Result<Id> {
        self.lookup_value(LookupKind::GwasAlgorithm, name).await
    }

    pub async fn imputation_method(&self, name: &str) -> Result<Id> {
        self.lookup_value(LookupKind::ImputationMethod, name).await
    }

    pub async fn growout_type(&self, name: &str) -> Result<Id> {
        self.lookup_value(LookupKind::GrowoutType, name).await
    }

    pub async fn kinship(&self, algorithm: Id, file_path: &str) -> Result<Id> {
        self.resolve(&Kinship {
            algorithm,
            file_path: file_path.to_string(),
        })
        .await
    }

    pub async fn population_structure(&self, algorithm: Id, file_path: &str) -> Result<Id> {
        self.resolve(&PopulationStructure {
            algorithm,
            file_path: file_path.to_string(),
        })
        .await
    }

    pub async fn gwas_run(&self, run: &GwasRun) -> Result<Id> {
        self.resolve(run).await
    }

    pub async fn gwas_result(&self, result: &GwasResult) -> Result<Id> {
        self.insert(&result.insert()).await
    }

    pub async fn location(&self, location: &Location) -> Result<Id> {
        self.resolve(location).await
    }

    pub async fn growout(&self, growout: &Growout) -> Result<Id> {
        self.resolve(growout).await
    }

    pub async fn find_line(&self, name: &str, population: Id) -> Result<Option<Id>> {
        let line = Line {
            name: name.to_string(),
            population,
        };
        self.find(&line.identity()).await
    }

    pub async fn find_trait(&self, name: &str) -> Result<Id> {
        let trait_ = Trait {
            name: name.to_string(),
        };
        self.require(&trait_.identity()).await
    }

    pub async fn find_chromosome(&self, name: &str, species: Id) -> Result<Id> {
        let chromosome = Chromosome {
            name: name.to_string(),
            species,
        };
        self.require(&chromosome.identity()).await
    }

    pub async fn find_gwas_run(&self, run: &GwasRun) -> Result<Id> {
        self.require(&run.identity()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::models::Variant;
    use crate::store::{EntityTable, MemoryStore};

    fn resolver(store: Arc<dyn IdentityStore>) -> Resolver {
        Resolver::new(store, ImportOptions::default())
    }

    fn maize() -> Species {
        Species {
            shortname: "maize".into(),
            binomial: "Zea mays".into(),
            subspecies: None,
            variety: None,
        }
    }

    fn run(nlines: Option<i64>) -> GwasRun {
        GwasRun {
            trait_id: 1,
            nsnps: Some(31),
            nlines,
            gwas_algorithm: 1,
            genotype_version: 1,
            missing_snp_cutoff_value: 0.85,
            missing_line_cutoff_value: 0.85,
            minor_allele_frequency_cutoff_value: 0.05,
            imputation_method: 1,
            kinship: 1,
            population_structure: 1,
        }
    }

    /// Loses the race: the lookup misses, the insert is suppressed, the second lookup hits
    #[derive(Default)]
    struct RacingStore {
        lookups: AtomicUsize,
        find_after_conflict: bool,
    }

    #[async_trait]
    impl IdentityStore for RacingStore {
        async fn find_id(&self, _query: &IdentityQuery) -> Result<Option<Id>> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok((n > 0 && self.find_after_conflict).then_some(7))
        }

        async fn insert_ignoring_conflict(&self, _insert: &InsertStatement) -> Result<Option<Id>> {
            Ok(None)
        }

        async fn insert(&self, _insert: &InsertStatement) -> Result<Id> {
            Ok(1)
        }

        async fn append_variants(&self, variants: &[Variant]) -> Result<u64> {
            Ok(variants.len() as u64)
        }

        async fn truncate_all(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Never answers
    struct StalledStore;

    #[async_trait]
    impl IdentityStore for StalledStore {
        async fn find_id(&self, _query: &IdentityQuery) -> Result<Option<Id>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn insert_ignoring_conflict(&self, _insert: &InsertStatement) -> Result<Option<Id>> {
            Ok(None)
        }

        async fn insert(&self, _insert: &InsertStatement) -> Result<Id> {
            Ok(1)
        }

        async fn append_variants(&self, _variants: &[Variant]) -> Result<u64> {
            Ok(0)
        }

        async fn truncate_all(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Counts lookups reaching the wrapped store
    struct CountingStore {
        inner: MemoryStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl IdentityStore for CountingStore {
        async fn find_id(&self, query: &IdentityQuery) -> Result<Option<Id>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_id(query).await
        }

        async fn insert_ignoring_conflict(&self, insert: &InsertStatement) -> Result<Option<Id>> {
            self.inner.insert_ignoring_conflict(insert).await
        }

        async fn insert(&self, insert: &InsertStatement) -> Result<Id> {
            self.inner.insert(insert).await
        }

        async fn append_variants(&self, variants: &[Variant]) -> Result<u64> {
            self.inner.append_variants(variants).await
        }

        async fn truncate_all(&self) -> Result<()> {
            self.inner.truncate_all().await
        }
    }

    #[tokio::test]
    async fn test_resolving_twice_yields_one_row() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());

        let first = resolver.species(&maize()).await.unwrap();
        let second = resolver.species(&maize()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.row_count(EntityTable::Species), 1);

        let population = resolver.population("Maize282", first).await.unwrap();
        assert_eq!(resolver.population("Maize282", first).await.unwrap(), population);
        assert_eq!(store.row_count(EntityTable::Population), 1);
    }

    #[tokio::test]
    async fn test_nan_phenotypes_resolve_to_one_row() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());

        let value = |v: &str| Phenotype {
            line: 1,
            trait_id: 1,
            value: v.into(),
        };
        let stored = resolver.phenotype(&value("NaN")).await.unwrap();
        let incoming = resolver.phenotype(&value("nan")).await.unwrap();
        assert_eq!(stored, incoming);
        assert_eq!(store.row_count(EntityTable::Phenotype), 1);
    }

    #[tokio::test]
    async fn test_runs_differing_in_line_count_are_distinct() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());

        let a = resolver.gwas_run(&run(Some(229))).await.unwrap();
        let b = resolver.gwas_run(&run(Some(115))).await.unwrap();
        let c = resolver.gwas_run(&run(None)).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(resolver.gwas_run(&run(None)).await.unwrap(), c);
        assert_eq!(resolver.find_gwas_run(&run(Some(115))).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_suppressed_conflict_is_requeried() {
        let store = Arc::new(RacingStore {
            find_after_conflict: true,
            ..Default::default()
        });
        let resolver = resolver(store.clone());

        let id = resolver.trait_("weight").await.unwrap();
        assert_eq!(id, 7);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_conflict_is_an_error() {
        let resolver = resolver(Arc::new(RacingStore::default()));

        let err = resolver.trait_("weight").await.unwrap_err();
        match err {
            IngestError::IdentityResolution { entity, key } => {
                assert_eq!(entity, "trait");
                assert!(key.contains("weight"));
            },
            other => panic!("expected identity resolution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_reference_is_an_error() {
        let resolver = resolver(Arc::new(MemoryStore::new()));
        assert!(matches!(
            resolver.find_chromosome("chr1", 1).await,
            Err(IngestError::IdentityResolution { entity: "chromosome", .. })
        ));
        assert_eq!(resolver.find_line("B73", 1).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_statement_times_out() {
        let resolver = resolver(Arc::new(StalledStore));

        let err = resolver.trait_("weight").await.unwrap_err();
        match err {
            IngestError::Timeout { operation, after } => {
                assert_eq!(operation, "lookup trait");
                assert_eq!(after, Duration::from_secs(60));
            },
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_pending_statement() {
        let resolver = resolver(Arc::new(StalledStore));
        let cancel = resolver.cancellation().clone();

        let (result, _) = tokio::join!(resolver.trait_("weight"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        assert!(matches!(result, Err(IngestError::Cancelled)));

        // once cancelled, nothing else reaches the store
        assert!(matches!(
            resolver.trait_("height").await,
            Err(IngestError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_identity_cache_skips_repeat_lookups() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            lookups: AtomicUsize::new(0),
        });
        let options = ImportOptions {
            identity_cache: true,
            ..ImportOptions::default()
        };
        let resolver = Resolver::new(store.clone(), options);

        let first = resolver.trait_("weight").await.unwrap();
        let second = resolver.trait_("weight").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_cache_keeps_similar_species_apart() {
        let options = ImportOptions {
            identity_cache: true,
            ..ImportOptions::default()
        };
        let resolver = Resolver::new(Arc::new(MemoryStore::new()), options);
        let first = Species {
            shortname: "maize".into(),
            binomial: "Zea mays', binomial='x".into(),
            subspecies: None,
            variety: None,
        };
        let second = Species {
            shortname: "maize', binomial='Zea mays".into(),
            binomial: "x".into(),
            subspecies: None,
            variety: None,
        };
        assert_eq!(first.identity().to_string(), second.identity().to_string());

        let a = resolver.species(&first).await.unwrap();
        let b = resolver.species(&second).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_chromosomes_for_species_in_order() {
        let resolver = resolver(Arc::new(MemoryStore::new()));
        let chromosomes = resolver.chromosomes_for_species(1, 3).await.unwrap();
        let names: Vec<&str> = chromosomes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["chr1", "chr2", "chr3"]);
        assert_eq!(resolver.find_chromosome("chr2", 1).await.unwrap(), chromosomes[1].1);
    }
}
