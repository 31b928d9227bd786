pub mod catalog;
pub mod config;
pub mod errors;
pub mod facts;
pub mod fetch;
pub mod gateway;
pub mod ids;
pub mod interval;
pub mod models;
pub mod sparql;
pub mod sync;
pub mod upsert;
pub mod vocab;

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::errors::Result;
use crate::gateway::{GraphStore, MemoryGraphStore, SparqlGateway};
use crate::sync::FactSynchronizer;
use crate::upsert::UpsertCoordinator;
use std::sync::Arc;

/// The main entry point for the `factstore` library.
///
/// `FactStore` wires together everything needed to push derived facts into a
/// triple store:
/// - a graph store (`SparqlGateway` against a SPARQL endpoint, or
///   `MemoryGraphStore` for dry runs),
/// - an `UpsertCoordinator` serializing writes per identifier,
/// - a SQLite `Catalog` holding task logs and window checkpoints,
/// - a `FactSynchronizer` to which fetchers are registered.
///
/// # Example
///
/// ```rust,no_run
/// use factstore::{FactStore, config::StoreConfig};
/// use tempfile::tempdir;
///
/// #[tokio::main]
/// async fn main() {
///     let dir = tempdir().unwrap();
///     let config = StoreConfig::new(dir.path());
///     let store = FactStore::in_memory(config).await.unwrap();
///
///     // Register fetchers on store.synchronizer, then sync.
/// }
/// ```
pub struct FactStore {
    pub config: StoreConfig,
    pub catalog: Arc<Catalog>,
    pub graph: Arc<dyn GraphStore>,
    pub coordinator: Arc<UpsertCoordinator>,
    pub synchronizer: FactSynchronizer,
}

impl FactStore {
    /// Connects to the SPARQL endpoint named in `config`.
    pub async fn new(config: StoreConfig) -> Result<Self> {
        let gateway = SparqlGateway::new(config.clone())?;
        Self::with_graph(config, Arc::new(gateway)).await
    }

    /// Keeps facts in process; nothing leaves the machine.
    pub async fn in_memory(config: StoreConfig) -> Result<Self> {
        Self::with_graph(config, Arc::new(MemoryGraphStore::new())).await
    }

    pub async fn with_graph(config: StoreConfig, graph: Arc<dyn GraphStore>) -> Result<Self> {
        if let Some(parent) = config.catalog_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let catalog = Arc::new(Catalog::new(&config)?);
        catalog.initialize_schema()?;

        let coordinator = Arc::new(UpsertCoordinator::new(Arc::clone(&graph), config.batch_size));
        let synchronizer = FactSynchronizer::new(Arc::clone(&catalog), Arc::clone(&coordinator));

        Ok(Self {
            config,
            catalog,
            graph,
            coordinator,
            synchronizer,
        })
    }
}
