//! Users, directories and engines for tests.

use std::sync::Arc;

use crate::artifacts::{ArtifactUpload, InMemoryArtifactStore};
use crate::config::EngineConfig;
use crate::core::AreaId;
use crate::engine::{CreateOrder, WorkflowEngine};
use crate::events::CollectingEventSink;
use crate::identity::{Directory, DirectoryUser};
use crate::production::{ComponentSpec, TechProcess};
use crate::retry::{JitterStrategy, RetryConfig};
use crate::store::{InMemoryStore, WorkflowStore};

/// Entry stage owner.
pub const MANAGER: &str = "manager";
/// Technical-instruction developer.
pub const TECHNOLOGIST: &str = "technologist";
/// Specification developer.
pub const DESIGNER: &str = "designer";
/// Scheme developer.
pub const SCHEMATIC: &str = "schematic";
/// Process-document developer.
pub const PROCESS_ENGINEER: &str = "process_engineer";
/// Gate owner.
pub const CHIEF: &str = "chief";
/// Supply stage owner.
pub const SUPPLIER: &str = "supplier";
/// Storage stage owner.
pub const STOREKEEPER: &str = "storekeeper";
/// Administrator.
pub const ADMIN: &str = "admin";
/// Operator in area 1.
pub const TURNER: &str = "turner";
/// Operator in area 2.
pub const MILLER: &str = "miller";
/// Operator in area 3.
pub const WELDER: &str = "welder";

/// A directory holding one user per role of the standard pipeline, three
/// shop-floor operators and an administrator.
#[must_use]
pub fn standard_directory() -> Directory {
    Directory::new()
        .with_user(DirectoryUser::new(MANAGER, "Anna Manager").with_role("manager"))
        .with_user(DirectoryUser::new(TECHNOLOGIST, "Boris Technologist").with_role("technologist"))
        .with_user(DirectoryUser::new(DESIGNER, "Clara Designer").with_role("designer"))
        .with_user(DirectoryUser::new(SCHEMATIC, "Denis Schematic").with_role("schematic"))
        .with_user(
            DirectoryUser::new(PROCESS_ENGINEER, "Elena Process").with_role("process_engineer"),
        )
        .with_user(DirectoryUser::new(CHIEF, "Fedor Chief").with_role("chief_engineer"))
        .with_user(DirectoryUser::new(SUPPLIER, "Galina Supplier").with_role("supplier"))
        .with_user(DirectoryUser::new(STOREKEEPER, "Igor Storekeeper").with_role("storekeeper"))
        .with_user(DirectoryUser::new(TURNER, "Kira Turner").with_area(1))
        .with_user(DirectoryUser::new(MILLER, "Lev Miller").with_area(2))
        .with_user(DirectoryUser::new(WELDER, "Maria Welder").with_area(3))
        .with_user(DirectoryUser::new(ADMIN, "Root Admin").admin())
}

/// A retry policy with short delays.
#[must_use]
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(64)
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
        .with_jitter(JitterStrategy::Full)
}

/// An engine wired to in-memory backends, with handles to each of them.
pub struct TestEngine {
    /// The engine.
    pub engine: WorkflowEngine,
    /// Its record store.
    pub store: Arc<InMemoryStore>,
    /// Its artifact store.
    pub artifacts: Arc<InMemoryArtifactStore>,
    /// Every event it emitted.
    pub events: Arc<CollectingEventSink>,
}

impl TestEngine {
    /// Builds an engine over the standard graph and directory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// Builds an engine over `store`.
    #[must_use]
    pub fn with_store(store: Arc<InMemoryStore>) -> Self {
        Self::wired(store.clone(), store)
    }

    /// Builds an engine whose records go to `backend` while `store` stays
    /// reachable for inspection.
    #[must_use]
    pub fn wired(store: Arc<InMemoryStore>, backend: Arc<dyn WorkflowStore>) -> Self {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let events = Arc::new(CollectingEventSink::new());
        let engine = WorkflowEngine::new(backend, Arc::new(standard_directory()), artifacts.clone())
            .with_config(EngineConfig::new().with_retry(fast_retry()))
            .with_event_sink(events.clone());
        Self {
            engine,
            store,
            artifacts,
            events,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A create request with one specification file.
#[must_use]
pub fn order_request(kks: &str) -> CreateOrder {
    CreateOrder::new(kks, format!("Order {kks}"))
        .with_file(ArtifactUpload::new("request.pdf", b"%PDF-1.7".to_vec()))
}

/// A pump assembly: a housing turned then milled, holding a shaft that is
/// turned and a seal with no process.
#[must_use]
pub fn pump_components() -> Vec<ComponentSpec> {
    let housing = TechProcess::new(vec![AreaId(1), AreaId(2)]);
    let shaft = TechProcess::new(vec![AreaId(1)]);
    vec![ComponentSpec::new("PUMP-01.000", housing)
        .with_child(ComponentSpec::new("PUMP-01.100", shaft).with_quantity(2, 2))
        .with_child(ComponentSpec::new("PUMP-01.200", TechProcess::default()))]
}
