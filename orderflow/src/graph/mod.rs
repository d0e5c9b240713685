//! The static stage graph every order follows.
//!
//! A [`StageGraph`] is an immutable forest of [`StageDef`]s ordered by id.
//! Stages sharing a parent fan out from it: the parent is finished once all of
//! them are. One leaf stage may be marked as the gate that can reject the order.

mod builder;
mod stage;

pub use builder::StageGraphBuilder;
pub use stage::StageDef;

use crate::core::StageId;
use crate::errors::GraphValidationError;
use std::collections::HashMap;

/// Names of the stages in [`StageGraph::standard`].
pub mod standard {
    /// Order intake.
    pub const ENTRY: &str = "Entry";
    /// Technical-information development.
    pub const TI_DEV: &str = "TIDev";
    /// Design documentation (fan-out parent of `SpecDev` and `SchemeDev`).
    pub const DD_DEV: &str = "DDDev";
    /// Specification development.
    pub const SPEC_DEV: &str = "SpecDev";
    /// Scheme development.
    pub const SCHEME_DEV: &str = "SchemeDev";
    /// Process documentation development.
    pub const IDPPS_DEV: &str = "IDPPSDev";
    /// Review gate.
    pub const APPROVAL: &str = "Approval";
    /// Procurement.
    pub const SUPPLY: &str = "Supply";
    /// Warehousing.
    pub const STORAGE: &str = "Storage";
}

/// An immutable, validated forest of stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Stage definitions sorted by id.
    stages: Vec<StageDef>,
    /// Position of each id in `stages`.
    index: HashMap<StageId, usize>,
    /// Children of each fan-out parent, sorted by id.
    children: HashMap<StageId, Vec<StageId>>,
    /// The gate stage, if the graph has one.
    gate: Option<StageId>,
}

impl StageGraph {
    /// Validates the definitions and creates a graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the definitions do not form a valid stage forest.
    pub fn new(stages: Vec<StageDef>) -> Result<Self, GraphValidationError> {
        builder::validate(&stages)?;
        Ok(Self::assemble(stages))
    }

    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> StageGraphBuilder {
        StageGraphBuilder::new()
    }

    /// The stock order pipeline:
    /// `Entry, TIDev, DDDev{SpecDev, SchemeDev}, IDPPSDev, Approval(gate), Supply, Storage`.
    #[must_use]
    pub fn standard() -> Self {
        Self::assemble(Self::standard_defs())
    }

    /// The stage definitions behind [`StageGraph::standard`].
    #[must_use]
    pub fn standard_defs() -> Vec<StageDef> {
        vec![
            StageDef::new(1, standard::ENTRY).with_role("manager"),
            StageDef::new(2, standard::TI_DEV).with_role("technologist"),
            StageDef::new(3, standard::DD_DEV).optional(),
            StageDef::new(4, standard::SPEC_DEV).with_parent(3).with_role("designer"),
            StageDef::new(5, standard::SCHEME_DEV).with_parent(3).with_role("schematic"),
            StageDef::new(6, standard::IDPPS_DEV).with_role("process_engineer"),
            StageDef::new(7, standard::APPROVAL).with_role("chief_engineer").gate(),
            StageDef::new(8, standard::SUPPLY).with_role("supplier"),
            StageDef::new(9, standard::STORAGE).with_role("storekeeper"),
        ]
    }

    /// Indexes already validated definitions.
    pub(crate) fn assemble(mut stages: Vec<StageDef>) -> Self {
        stages.sort_by_key(|s| s.id);

        let index = stages.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

        let mut children: HashMap<StageId, Vec<StageId>> = HashMap::new();
        for stage in &stages {
            if let Some(parent) = stage.parent {
                children.entry(parent).or_default().push(stage.id);
            }
        }

        let gate = stages.iter().find(|s| s.gate).map(|s| s.id);

        Self {
            stages,
            index,
            children,
            gate,
        }
    }

    /// Returns all stages in ordinal order.
    #[must_use]
    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks a stage up by id.
    #[must_use]
    pub fn get(&self, id: StageId) -> Option<&StageDef> {
        self.index.get(&id).map(|&i| &self.stages[i])
    }

    /// Looks a stage up by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&StageDef> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns true if the graph defines `id`.
    #[must_use]
    pub fn contains(&self, id: StageId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the name of a stage, or its id when unknown.
    #[must_use]
    pub fn name_of(&self, id: StageId) -> String {
        self.get(id).map_or_else(|| id.to_string(), |s| s.name.clone())
    }

    /// Returns the children of a stage in ordinal order.
    #[must_use]
    pub fn children(&self, id: StageId) -> &[StageId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Returns the parent of a stage.
    #[must_use]
    pub fn parent(&self, id: StageId) -> Option<StageId> {
        self.get(id).and_then(|s| s.parent)
    }

    /// Returns true if the stage has children.
    #[must_use]
    pub fn is_fan_out(&self, id: StageId) -> bool {
        self.children.contains_key(&id)
    }

    /// Returns true if `id` is the gate stage.
    #[must_use]
    pub fn is_gate(&self, id: StageId) -> bool {
        self.gate == Some(id)
    }

    /// Returns the gate stage, if any.
    #[must_use]
    pub fn gate(&self) -> Option<StageId> {
        self.gate
    }

    /// Returns the top-level stages in ordinal order.
    pub fn roots(&self) -> impl Iterator<Item = &StageDef> + '_ {
        self.stages.iter().filter(|s| s.parent.is_none())
    }

    /// Returns the entry stage: the first top-level stage.
    #[must_use]
    pub fn entry(&self) -> Option<&StageDef> {
        self.roots().next()
    }

    /// Returns an id to name map of every stage.
    #[must_use]
    pub fn names(&self) -> Vec<(StageId, String)> {
        self.stages.iter().map(|s| (s.id, s.name.clone())).collect()
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}
