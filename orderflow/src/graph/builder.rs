//! Stage graph builder with validation.

use super::{StageDef, StageGraph};
use crate::core::StageId;
use crate::errors::{CycleDetectedError, GraphErrorInfo, GraphValidationError};
use std::collections::{HashMap, HashSet};

/// Builder for creating validated stage graphs.
#[derive(Debug, Clone, Default)]
pub struct StageGraphBuilder {
    stages: Vec<StageDef>,
}

impl StageGraphBuilder {
    /// Creates a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage definition.
    #[must_use]
    pub fn stage(mut self, def: StageDef) -> Self {
        self.stages.push(def);
        self
    }

    /// Adds several stage definitions.
    #[must_use]
    pub fn stages(mut self, defs: impl IntoIterator<Item = StageDef>) -> Self {
        self.stages.extend(defs);
        self
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the definitions and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty, has duplicate ids or names,
    /// references an unknown parent, contains a cycle, orders a child before
    /// its parent, or declares more than one gate or a fan-out gate.
    pub fn build(self) -> Result<StageGraph, GraphValidationError> {
        validate(&self.stages)?;
        Ok(StageGraph::assemble(self.stages))
    }
}

/// Checks every structural invariant of a stage forest.
pub(crate) fn validate(stages: &[StageDef]) -> Result<(), GraphValidationError> {
    if stages.is_empty() {
        return Err(GraphValidationError::new("Stage graph has no stages").with_error_info(
            GraphErrorInfo::new("GRAPH-001-EMPTY", "Cannot build an empty stage graph")
                .with_fix_hint("Declare at least one stage."),
        ));
    }

    let mut by_id: HashMap<StageId, &StageDef> = HashMap::new();
    let mut names = HashSet::new();
    for def in stages {
        if by_id.insert(def.id, def).is_some() || !names.insert(def.name.as_str()) {
            return Err(GraphValidationError::new(format!(
                "Duplicate stage '{}' (id {})",
                def.name, def.id
            ))
            .with_stages(vec![def.name.clone()])
            .with_error_info(
                GraphErrorInfo::new("GRAPH-002-DUPLICATE", "Stage ids and names must be unique")
                    .with_context_entry("id", def.id.to_string()),
            ));
        }
    }

    for def in stages {
        if let Some(parent) = def.parent {
            if !by_id.contains_key(&parent) {
                return Err(GraphValidationError::new(format!(
                    "Stage '{}' references unknown parent {}",
                    def.name, parent
                ))
                .with_stages(vec![def.name.clone()])
                .with_error_info(
                    GraphErrorInfo::new(
                        "GRAPH-003-MISSING_PARENT",
                        format!("Parent {parent} not found"),
                    )
                    .with_fix_hint("Declare the parent stage in the same graph."),
                ));
            }
        }
    }

    detect_cycles(&by_id)?;

    for def in stages {
        if let Some(parent) = def.parent.and_then(|p| by_id.get(&p)) {
            if def.id <= parent.id {
                return Err(GraphValidationError::new(format!(
                    "Stage '{}' (id {}) must come after its parent '{}' (id {})",
                    def.name, def.id, parent.name, parent.id
                ))
                .with_stages(vec![parent.name.clone(), def.name.clone()])
                .with_error_info(
                    GraphErrorInfo::new("GRAPH-005-ORDER", "Child ordinal precedes parent")
                        .with_fix_hint("Give every child stage a higher id than its parent."),
                ));
            }
        }
    }

    let gates: Vec<&StageDef> = stages.iter().filter(|d| d.gate).collect();
    if gates.len() > 1 {
        return Err(GraphValidationError::new("More than one gate stage declared")
            .with_stages(gates.iter().map(|d| d.name.clone()).collect())
            .with_error_info(GraphErrorInfo::new("GRAPH-006-GATE", "Multiple gates")));
    }
    if let Some(gate) = gates.first() {
        if stages.iter().any(|d| d.parent == Some(gate.id)) {
            return Err(GraphValidationError::new(format!(
                "Gate stage '{}' cannot have children",
                gate.name
            ))
            .with_stages(vec![gate.name.clone()])
            .with_error_info(
                GraphErrorInfo::new("GRAPH-006-GATE", "Gate is a fan-out parent")
                    .with_fix_hint("Make the gate a leaf stage."),
            ));
        }
    }

    Ok(())
}

/// Walks every parent chain and reports the first loop.
fn detect_cycles(by_id: &HashMap<StageId, &StageDef>) -> Result<(), CycleDetectedError> {
    let mut cleared: HashSet<StageId> = HashSet::new();

    let mut ids: Vec<StageId> = by_id.keys().copied().collect();
    ids.sort_unstable();

    for start in ids {
        let mut path: Vec<StageId> = Vec::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if cleared.contains(&id) {
                break;
            }
            if let Some(pos) = path.iter().position(|p| *p == id) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|p| by_id.get(p).map_or_else(|| p.to_string(), |d| d.name.clone()))
                    .collect();
                cycle.push(by_id.get(&id).map_or_else(|| id.to_string(), |d| d.name.clone()));
                return Err(CycleDetectedError::new(cycle));
            }
            path.push(id);
            current = by_id.get(&id).and_then(|d| d.parent);
        }

        cleared.extend(path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = StageGraphBuilder::new();
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_build_success() {
        let graph = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Entry").with_role("manager"))
            .stage(StageDef::new(2, "Review").with_role("chief").gate())
            .build()
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.gate(), Some(StageId(2)));
    }

    #[test]
    fn test_builder_empty_build() {
        let err = StageGraphBuilder::new().build().unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-001-EMPTY"));
    }

    #[test]
    fn test_builder_duplicate_id() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Entry"))
            .stage(StageDef::new(1, "Other"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-002-DUPLICATE"));
    }

    #[test]
    fn test_builder_duplicate_name() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Entry"))
            .stage(StageDef::new(2, "Entry"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-002-DUPLICATE"));
    }

    #[test]
    fn test_builder_missing_parent() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Entry"))
            .stage(StageDef::new(2, "Child").with_parent(9))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-003-MISSING_PARENT"));
    }

    #[test]
    fn test_builder_cycle_detection() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "A").with_parent(3))
            .stage(StageDef::new(2, "B").with_parent(1))
            .stage(StageDef::new(3, "C").with_parent(2))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), Some("GRAPH-004-CYCLE"));
        assert_eq!(err.stages.first(), err.stages.last());
    }

    #[test]
    fn test_builder_self_parent() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "A").with_parent(1))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-004-CYCLE"));
    }

    #[test]
    fn test_builder_child_before_parent() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Child").with_parent(2))
            .stage(StageDef::new(2, "Parent"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-005-ORDER"));
    }

    #[test]
    fn test_builder_two_gates() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "A").gate())
            .stage(StageDef::new(2, "B").gate())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-006-GATE"));
    }

    #[test]
    fn test_builder_fan_out_gate() {
        let err = StageGraphBuilder::new()
            .stage(StageDef::new(1, "Gate").gate())
            .stage(StageDef::new(2, "Sub").with_parent(1))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-006-GATE"));
    }
}
