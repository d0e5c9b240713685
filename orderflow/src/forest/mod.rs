//! Gated forests: upward completion through parent/child gates.
//!
//! Both engines in this crate share one rule. A node's parent is *gated* on
//! the node and its siblings: once every child of the parent is complete, the
//! parent's unlock action runs. For order stages the unlock action completes
//! the fan-out parent; for components it makes the parent assembly's first
//! task available. [`propagate`] drives the rule upward from a node that just
//! completed until a parent stays blocked or is not itself complete after
//! unlocking.
//!
//! Implementations answer structural questions by id; nothing here holds
//! references into the records.

use crate::errors::CycleDetectedError;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// A forest of nodes whose parents are gated on their children.
pub trait GatedForest {
    /// Node identifier.
    type Node: Copy + Eq + Hash + fmt::Display;

    /// Returns the parent of `node`.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Returns the children of `node`.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Completion predicate.
    fn is_complete(&self, node: Self::Node) -> bool;

    /// Unlock action, run on a parent once all of its children are complete.
    ///
    /// Returns false if the parent was already unlocked; the action must then
    /// leave the forest unchanged.
    fn unlock(&mut self, node: Self::Node) -> bool;
}

/// Outcome of re-evaluating one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// All children complete; the unlock action changed the parent.
    Unlocked,
    /// All children complete; the parent had already been unlocked.
    AlreadyUnlocked,
    /// At least one child is still incomplete.
    Blocked,
}

impl Evaluation {
    /// Returns true if every child of the parent is complete.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// Re-evaluates a single parent. Idempotent.
pub fn evaluate<F: GatedForest>(forest: &mut F, parent: F::Node) -> Evaluation {
    let children = forest.children(parent);
    if children.is_empty() || !children.iter().all(|c| forest.is_complete(*c)) {
        return Evaluation::Blocked;
    }

    if forest.unlock(parent) {
        Evaluation::Unlocked
    } else {
        Evaluation::AlreadyUnlocked
    }
}

/// Drives the gate rule upward from `from` to a fixed point.
///
/// Returns the parents whose unlock action fired, nearest first.
///
/// # Errors
///
/// Returns [`CycleDetectedError`] if the parent chain revisits a node.
pub fn propagate<F: GatedForest>(
    forest: &mut F,
    from: F::Node,
) -> Result<Vec<F::Node>, CycleDetectedError> {
    let mut unlocked = Vec::new();
    let mut path = vec![from];
    let mut seen: HashSet<F::Node> = HashSet::from([from]);
    let mut current = from;

    while let Some(parent) = forest.parent(current) {
        if !seen.insert(parent) {
            let mut cycle: Vec<String> = path.iter().map(ToString::to_string).collect();
            cycle.push(parent.to_string());
            return Err(CycleDetectedError::new(cycle));
        }
        path.push(parent);

        match evaluate(forest, parent) {
            Evaluation::Blocked => break,
            Evaluation::Unlocked => unlocked.push(parent),
            Evaluation::AlreadyUnlocked => {}
        }

        if !forest.is_complete(parent) {
            break;
        }
        current = parent;
    }

    Ok(unlocked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Parent completes when its children do.
    #[derive(Debug, Default)]
    struct Tree {
        parents: HashMap<u32, u32>,
        complete: HashSet<u32>,
        unlock_calls: usize,
    }

    impl Tree {
        fn new(edges: &[(u32, u32)]) -> Self {
            Self {
                parents: edges.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn complete_leaf(&mut self, node: u32) -> Vec<u32> {
            self.complete.insert(node);
            propagate(self, node).unwrap()
        }
    }

    impl GatedForest for Tree {
        type Node = u32;

        fn parent(&self, node: u32) -> Option<u32> {
            self.parents.get(&node).copied()
        }

        fn children(&self, node: u32) -> Vec<u32> {
            let mut children: Vec<u32> = self
                .parents
                .iter()
                .filter(|(_, p)| **p == node)
                .map(|(c, _)| *c)
                .collect();
            children.sort_unstable();
            children
        }

        fn is_complete(&self, node: u32) -> bool {
            self.complete.contains(&node)
        }

        fn unlock(&mut self, node: u32) -> bool {
            self.unlock_calls += 1;
            self.complete.insert(node)
        }
    }

    fn permutations(items: &[u32]) -> Vec<Vec<u32>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, first) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *first);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_parent_completes_for_every_completion_order() {
        for order in permutations(&[2, 3, 4]) {
            let mut tree = Tree::new(&[(2, 1), (3, 1), (4, 1)]);

            for (i, leaf) in order.iter().enumerate() {
                let unlocked = tree.complete_leaf(*leaf);
                if i + 1 < order.len() {
                    assert!(unlocked.is_empty(), "order {order:?}");
                    assert!(!tree.is_complete(1), "order {order:?}");
                } else {
                    assert_eq!(unlocked, vec![1], "order {order:?}");
                    assert!(tree.is_complete(1));
                }
            }
        }
    }

    #[test]
    fn test_chained_fan_out_reaches_fixed_point() {
        // 1 <- {2, 3}, 3 <- {4, 5}
        let mut tree = Tree::new(&[(2, 1), (3, 1), (4, 3), (5, 3)]);

        assert!(tree.complete_leaf(2).is_empty());
        assert!(tree.complete_leaf(4).is_empty());
        assert_eq!(tree.complete_leaf(5), vec![3, 1]);
        assert!(tree.is_complete(3));
        assert!(tree.is_complete(1));
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let mut tree = Tree::new(&[(2, 1)]);
        tree.complete.insert(2);

        assert_eq!(evaluate(&mut tree, 1), Evaluation::Unlocked);
        let after_first = tree.complete.clone();

        assert_eq!(evaluate(&mut tree, 1), Evaluation::AlreadyUnlocked);
        assert_eq!(tree.complete, after_first);
        assert!(propagate(&mut tree, 2).unwrap().is_empty());
    }

    #[test]
    fn test_childless_node_is_blocked() {
        let mut tree = Tree::new(&[]);
        assert_eq!(evaluate(&mut tree, 1), Evaluation::Blocked);
        assert!(!Evaluation::Blocked.is_satisfied());
        assert_eq!(tree.unlock_calls, 0);
    }

    #[test]
    fn test_root_node_has_nothing_to_propagate() {
        let mut tree = Tree::new(&[(2, 1)]);
        tree.complete.insert(1);
        assert!(propagate(&mut tree, 1).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut tree = Tree::new(&[(1, 2), (2, 1)]);
        tree.complete.insert(1);
        tree.complete.insert(2);

        let err = propagate(&mut tree, 1).unwrap_err();
        assert_eq!(err.cycle_path, vec!["1", "2", "1"]);
    }
}
