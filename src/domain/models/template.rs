//! Workflow template domain model and step graph.
//!
//! A template owns an arena of steps indexed by id. Navigation pointers are
//! plain ids into that arena, so loop-back cycles need no special handling
//! and reachability is a breadth-first walk from the entry step.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use uuid::Uuid;

use super::step::{AutoAction, Step, KNOWN_ACTION_TYPES};
use crate::domain::errors::{DomainError, DomainResult};

/// Sequence number of a template's entry step.
pub const ENTRY_SEQUENCE: u32 = 1;

/// Non-fatal problem found while validating an authored graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphWarning {
    /// No step carries sequence number 1.
    MissingEntryStep,
    /// No edge points at this step and it is not the entry.
    OrphanStep {
        /// Sequence number of the step
        sequence_number: u32,
        /// Name of the step
        name: String,
    },
    /// Edges point at this step, but none of them can be reached from the entry.
    UnreachableStep {
        /// Sequence number of the step
        sequence_number: u32,
        /// Name of the step
        name: String,
    },
    /// A backward edge leaves a step that is not flagged `can_loop_back`.
    UnflaggedLoopBack {
        /// Sequence number the edge leaves
        from: u32,
        /// Sequence number the edge enters
        to: u32,
    },
    /// An auto action the engine cannot dispatch natively.
    OpaqueAction {
        /// Sequence number of the step carrying the action
        sequence_number: u32,
        /// Type name as authored
        action_type: String,
    },
    /// The step routes nowhere but is not flagged final, so dossiers stall there.
    DeadEnd {
        /// Sequence number of the step
        sequence_number: u32,
        /// Name of the step
        name: String,
    },
    /// Nothing in the template is protected from rollback.
    NoFinalStep,
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntryStep => write!(f, "template has no entry step (sequence 1)"),
            Self::OrphanStep {
                sequence_number,
                name,
            } => write!(f, "step {sequence_number} ({name}) has no predecessor"),
            Self::UnreachableStep {
                sequence_number,
                name,
            } => write!(
                f,
                "step {sequence_number} ({name}) cannot be reached from the entry step"
            ),
            Self::UnflaggedLoopBack { from, to } => write!(
                f,
                "step {from} routes back to step {to} without can_loop_back"
            ),
            Self::OpaqueAction {
                sequence_number,
                action_type,
            } => {
                if KNOWN_ACTION_TYPES.contains(&action_type.as_str()) {
                    write!(
                        f,
                        "step {sequence_number} has malformed parameters for {action_type}"
                    )
                } else {
                    write!(
                        f,
                        "step {sequence_number} uses unknown action type {action_type}"
                    )
                }
            }
            Self::DeadEnd {
                sequence_number,
                name,
            } => write!(
                f,
                "step {sequence_number} ({name}) has no successor and is not final"
            ),
            Self::NoFinalStep => write!(f, "template declares no final step"),
        }
    }
}

/// A versioned workflow definition for one business domain.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTemplate {
    /// Unique identifier.
    pub id: Uuid,
    /// Business domain the template drives.
    pub domain_code: String,
    /// Display name.
    pub name: String,
    /// Version within the domain; unique per domain.
    pub version: u32,
    /// Whether new and existing dossiers of the domain follow this version.
    pub active: bool,
    /// When the template was created.
    pub created_at: DateTime<Utc>,
    steps: Vec<Step>,
    #[serde(skip)]
    index: HashMap<Uuid, usize>,
}

impl WorkflowTemplate {
    /// Empty, inactive template.
    pub fn new(domain_code: impl Into<String>, name: impl Into<String>, version: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain_code: domain_code.into(),
            name: name.into(),
            version,
            active: false,
            created_at: Utc::now(),
            steps: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Replace the step arena. Steps are re-homed to this template and kept in
    /// sequence order.
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.set_steps(steps);
        self
    }

    /// In-place form of [`WorkflowTemplate::with_steps`].
    pub fn set_steps(&mut self, mut steps: Vec<Step>) {
        for step in &mut steps {
            step.template_id = self.id;
        }
        steps.sort_by_key(|s| s.sequence_number);
        self.index = steps.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        self.steps = steps;
    }

    /// Steps in sequence-number order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step by id.
    pub fn step(&self, id: Uuid) -> Option<&Step> {
        self.index.get(&id).map(|&i| &self.steps[i])
    }

    /// Step by sequence number.
    pub fn step_by_sequence(&self, sequence_number: u32) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.sequence_number == sequence_number)
    }

    /// Whether the step belongs to this template.
    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    /// The step with sequence number 1.
    pub fn entry_step(&self) -> Option<&Step> {
        self.step_by_sequence(ENTRY_SEQUENCE)
    }

    /// Whether `id` is the entry step.
    pub fn is_entry(&self, id: Uuid) -> bool {
        self.entry_step().is_some_and(|s| s.id == id)
    }

    /// Sequence numbers of the steps flagged final.
    pub fn final_step_numbers(&self) -> Vec<u32> {
        self.steps
            .iter()
            .filter(|s| s.is_final)
            .map(|s| s.sequence_number)
            .collect()
    }

    /// Edges the engine follows out of `id`.
    pub fn successors(&self, id: Uuid) -> Vec<Uuid> {
        self.step(id).map(Step::successors).unwrap_or_default()
    }

    /// Steps with an edge into `id`.
    pub fn predecessors(&self, id: Uuid) -> Vec<Uuid> {
        self.steps
            .iter()
            .filter(|s| s.successors().contains(&id))
            .map(|s| s.id)
            .collect()
    }

    /// Whether the edge `from -> to` points backward in authoring order.
    pub fn is_loop_back_edge(&self, from: Uuid, to: Uuid) -> bool {
        match (self.step(from), self.step(to)) {
            (Some(from), Some(to)) => to.sequence_number <= from.sequence_number,
            _ => false,
        }
    }

    /// Step ids reachable from `start`, `start` included.
    pub fn reachable_from(&self, start: Uuid) -> HashSet<Uuid> {
        let mut seen = HashSet::new();
        if !self.contains(start) {
            return seen;
        }

        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            for next in self.successors(id) {
                if self.contains(next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Step ids reachable from the entry step, entry included.
    pub fn reachable_from_entry(&self) -> HashSet<Uuid> {
        self.entry_step()
            .map(|entry| self.reachable_from(entry.id))
            .unwrap_or_default()
    }

    /// Whether `from -> to` lies on a cycle: `to` can route back to `from`.
    pub fn edge_in_cycle(&self, from: Uuid, to: Uuid) -> bool {
        self.reachable_from(to).contains(&from)
    }

    /// Validate the authored graph.
    ///
    /// Structural defects that would break routing are errors; everything an
    /// author may legitimately leave in a draft is returned as a warning.
    pub fn validate(&self) -> DomainResult<Vec<GraphWarning>> {
        let mut seen_sequences = HashSet::new();
        for step in &self.steps {
            if !seen_sequences.insert(step.sequence_number) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate sequence number {} in template {}",
                    step.sequence_number, self.name
                )));
            }
            if step.requires_decision && step.next_step.is_some() {
                return Err(DomainError::ValidationFailed(format!(
                    "decision step {} ({}) must not have a next_step",
                    step.sequence_number, step.name
                )));
            }
            for target in step.pointer_targets() {
                if !self.contains(target) {
                    return Err(DomainError::ValidationFailed(format!(
                        "step {} ({}) points to {} which is not in template {}",
                        step.sequence_number, step.name, target, self.name
                    )));
                }
            }
        }

        let mut warnings = Vec::new();
        let entry = self.entry_step();
        if entry.is_none() {
            warnings.push(GraphWarning::MissingEntryStep);
        }

        let reachable = self.reachable_from_entry();
        for step in &self.steps {
            if reachable.contains(&step.id) {
                continue;
            }
            let is_entry = entry.is_some_and(|e| e.id == step.id);
            if !is_entry && self.predecessors(step.id).is_empty() {
                warnings.push(GraphWarning::OrphanStep {
                    sequence_number: step.sequence_number,
                    name: step.name.clone(),
                });
            } else {
                warnings.push(GraphWarning::UnreachableStep {
                    sequence_number: step.sequence_number,
                    name: step.name.clone(),
                });
            }
        }

        for step in &self.steps {
            if !step.can_loop_back {
                for target in step.successors() {
                    if self.is_loop_back_edge(step.id, target) {
                        let to = self.step(target).map_or(0, |s| s.sequence_number);
                        warnings.push(GraphWarning::UnflaggedLoopBack {
                            from: step.sequence_number,
                            to,
                        });
                    }
                }
            }
            if step.is_terminal() && !step.is_final {
                warnings.push(GraphWarning::DeadEnd {
                    sequence_number: step.sequence_number,
                    name: step.name.clone(),
                });
            }
            for action in &step.auto_actions {
                if let AutoAction::Opaque(opaque) = action {
                    warnings.push(GraphWarning::OpaqueAction {
                        sequence_number: step.sequence_number,
                        action_type: opaque.action_type.clone(),
                    });
                }
            }
        }

        if !self.steps.iter().any(|s| s.is_final) {
            warnings.push(GraphWarning::NoFinalStep);
        }

        Ok(warnings)
    }
}
