//! Multi-step navigation state.
//!
//! The controller knows nothing about field validity. Callers that want
//! validity-gated navigation check the step's fields first (see
//! [`crate::session::RegistrationSession::next`]).

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::rules::DefinitionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<String>,
}

impl Step {
    pub fn new(id: &str, title: &str, description: &str, fields: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepProgress {
    pub current_step: usize,
    pub total_steps: usize,
    pub completed_steps: Vec<usize>,
    pub visited_steps: Vec<usize>,
    pub completion_percentage: u8,
    pub is_first_step: bool,
    pub is_last_step: bool,
}

#[derive(Debug, Clone)]
pub struct StepController {
    steps: Vec<Step>,
    current: usize,
    completed: BTreeSet<usize>,
    visited: BTreeSet<usize>,
}

impl StepController {
    pub fn new(steps: Vec<Step>) -> Result<Self, DefinitionError> {
        if steps.is_empty() {
            return Err(DefinitionError::NoSteps);
        }
        let mut ids = BTreeSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStep(step.id.clone()));
            }
        }

        Ok(Self {
            steps,
            current: 0,
            completed: BTreeSet::new(),
            visited: BTreeSet::from([0]),
        })
    }

    /// Marks the current step completed and advances. No-op on the last step.
    pub fn next(&mut self) -> bool {
        if self.current + 1 >= self.steps.len() {
            return false;
        }
        self.completed.insert(self.current);
        self.current += 1;
        self.visited.insert(self.current);
        debug!(step = self.current, "advanced to next step");
        true
    }

    /// Steps back without touching completed/visited. No-op on the first step.
    pub fn prev(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        debug!(step = self.current, "returned to previous step");
        true
    }

    /// Moves to `index` unconditionally when it is in range.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index >= self.steps.len() {
            return false;
        }
        self.current = index;
        self.visited.insert(index);
        debug!(step = index, "jumped to step");
        true
    }

    /// `go_to` restricted to accessible steps.
    pub fn jump_to(&mut self, index: usize) -> bool {
        self.is_accessible(index) && self.go_to(index)
    }

    pub fn is_accessible(&self, index: usize) -> bool {
        if index >= self.steps.len() {
            return false;
        }
        if index <= self.current {
            return true;
        }
        if index == self.current + 1 {
            return self.completed.contains(&self.current);
        }
        self.visited.contains(&index)
    }

    pub fn mark_completed(&mut self, index: usize) {
        if index < self.steps.len() {
            self.completed.insert(index);
        }
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    pub fn is_visited(&self, index: usize) -> bool {
        self.visited.contains(&index)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &Step {
        &self.steps[self.current]
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_first_step(&self) -> bool {
        self.current == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.current + 1 == self.steps.len()
    }

    pub fn completed(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.visited
    }

    /// The current step always counts as one unit of progress, so a fresh
    /// three-step form reports 25% and a fully completed one 100%.
    pub fn completion_percentage(&self) -> u8 {
        let total = self.steps.len() + 1;
        let done = self.completed.len() + 1;
        ((done as f64 / total as f64) * 100.0).round() as u8
    }

    pub fn progress(&self) -> StepProgress {
        StepProgress {
            current_step: self.current,
            total_steps: self.steps.len(),
            completed_steps: self.completed.iter().copied().collect(),
            visited_steps: self.visited.iter().copied().collect(),
            completion_percentage: self.completion_percentage(),
            is_first_step: self.is_first_step(),
            is_last_step: self.is_last_step(),
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.completed.clear();
        self.visited = BTreeSet::from([0]);
        debug!("step progress reset");
    }
}
