//! Dependency-respecting execution plans

use super::extractability::{ConfidenceBand, FieldExtractabilityEstimate};
use crate::event::Field;
use serde::Serialize;
use std::collections::BTreeSet;

/// One field's slot in the plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedField {
    pub field: Field,
    pub band: ConfidenceBand,
    /// Whether the field may escalate past the pattern stage. Obviously
    /// absent fields never reach the expensive strategies.
    pub escalate: bool,
}

/// Two phases: a concurrent pattern-only batch, then a sequential queue in
/// dependency order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub concurrent: Vec<PlannedField>,
    pub sequential: Vec<PlannedField>,
}

impl ExecutionPlan {
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.concurrent
            .iter()
            .chain(self.sequential.iter())
            .map(|p| p.field)
    }

    pub fn len(&self) -> usize {
        self.concurrent.len() + self.sequential.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, field: Field) -> Option<&PlannedField> {
        self.concurrent
            .iter()
            .chain(self.sequential.iter())
            .find(|p| p.field == field)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingOrderPlanner;

impl ProcessingOrderPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Close the requested set over its dependencies.
    pub fn closure(requested: &[Field]) -> BTreeSet<Field> {
        let mut fields: BTreeSet<Field> = BTreeSet::new();
        let mut stack: Vec<Field> = requested.to_vec();
        while let Some(field) = stack.pop() {
            if fields.insert(field) {
                stack.extend_from_slice(field.dependencies());
            }
        }
        fields
    }

    /// Build the plan. Dependency-free fields already predicted high run
    /// together; everything else waits behind its dependencies.
    pub fn plan(&self, requested: &[Field], estimates: &[FieldExtractabilityEstimate]) -> ExecutionPlan {
        let mut plan = ExecutionPlan::default();

        for field in Self::closure(requested) {
            let band = estimates
                .iter()
                .find(|e| e.field == field)
                .map(|e| e.band)
                .unwrap_or(ConfidenceBand::Absent);
            let planned = PlannedField {
                field,
                band,
                escalate: band != ConfidenceBand::Absent,
            };

            if field.dependencies().is_empty() && band == ConfidenceBand::High {
                plan.concurrent.push(planned);
            } else {
                plan.sequential.push(planned);
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FieldExtractabilityAnalyzer;

    #[test]
    fn end_pulls_in_its_dependencies() {
        let fields = ProcessingOrderPlanner::closure(&[Field::End]);
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![Field::Start, Field::Duration, Field::End]
        );
    }

    #[test]
    fn high_independent_fields_run_concurrently() {
        let text = "Team meeting tomorrow at 2:00pm in Conference Room A";
        let estimates = FieldExtractabilityAnalyzer::default().estimate(text, &Field::ALL);
        let plan = ProcessingOrderPlanner::new().plan(&Field::ALL, &estimates);

        let concurrent: Vec<Field> = plan.concurrent.iter().map(|p| p.field).collect();
        assert_eq!(
            concurrent,
            vec![Field::Start, Field::Title, Field::Location, Field::Description]
        );
        let sequential: Vec<Field> = plan.sequential.iter().map(|p| p.field).collect();
        assert_eq!(sequential, vec![Field::Duration, Field::End]);
    }

    #[test]
    fn sequential_queue_is_in_dependency_order() {
        let text = "Dinner with the team sometime next week";
        let estimates = FieldExtractabilityAnalyzer::default().estimate(text, &Field::ALL);
        let plan = ProcessingOrderPlanner::new().plan(&Field::ALL, &estimates);

        let sequential: Vec<Field> = plan.sequential.iter().map(|p| p.field).collect();
        let mut sorted = sequential.clone();
        sorted.sort();
        assert_eq!(sequential, sorted);
        assert!(plan.get(Field::Start).unwrap().escalate);
        assert!(!plan.get(Field::Duration).unwrap().escalate);
    }

    #[test]
    fn subset_plans_only_what_was_asked() {
        let estimates = FieldExtractabilityAnalyzer::default().estimate("lunch with sarah", &[Field::Title]);
        let plan = ProcessingOrderPlanner::new().plan(&[Field::Title], &estimates);
        assert_eq!(plan.fields().collect::<Vec<_>>(), vec![Field::Title]);
    }
}
