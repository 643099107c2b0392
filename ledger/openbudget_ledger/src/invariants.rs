#![allow(dead_code)]

use crate::types::{Milestone, Project};

/// Allocations never exceed the budget.
pub fn assert_allocated_within_budget(project: &Project) {
    assert!(
        project.total_allocated <= project.total_budget,
        "project {} allocated {} > budget {}",
        project.id,
        project.total_allocated,
        project.total_budget
    );
}

/// Releases never exceed allocations.
pub fn assert_released_within_allocated(project: &Project) {
    assert!(
        project.total_released <= project.total_allocated,
        "project {} released {} > allocated {}",
        project.id,
        project.total_released,
        project.total_allocated
    );
}

/// A released milestone carries a release timestamp; an unreleased one
/// carries neither timestamp nor proof.
pub fn assert_release_fields_consistent(milestone: &Milestone) {
    if milestone.is_released {
        assert!(
            milestone.released_at.is_some(),
            "milestone {}/{} released without timestamp",
            milestone.project_id,
            milestone.index
        );
    } else {
        assert!(
            milestone.released_at.is_none() && milestone.proof_url.is_empty(),
            "milestone {}/{} carries release data while unreleased",
            milestone.project_id,
            milestone.index
        );
    }
}

/// Immutable project fields never change after creation.
pub fn assert_project_immutable_fields(original: &Project, current: &Project) {
    assert_eq!(original.id, current.id, "id changed");
    assert_eq!(original.title, current.title, "title changed");
    assert_eq!(original.ministry, current.ministry, "ministry changed");
    assert_eq!(
        original.total_budget, current.total_budget,
        "total_budget changed"
    );
    assert_eq!(
        original.created_at, current.created_at,
        "created_at changed"
    );
    assert_eq!(original.authority, current.authority, "authority changed");
}

/// Run all stateless project invariants.
pub fn assert_all_project_invariants(project: &Project) {
    assert_allocated_within_budget(project);
    assert_released_within_allocated(project);
}
