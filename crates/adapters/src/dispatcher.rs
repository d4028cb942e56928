// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane partitioning of a plan's steps.

use relay_core::{DispatchPlan, ExecutionMode, LaneSpec, Step};
use serde_json::json;

/// Computes the lane topology and execution mode for a plan.
pub trait LaneDispatcher: Send + Sync {
    fn build_dispatch_plan(&self, steps: &[Step]) -> DispatchPlan;
}

/// One lane per distinct target, in order of first appearance.
///
/// Targetless steps join the first lane. With `parallel` off, or when only
/// one lane results, every step runs on a single sequential lane.
#[derive(Debug, Clone)]
pub struct TargetPartitionDispatcher {
    parallel: bool,
    max_lanes: usize,
}

impl TargetPartitionDispatcher {
    pub fn new(parallel: bool, max_lanes: usize) -> Self {
        Self { parallel, max_lanes: max_lanes.max(1) }
    }
}

impl LaneDispatcher for TargetPartitionDispatcher {
    fn build_dispatch_plan(&self, steps: &[Step]) -> DispatchPlan {
        let step_ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
        if !self.parallel {
            return DispatchPlan::single_lane(&step_ids);
        }

        let mut lanes: Vec<LaneSpec> = Vec::new();
        let mut targetless = Vec::new();
        for step in steps {
            let Some(target) = step.declared_target() else {
                targetless.push(step.id.clone());
                continue;
            };
            match lanes.iter_mut().find(|l| l.target.as_deref() == Some(target)) {
                Some(lane) => lane.step_ids.push(step.id.clone()),
                None => lanes.push(LaneSpec {
                    id: format!("lane_{}", lanes.len() + 1),
                    target: Some(target.to_string()),
                    step_ids: vec![step.id.clone()],
                }),
            }
        }

        if lanes.len() <= 1 {
            let mut plan = DispatchPlan::single_lane(&step_ids);
            if let Some(only) = lanes.first() {
                plan.lanes[0].target = only.target.clone();
            }
            plan.dispatch_mode = "target_partition".to_string();
            plan.push_fallback_reason("single_target");
            return plan;
        }

        // Re-insert targetless steps into the first lane, keeping plan order.
        if !targetless.is_empty() {
            let first = &mut lanes[0];
            first.step_ids.extend(targetless);
            first.step_ids.sort_by_key(|id| step_ids.iter().position(|s| s == id));
        }

        DispatchPlan {
            execution_mode: ExecutionMode::ParallelLanes,
            dispatch_mode: "target_partition".to_string(),
            policy: json!({ "max_lanes": self.max_lanes }),
            fallback_reason: None,
            lanes,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::LaneDispatcher;
    use relay_core::{DispatchPlan, Step};

    /// Dispatcher returning a fixed plan, for tests.
    #[derive(Debug, Clone)]
    pub struct StaticDispatcher(pub DispatchPlan);

    impl LaneDispatcher for StaticDispatcher {
        fn build_dispatch_plan(&self, _steps: &[Step]) -> DispatchPlan {
            self.0.clone()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::StaticDispatcher;

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
