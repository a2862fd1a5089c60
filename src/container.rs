//! Water container: a scalar stock with capacity, overflow hook, and the constraint
//! system that is "the heart of the engine's correctness" (§4.1).

use crate::arena::Id;
use crate::error::EngineError;
use crate::flux::FluxTarget;
use crate::graph::Graph;
use crate::process::ProcessId;

pub type ContainerId = Id<WaterContainer>;

/// Tolerance used when checking `content <= capacity` after finalisation (§3).
const CAPACITY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct WaterContainer {
    pub label: String,
    content: f64,
    pub capacity: Option<f64>,
    pub infinite: bool,
    pub overflow_process: Option<ProcessId>,
    dynamic_change: f64,
    static_change: f64,
    /// Processes whose source container is this one (reverse lookup used by
    /// `apply_constraints`).
    pub outgoing_processes: Vec<ProcessId>,
    /// Fluxes that deliver into this container, excluding outlet/atmosphere targets.
    pub incoming_fluxes: Vec<crate::flux::FluxId>,
}

impl WaterContainer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: 0.0,
            capacity: None,
            infinite: false,
            overflow_process: None,
            dynamic_change: 0.0,
            static_change: 0.0,
            outgoing_processes: Vec::new(),
            incoming_fluxes: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_infinite(mut self, infinite: bool) -> Self {
        self.infinite = infinite;
        self
    }

    pub fn with_initial_content(mut self, content: f64) -> Self {
        self.content = content;
        self
    }

    pub fn content(&self) -> f64 {
        self.content
    }

    /// Current content with both accumulators applied, clamped to zero — the value
    /// processes see while computing their rates (§4.3).
    pub fn effective_content(&self) -> f64 {
        (self.content + self.dynamic_change + self.static_change).max(0.0)
    }

    /// Current content with only the dynamic accumulator applied — the base
    /// `apply_constraints` projects from (§4.1).
    pub fn content_with_dynamic_changes(&self) -> f64 {
        self.content + self.dynamic_change
    }

    pub fn add_static(&mut self, delta: f64) {
        if self.infinite {
            return;
        }
        self.static_change += delta;
    }

    pub fn add_dynamic(&mut self, delta: f64) {
        if self.infinite {
            return;
        }
        self.dynamic_change += delta;
    }

    pub fn dynamic_change(&self) -> f64 {
        self.dynamic_change
    }

    pub fn static_change(&self) -> f64 {
        self.static_change
    }

    pub fn reset_dynamic_change(&mut self, value: f64) {
        self.dynamic_change = value;
    }

    pub fn reset_static_change(&mut self, value: f64) {
        self.static_change = value;
    }

    pub fn reset(&mut self, initial_content: f64) {
        self.content = initial_content;
        self.dynamic_change = 0.0;
        self.static_change = 0.0;
    }

    /// Commits both accumulators into `content`, zeros them, and asserts
    /// non-negativity (§4.1). A no-op for `infinite` containers: they never
    /// accumulate in the first place, since `add_static`/`add_dynamic` already
    /// guard on `infinite`.
    pub fn finalize(&mut self) -> Result<(), EngineError> {
        if self.infinite {
            return Ok(());
        }
        let next = self.content + self.static_change + self.dynamic_change;
        if next < -1e-10 {
            return Err(EngineError::ConceptionIssue(format!(
                "container '{}' would go negative after finalisation ({next})",
                self.label
            )));
        }
        self.content = next.max(0.0);
        self.static_change = 0.0;
        self.dynamic_change = 0.0;
        Ok(())
    }
}

/// Sum of the current rates of every output flux of a process.
fn process_total_rate(graph: &crate::graph::Graph, process_id: ProcessId) -> f64 {
    let process = graph.processes.get(process_id);
    process.outputs.iter().map(|&flux_id| graph.fluxes.get(flux_id).rate()).sum()
}

/// Scale down every output flux's rate of `process_id` by `factor` (§4.1 step 4/5).
fn scale_process_outputs(graph: &mut Graph, process_id: ProcessId, factor: f64) {
    let outputs = graph.processes.get(process_id).outputs.clone();
    for flux_id in outputs {
        let flux = graph.fluxes.get_mut(flux_id);
        flux.set_rate(flux.rate() * factor);
    }
}

fn zero_process_outputs(graph: &mut Graph, process_id: ProcessId) {
    let outputs = graph.processes.get(process_id).outputs.clone();
    for flux_id in outputs {
        graph.fluxes.get_mut(flux_id).set_rate(0.0);
    }
}

/// `apply_constraints(Δt)` (§4.1): clamps negative rates, enforces non-negative
/// projected content, and enforces the capacity bound via the overflow escape hatch.
pub fn apply_constraints(graph: &mut Graph, container_id: ContainerId, dt: f64) -> Result<(), EngineError> {
    // Step 1: clamp negative outgoing rates to zero.
    let outgoing = graph.containers.get(container_id).outgoing_processes.clone();
    for &process_id in &outgoing {
        if graph.processes.get(process_id).is_overflow() {
            continue;
        }
        let outputs = graph.processes.get(process_id).outputs.clone();
        for flux_id in outputs {
            let flux = graph.fluxes.get_mut(flux_id);
            if flux.rate() < 0.0 {
                flux.set_rate(0.0);
            }
        }
    }
    let outputs_total: f64 = outgoing
        .iter()
        .filter(|&&p| !graph.processes.get(p).is_overflow())
        .map(|&p| process_total_rate(graph, p))
        .sum();

    // Step 2: incoming rates, split static/instantaneous from dynamic.
    let incoming = graph.containers.get(container_id).incoming_fluxes.clone();
    let mut inputs_dynamic = 0.0;
    let mut inputs_static = 0.0;
    for &flux_id in &incoming {
        let flux = graph.fluxes.get(flux_id);
        if flux.is_static || flux.is_instantaneous {
            inputs_static += flux.amount();
        } else {
            inputs_dynamic += flux.rate();
        }
    }

    let content = graph.containers.get(container_id).content_with_dynamic_changes();
    let content_after = content + inputs_static + (inputs_dynamic - outputs_total) * dt;

    // Step 4: non-negativity.
    if content_after < 0.0 {
        let deficit = -content_after;
        if outputs_total <= 1e-12 {
            // Nothing to scale down; the shortfall comes from elsewhere and is a bug.
        } else {
            let reduction = (deficit / dt).min(outputs_total);
            let factor = if reduction >= outputs_total { 0.0 } else { 1.0 - reduction / outputs_total };
            for &process_id in &outgoing {
                if graph.processes.get(process_id).is_overflow() {
                    continue;
                }
                if factor <= 0.0 {
                    zero_process_outputs(graph, process_id);
                } else {
                    scale_process_outputs(graph, process_id, factor);
                }
            }
        }
    }

    // Step 5: capacity bound.
    let capacity = graph.containers.get(container_id).capacity;
    let infinite = graph.containers.get(container_id).infinite;
    if let (false, Some(capacity)) = (infinite, capacity) {
        // Re-read rates: they may have been scaled down in step 4.
        let outputs_total: f64 = outgoing
            .iter()
            .filter(|&&p| !graph.processes.get(p).is_overflow())
            .map(|&p| process_total_rate(graph, p))
            .sum();
        let content_after = content + inputs_static + (inputs_dynamic - outputs_total) * dt;

        if content_after > capacity {
            let excess = (content_after - capacity) / dt;
            let overflow = graph.containers.get(container_id).overflow_process;
            if let Some(overflow_id) = overflow {
                let outputs = graph.processes.get(overflow_id).outputs.clone();
                if let Some(&flux_id) = outputs.first() {
                    graph.fluxes.get_mut(flux_id).set_rate(excess);
                }
                return Ok(());
            }

            if content + inputs_static > capacity + CAPACITY_EPSILON {
                return Err(EngineError::ConceptionIssue(format!(
                    "container '{}' is filled directly above capacity with no overflow process",
                    graph.containers.get(container_id).label
                )));
            }

            if inputs_dynamic <= 1e-12 {
                // No dynamic inflow rate to scale down; nothing further to do.
            } else {
                let target_inflow = (capacity - content - inputs_static) / dt + outputs_total;
                let factor = (target_inflow / inputs_dynamic).clamp(0.0, 1.0);
                for &flux_id in &incoming {
                    let flux = graph.fluxes.get_mut(flux_id);
                    if !flux.is_static && !flux.is_instantaneous {
                        flux.set_rate(flux.rate() * factor);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Commit a flux's delivered amount into its target container's appropriate
/// accumulator (static for instantaneous/static fluxes, handled by the flux itself
/// via `crate::flux::deliver`); this helper exists for fluxes that land on a plain
/// container target during solver/direct-apply integration.
pub fn receive_into(graph: &mut Graph, target: FluxTarget, delta: f64) {
    if let FluxTarget::Container(container_id) = target {
        graph.containers.get_mut(container_id).add_dynamic(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_commits_and_clears_accumulators() {
        let mut c = WaterContainer::new("test").with_initial_content(5.0);
        c.add_static(2.0);
        c.add_dynamic(-1.0);
        c.finalize().unwrap();
        assert_eq!(c.content(), 6.0);
        assert_eq!(c.dynamic_change(), 0.0);
        assert_eq!(c.static_change(), 0.0);
    }

    #[test]
    fn finalize_rejects_negative_content() {
        let mut c = WaterContainer::new("test").with_initial_content(1.0);
        c.add_dynamic(-5.0);
        assert!(c.finalize().is_err());
    }

    #[test]
    fn infinite_container_is_never_mutated() {
        let mut c = WaterContainer::new("glacier ice").with_initial_content(1.0).with_infinite(true);
        c.add_dynamic(-5.0);
        c.add_static(3.0);
        c.finalize().unwrap();
        assert_eq!(c.content(), 1.0);
        assert_eq!(c.dynamic_change(), 0.0);
        assert_eq!(c.static_change(), 0.0);
    }
}
