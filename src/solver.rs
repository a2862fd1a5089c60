//! Solvers: Euler / Heun / RK4 over the assembled state vector (§4.10).
//!
//! All three share the same working-matrix shape — a flattened, stable-order list
//! of output fluxes across every solver-handled brick — and the same three
//! primitives: compute rates, apply constraints, integrate. They differ only in
//! how many stages they run and how they combine the stage rates.

use crate::brick::BrickId;
use crate::container::{self, ContainerId};
use crate::error::EngineError;
use crate::flux::FluxId;
use crate::forcing::ForcingValues;
use crate::graph::Graph;
use crate::process::{self, ProcessKind};
use crate::processor;
use crate::subbasin::SubBasin;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    EulerExplicit,
    HeunExplicit,
    Rk4,
}

/// The solver-handled subset of the graph, built once after the graph is
/// constructed (§4.9 "state vector assembly"). `containers` and `outputs` are in a
/// fixed order for the lifetime of the model.
pub struct SolverContext {
    pub bricks: Vec<BrickId>,
    pub containers: Vec<ContainerId>,
    pub outputs: Vec<FluxId>,
}

pub fn build_context(graph: &Graph, basin: &SubBasin) -> SolverContext {
    let bricks = processor::solver_bricks(graph, basin);
    let mut containers = Vec::new();
    let mut outputs = Vec::new();
    for &brick_id in &bricks {
        let container_id = graph.bricks.get(brick_id).container;
        if !containers.contains(&container_id) {
            containers.push(container_id);
        }
        for &process_id in &graph.bricks.get(brick_id).processes {
            outputs.extend(graph.processes.get(process_id).outputs.iter().copied());
        }
    }
    SolverContext { bricks, containers, outputs }
}

/// Both accumulators together: a multi-stage solver must snapshot/restore/average
/// the static accumulator alongside the dynamic one, because `commit_inputs` (run
/// once per `integrate`) always commits from whatever static value is currently in
/// place — restoring only the dynamic half would leave committed inputs visible to
/// stages that shouldn't see them yet, or double-counted across stages that should.
fn snapshot_state(graph: &Graph, ctx: &SolverContext) -> Vec<(f64, f64)> {
    ctx.containers
        .iter()
        .map(|&c| {
            let container = graph.containers.get(c);
            (container.dynamic_change(), container.static_change())
        })
        .collect()
}

fn restore_state(graph: &mut Graph, ctx: &SolverContext, snapshot: &[(f64, f64)]) {
    for (&c, &(dynamic, static_)) in ctx.containers.iter().zip(snapshot) {
        let container = graph.containers.get_mut(c);
        container.reset_dynamic_change(dynamic);
        container.reset_static_change(static_);
    }
}

fn avg_state(a: &[(f64, f64)], b: &[(f64, f64)]) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b)
        .map(|(&(ad, asf), &(bd, bsf))| ((ad + bd) / 2.0, (asf + bsf) / 2.0))
        .collect()
}

fn commit_inputs(graph: &mut Graph, ctx: &SolverContext) {
    for &c in &ctx.containers {
        processor::update_content_from_inputs(graph, c);
    }
}

/// Runs every process of every solver-handled brick and writes its rate into the
/// corresponding output flux, returning the flattened rate vector aligned with
/// `ctx.outputs`.
fn compute_rates(
    graph: &mut Graph,
    ctx: &SolverContext,
    forcing_of_brick: &HashMap<BrickId, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Vec<f64> {
    let mut result = Vec::with_capacity(ctx.outputs.len());
    for &brick_id in &ctx.bricks {
        let forcing = forcing_of_brick.get(&brick_id).copied().unwrap_or_default();
        let mut siblings_total = 0.0;
        let processes = graph.bricks.get(brick_id).processes.clone();
        for process_id in processes {
            let rates = process::rates(graph, process_id, &forcing, date, dt, siblings_total);
            if !matches!(graph.processes.get(process_id).kind, ProcessKind::Overflow) {
                siblings_total += rates.iter().sum::<f64>();
            }
            let outputs = graph.processes.get(process_id).outputs.clone();
            for (&flux_id, &rate) in outputs.iter().zip(&rates) {
                graph.fluxes.get_mut(flux_id).set_rate(rate);
                result.push(rate);
            }
        }
    }
    result
}

fn read_rates(graph: &Graph, ctx: &SolverContext) -> Vec<f64> {
    ctx.outputs.iter().map(|&f| graph.fluxes.get(f).rate()).collect()
}

fn write_rates(graph: &mut Graph, ctx: &SolverContext, rates: &[f64]) {
    for (&flux_id, &rate) in ctx.outputs.iter().zip(rates) {
        graph.fluxes.get_mut(flux_id).set_rate(rate);
    }
}

fn apply_constraints_stage(graph: &mut Graph, ctx: &SolverContext, dt: f64) -> Result<(), EngineError> {
    for &c in &ctx.containers {
        container::apply_constraints(graph, c, dt)?;
    }
    Ok(())
}

/// Commits this step's inputs into the static accumulator, then permanently
/// integrates the given rates over `dt` (debits sources, credits targets) and
/// zeroes the rate slots. The commit happens here, inside `integrate`, rather than
/// once up front: multi-stage solvers restore the static accumulator back to its
/// pre-step value between stages (`restore_state`), so each `integrate` call commits
/// the same inputs fresh rather than stacking them (§4.10).
fn integrate(graph: &mut Graph, ctx: &SolverContext, rates: &[f64], dt: f64) {
    commit_inputs(graph, ctx);
    write_rates(graph, ctx, rates);
    for &flux_id in &ctx.outputs {
        let rate = graph.fluxes.get(flux_id).rate();
        processor::apply_change(graph, flux_id, rate, dt);
    }
}

fn finalize_all(graph: &mut Graph, ctx: &SolverContext) -> Result<(), EngineError> {
    for &c in &ctx.containers {
        graph.containers.get_mut(c).finalize()?;
    }
    Ok(())
}

/// Euler: one stage. Compute rates (pre-commit, so the step's own inputs are not
/// yet visible); apply constraints; integrate (commits inputs, then applies);
/// finalize.
fn solve_euler(
    graph: &mut Graph,
    ctx: &SolverContext,
    forcing_of_brick: &HashMap<BrickId, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    compute_rates(graph, ctx, forcing_of_brick, date, dt);
    apply_constraints_stage(graph, ctx, dt)?;
    let rates = read_rates(graph, ctx);
    integrate(graph, ctx, &rates, dt);
    finalize_all(graph, ctx)
}

/// Heun (improved Euler, §4.10): k1 (pre-commit, constrained), integrate (commits
/// inputs and applies k1), k2 (now sees the committed inputs), restore to the
/// pre-step snapshot, average, constrain once, integrate once (re-commits the same
/// inputs against the restored baseline).
fn solve_heun(
    graph: &mut Graph,
    ctx: &SolverContext,
    forcing_of_brick: &HashMap<BrickId, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    let s0 = snapshot_state(graph, ctx);

    compute_rates(graph, ctx, forcing_of_brick, date, dt);
    apply_constraints_stage(graph, ctx, dt)?;
    let k1 = read_rates(graph, ctx);
    integrate(graph, ctx, &k1, dt);

    let k2 = compute_rates(graph, ctx, forcing_of_brick, date, dt);

    restore_state(graph, ctx, &s0);

    let final_rates: Vec<f64> = k1.iter().zip(&k2).map(|(a, b)| (a + b) / 2.0).collect();
    write_rates(graph, ctx, &final_rates);
    apply_constraints_stage(graph, ctx, dt)?;
    let final_rates = read_rates(graph, ctx);
    integrate(graph, ctx, &final_rates, dt);
    finalize_all(graph, ctx)
}

/// RK4 (§4.10): four stages, each evaluated at the midpoint reached by averaging
/// the previous full-step projection with the step's starting snapshot. Every
/// stage's tentative `integrate` restores to the pre-step snapshot first, so each
/// one re-commits the step's own inputs against the same baseline rather than
/// stacking them (§4.10, §4.1).
fn solve_rk4(
    graph: &mut Graph,
    ctx: &SolverContext,
    forcing_of_brick: &HashMap<BrickId, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    let s0 = snapshot_state(graph, ctx);

    compute_rates(graph, ctx, forcing_of_brick, date, dt);
    apply_constraints_stage(graph, ctx, dt)?;
    let k1 = read_rates(graph, ctx);
    integrate(graph, ctx, &k1, dt);
    let s1 = snapshot_state(graph, ctx);

    let avg01 = avg_state(&s0, &s1);
    restore_state(graph, ctx, &avg01);
    let k2 = compute_rates(graph, ctx, forcing_of_brick, date, dt);
    restore_state(graph, ctx, &s0);
    integrate(graph, ctx, &k2, dt);
    let s2 = snapshot_state(graph, ctx);

    let avg02 = avg_state(&s0, &s2);
    restore_state(graph, ctx, &avg02);
    let k3 = compute_rates(graph, ctx, forcing_of_brick, date, dt);
    restore_state(graph, ctx, &s0);
    integrate(graph, ctx, &k3, dt);
    let s3 = snapshot_state(graph, ctx);

    restore_state(graph, ctx, &s3);
    let k4 = compute_rates(graph, ctx, forcing_of_brick, date, dt);
    restore_state(graph, ctx, &s0);

    let final_rates: Vec<f64> =
        (0..k1.len()).map(|i| (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) / 6.0).collect();
    write_rates(graph, ctx, &final_rates);
    apply_constraints_stage(graph, ctx, dt)?;
    let final_rates = read_rates(graph, ctx);
    integrate(graph, ctx, &final_rates, dt);
    finalize_all(graph, ctx)
}

/// Dispatches to the configured solver variant.
pub fn solve(
    kind: SolverKind,
    graph: &mut Graph,
    ctx: &SolverContext,
    forcing_of_brick: &HashMap<BrickId, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    match kind {
        SolverKind::EulerExplicit => solve_euler(graph, ctx, forcing_of_brick, date, dt),
        SolverKind::HeunExplicit => solve_heun(graph, ctx, forcing_of_brick, date, dt),
        SolverKind::Rk4 => solve_rk4(graph, ctx, forcing_of_brick, date, dt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brick::{Brick, BrickKind};
    use crate::container::WaterContainer;
    use crate::flux::{Flux, FluxKind, FluxTarget, FluxType};
    use crate::hru::Hru;
    use crate::process::ProcessState;
    use float_cmp::{approx_eq, F64Margin};

    /// One storage brick, linear outflow to outlet, no inflow — a direct
    /// reimplementation of the E1/E2/E3 single-reservoir scenario's wiring, used
    /// here to check each solver converges towards the same decay rather than to
    /// check the exact published arrays (those live in `tests/scenarios.rs`).
    fn build_single_reservoir(response_factor: f64, initial_content: f64) -> (Graph, SolverContext, FluxId) {
        let mut graph = Graph::new();
        let container = graph.containers.push(WaterContainer::new("store").with_initial_content(initial_content));
        let outlet_flux =
            graph.fluxes.push(Flux::new("outlet", FluxKind::ToOutlet, FluxType::Water, FluxTarget::Outlet).with_source(container));
        let process = graph.processes.push(
            ProcessState::new("outflow", container, ProcessKind::OutflowLinear { response_factor })
                .with_outputs(vec![outlet_flux]),
        );
        graph.containers.get_mut(container).outgoing_processes = vec![process];
        let brick = graph.bricks.push(Brick::new("store", container, BrickKind::Storage).with_processes(vec![process]));

        let mut hru = Hru::new(1, 100.0);
        hru.bricks = vec![brick];
        let basin = SubBasin::new(vec![hru]);
        crate::processor::partition(&mut graph, &basin);
        let ctx = build_context(&graph, &basin);
        (graph, ctx, outlet_flux)
    }

    #[test]
    fn euler_depletes_a_reservoir_with_no_inflow() {
        let (mut graph, ctx, outlet) = build_single_reservoir(0.3, 10.0);
        let forcings = HashMap::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        solve(SolverKind::EulerExplicit, &mut graph, &ctx, &forcings, date, 1.0).unwrap();
        assert!(approx_eq!(f64, graph.fluxes.get(outlet).amount(), 3.0, F64Margin::default()));
        assert!(approx_eq!(f64, graph.containers.get(ctx.containers[0]).content(), 7.0, F64Margin::default()));
    }

    #[test]
    fn all_three_solvers_never_go_negative() {
        for kind in [SolverKind::EulerExplicit, SolverKind::HeunExplicit, SolverKind::Rk4] {
            let (mut graph, ctx, _) = build_single_reservoir(0.9, 1.0);
            let forcings = HashMap::new();
            let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            for _ in 0..5 {
                solve(kind, &mut graph, &ctx, &forcings, date, 1.0).unwrap();
            }
            assert!(graph.containers.get(ctx.containers[0]).content() >= -1e-10);
        }
    }
}
