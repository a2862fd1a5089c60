//! Processor: partitions bricks into solver-handled vs direct-apply, and drives the
//! direct-apply bricks through one step (§4.9).

use crate::brick::{BrickId, BrickKind};
use crate::container::{self, ContainerId};
use crate::error::EngineError;
use crate::flux::{self, FluxId, FluxKind};
use crate::forcing::ForcingValues;
use crate::graph::Graph;
use crate::process::{self, ProcessKind};
use crate::subbasin::SubBasin;
use chrono::NaiveDate;

/// Partition bricks in traversal order: once a solver-handled brick is seen in an
/// HRU, every subsequent brick in that HRU also becomes solver-handled (§4.9).
/// Sub-basin-level bricks are unconditionally solver-handled (mirrors
/// `Processor::ConnectToElementsToSolve` in the source, which adds basin bricks to
/// the solver set without checking `NeedsSolver`).
pub fn partition(graph: &mut Graph, basin: &SubBasin) {
    for hru in &basin.hrus {
        let mut solver_required = false;
        for &brick_id in &hru.bricks {
            let is_storage = matches!(graph.bricks.get(brick_id).kind, BrickKind::Storage);
            if is_storage {
                solver_required = true;
            }
            graph.bricks.get_mut(brick_id).needs_solver = solver_required;
        }
    }
    for &brick_id in &basin.bricks {
        graph.bricks.get_mut(brick_id).needs_solver = true;
    }
}

pub fn direct_bricks<'a>(graph: &'a Graph, basin: &'a SubBasin) -> Vec<BrickId> {
    basin.hrus.iter().flat_map(|h| h.bricks.iter().copied()).filter(|&id| !graph.bricks.get(id).needs_solver).collect()
}

pub fn solver_bricks(graph: &Graph, basin: &SubBasin) -> Vec<BrickId> {
    let mut bricks: Vec<BrickId> =
        basin.hrus.iter().flat_map(|h| h.bricks.iter().copied()).filter(|&id| graph.bricks.get(id).needs_solver).collect();
    bricks.extend(basin.bricks.iter().copied());
    bricks
}

/// Commit already-computed incoming flux amounts (forcings, splitter deliveries,
/// upstream direct fluxes) into the container's static accumulator.
/// `update_content_from_inputs` (§4.9 step 2).
pub fn update_content_from_inputs(graph: &mut Graph, container_id: ContainerId) {
    let incoming = graph.containers.get(container_id).incoming_fluxes.clone();
    for flux_id in incoming {
        let flux = graph.fluxes.get(flux_id);
        if flux.is_instantaneous {
            continue; // already credited directly by `flux::update`.
        }
        let amount = flux.amount();
        graph.containers.get_mut(container_id).add_static(amount);
    }
}

/// `apply_change(i, rate, Δt)` (§4.9 step 2, §4.1): debits the source container,
/// routes the weighted amount onward, and resets the rate slot.
pub fn apply_change(graph: &mut Graph, flux_id: FluxId, rate: f64, dt: f64) {
    let raw_amount = rate * dt;
    if let Some(source_id) = graph.fluxes.get(flux_id).source {
        graph.containers.get_mut(source_id).add_dynamic(-raw_amount);
    }
    flux::update(graph, flux_id, raw_amount);

    let (kind, target) = {
        let f = graph.fluxes.get(flux_id);
        (f.kind, f.target)
    };
    if matches!(kind, FluxKind::ToContainer) {
        let weighted = graph.fluxes.get(flux_id).amount();
        container::receive_into(graph, target, weighted);
    }
    graph.fluxes.get_mut(flux_id).set_rate(0.0);
}

/// Run the processes of one process's container independent rate query, returning
/// one rate per output flux (§4.3's `rates()` contract).
fn process_rates(
    graph: &Graph,
    process_id: crate::process::ProcessId,
    forcing: &ForcingValues,
    date: NaiveDate,
    dt: f64,
    siblings_already_routed: f64,
) -> Vec<f64> {
    process::rates(graph, process_id, forcing, date, dt, siblings_already_routed)
}

/// Processes a single direct-apply brick for one step (§4.9 step 2).
pub fn direct_apply_step(
    graph: &mut Graph,
    brick_id: BrickId,
    forcing: &ForcingValues,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    let container_id = graph.bricks.get(brick_id).container;
    update_content_from_inputs(graph, container_id);

    let processes = graph.bricks.get(brick_id).processes.clone();
    let mut siblings_total = 0.0;
    let mut rates_by_process = Vec::with_capacity(processes.len());

    for &process_id in &processes {
        let rates = process_rates(graph, process_id, forcing, date, dt, siblings_total);
        if !matches!(graph.processes.get(process_id).kind, ProcessKind::Overflow) {
            siblings_total += rates.iter().sum::<f64>();
        }
        let outputs = graph.processes.get(process_id).outputs.clone();
        for (flux_id, &rate) in outputs.iter().zip(&rates) {
            graph.fluxes.get_mut(*flux_id).set_rate(rate);
        }
        rates_by_process.push((process_id, rates));
    }

    container::apply_constraints(graph, container_id, dt)?;

    for (process_id, rates) in rates_by_process {
        let outputs = graph.processes.get(process_id).outputs.clone();
        for (flux_id, _) in outputs.iter().zip(&rates) {
            let rate = graph.fluxes.get(*flux_id).rate();
            apply_change(graph, *flux_id, rate, dt);
        }
    }

    graph.containers.get_mut(container_id).finalize()?;
    Ok(())
}

/// Runs every direct-apply brick of every HRU, in traversal order (§4.9 step 2).
pub fn run_direct_bricks(
    graph: &mut Graph,
    basin: &SubBasin,
    forcings: &std::collections::HashMap<i32, ForcingValues>,
    date: NaiveDate,
    dt: f64,
) -> Result<(), EngineError> {
    for hru in &basin.hrus {
        let forcing = forcings
            .get(&hru.id)
            .ok_or_else(|| EngineError::NotFound(format!("no forcing for HRU {}", hru.id)))?;
        for &brick_id in &hru.bricks {
            if graph.bricks.get(brick_id).needs_solver {
                continue;
            }
            direct_apply_step(graph, brick_id, forcing, date, dt)?;
        }
    }
    Ok(())
}
