//! Graph builder: turns a [`ModelSpec`] plus a hydro-units table into a wired
//! [`Graph`]/[`SubBasin`] pair (§4.8, §9 "needs target brick").
//!
//! Grounded on `SettingsModel::AddHydroUnitBrick`/`AddBrickProcess` and
//! `SettingsBasin::AddBrick` in the original source: bricks and their processes
//! are declared independently, then wired together by name once every container
//! exists — hence the two-pass construction per scope (sub-basin, then each HRU).

use crate::brick::{Brick, BrickId, BrickKind};
use crate::container::{ContainerId, WaterContainer};
use crate::error::EngineError;
use crate::flux::{Flux, FluxId, FluxKind, FluxTarget};
use crate::forcing::HydroUnitRecord;
use crate::graph::Graph;
use crate::hru::{self, Hru};
use crate::process::{ProcessId, ProcessKind, ProcessState};
use crate::processor;
use crate::spec::{BrickSpec, BrickTypeSpec, ModelSpec, OutputSpec, OutputTarget, ProcessSpec, SplitterSpec};
use crate::splitter::{Splitter, SplitterId};
use crate::subbasin::SubBasin;
use log::info;
use std::collections::HashMap;

type NameMap = HashMap<String, BrickId>;

/// Builds the full graph for one sub-basin from its spec and hydro-units table.
/// Returns the graph, the assembled sub-basin, and a brick->HRU id lookup used to
/// resolve per-step forcings for solver-handled bricks (§4.10).
pub fn build(spec: &ModelSpec, units: &[HydroUnitRecord]) -> Result<(Graph, SubBasin, HashMap<BrickId, i32>), EngineError> {
    let mut graph = Graph::new();

    let (basin_brick_ids, basin_map) = build_bricks_pass_a(&mut graph, &spec.sub_basin_bricks, None);
    build_bricks_pass_b(&mut graph, &spec.sub_basin_bricks, &basin_brick_ids, &NameMap::new(), &basin_map)?;

    let mut hrus = Vec::with_capacity(units.len());
    let mut hru_of_brick = HashMap::new();

    for unit in units {
        let hru_spec = spec.hru_spec(unit.id);
        let (brick_ids, hru_map) = build_bricks_pass_a(&mut graph, &hru_spec.bricks, Some(unit));
        build_bricks_pass_b(&mut graph, &hru_spec.bricks, &brick_ids, &hru_map, &basin_map)?;
        let splitter_ids = build_splitters(&mut graph, &hru_spec.splitters, &hru_map, &basin_map)?;

        for &brick_id in &brick_ids {
            hru_of_brick.insert(brick_id, unit.id);
        }

        let mut unit_hru = Hru::new(unit.id, unit.area);
        unit_hru.bricks = brick_ids;
        unit_hru.splitters = splitter_ids;
        hrus.push(unit_hru);
    }

    for h in &hrus {
        hru::check_land_cover_fractions(&graph, h)?;
    }

    let mut basin = SubBasin::new(hrus);
    basin.bricks = basin_brick_ids;
    basin.outlet_fluxes = graph.fluxes.iter().filter(|(_, f)| matches!(f.target, FluxTarget::Outlet)).map(|(id, _)| id).collect();

    processor::partition(&mut graph, &basin);

    info!(
        "built sub-basin: {} HRUs, {} containers, {} fluxes, {} processes, {} outlet fluxes",
        basin.hrus.len(),
        graph.containers.len(),
        graph.fluxes.len(),
        graph.processes.len(),
        basin.outlet_fluxes.len()
    );

    Ok((graph, basin, hru_of_brick))
}

fn build_brick(graph: &mut Graph, brick_spec: &BrickSpec, unit: Option<&HydroUnitRecord>) -> BrickId {
    let mut container = WaterContainer::new(brick_spec.name.clone())
        .with_initial_content(brick_spec.initial_content)
        .with_infinite(brick_spec.infinite);
    if let Some(capacity) = brick_spec.capacity {
        container = container.with_capacity(capacity);
    }
    let container_id = graph.containers.push(container);

    let kind = match brick_spec.brick_type {
        BrickTypeSpec::Storage => BrickKind::Storage,
        BrickTypeSpec::GenericSurface => BrickKind::GenericSurface,
        BrickTypeSpec::LandCover(land_cover_type) => {
            let fraction = unit
                .and_then(|u| u.land_cover_fractions.iter().find(|(name, _)| name == &brick_spec.name).map(|(_, f)| *f))
                .or(brick_spec.area_fraction)
                .unwrap_or(0.0);
            BrickKind::LandCover { land_cover_type, area_fraction: fraction, children: Vec::new() }
        }
        BrickTypeSpec::Snowpack => {
            let snow_container = graph.containers.push(WaterContainer::new(format!("{}_snow", brick_spec.name)));
            BrickKind::Snowpack { snow_container }
        }
        BrickTypeSpec::Glacier => {
            let ice_container =
                graph.containers.push(WaterContainer::new(format!("{}_ice", brick_spec.name)).with_infinite(true));
            BrickKind::Glacier { ice_container, no_melt_when_snow_cover: brick_spec.no_melt_when_snow_cover, paired_snowpack: None }
        }
    };

    graph.bricks.push(Brick::new(brick_spec.name.clone(), container_id, kind))
}

fn build_bricks_pass_a(graph: &mut Graph, specs: &[BrickSpec], unit: Option<&HydroUnitRecord>) -> (Vec<BrickId>, NameMap) {
    let mut ids = Vec::with_capacity(specs.len());
    let mut map = NameMap::with_capacity(specs.len());
    for brick_spec in specs {
        let brick_id = build_brick(graph, brick_spec, unit);
        map.insert(brick_spec.name.clone(), brick_id);
        ids.push(brick_id);
    }
    (ids, map)
}

fn build_bricks_pass_b(
    graph: &mut Graph,
    specs: &[BrickSpec],
    ids: &[BrickId],
    hru_map: &NameMap,
    basin_map: &NameMap,
) -> Result<(), EngineError> {
    for (brick_spec, &brick_id) in specs.iter().zip(ids) {
        let container_id = graph.bricks.get(brick_id).container;
        let processes = build_processes(graph, container_id, &brick_spec.processes, hru_map, basin_map)?;
        graph.bricks.get_mut(brick_id).processes = processes;
    }
    Ok(())
}

fn resolve_container(name: &str, graph: &Graph, hru_map: &NameMap, basin_map: &NameMap) -> Result<ContainerId, EngineError> {
    let brick_id = hru_map
        .get(name)
        .or_else(|| basin_map.get(name))
        .ok_or_else(|| EngineError::NotFound(format!("no brick named '{name}' to target")))?;
    Ok(graph.bricks.get(*brick_id).container)
}

/// Resolves an [`OutputTarget`] to the flux target plus, for container targets,
/// the container whose `incoming_fluxes` must record this flux.
fn resolve_output_target(
    target: &OutputTarget,
    graph: &Graph,
    hru_map: &NameMap,
    basin_map: &NameMap,
) -> Result<(FluxTarget, Option<ContainerId>), EngineError> {
    match target {
        OutputTarget::Outlet => Ok((FluxTarget::Outlet, None)),
        OutputTarget::Named(name) => {
            let brick_id =
                *hru_map.get(name).ok_or_else(|| EngineError::NotFound(format!("no brick named '{name}' in this HRU")))?;
            let container_id = graph.bricks.get(brick_id).container;
            Ok((FluxTarget::Container(container_id), Some(container_id)))
        }
        OutputTarget::SubBasin(name) => {
            let brick_id =
                *basin_map.get(name).ok_or_else(|| EngineError::NotFound(format!("no sub-basin brick named '{name}'")))?;
            let container_id = graph.bricks.get(brick_id).container;
            Ok((FluxTarget::Container(container_id), Some(container_id)))
        }
    }
}

fn build_output_flux(
    graph: &mut Graph,
    label: String,
    source: Option<ContainerId>,
    out: &OutputSpec,
    hru_map: &NameMap,
    basin_map: &NameMap,
) -> Result<(FluxId, Option<ContainerId>), EngineError> {
    let (target, target_container) = resolve_output_target(&out.target, graph, hru_map, basin_map)?;
    let kind = if out.instantaneous {
        FluxKind::ToContainerInstantaneous
    } else {
        match target {
            FluxTarget::Outlet => FluxKind::ToOutlet,
            FluxTarget::Atmosphere => FluxKind::ToAtmosphere,
            FluxTarget::Container(_) => FluxKind::ToContainer,
            FluxTarget::None => FluxKind::Simple,
        }
    };
    let mut flux = Flux::new(label, kind, out.flux_type, target);
    if let Some(source_id) = source {
        flux = flux.with_source(source_id);
    }
    if out.is_static {
        flux = flux.mark_static();
    }
    let flux_id = graph.fluxes.push(flux);
    if let Some(container_id) = target_container {
        graph.containers.get_mut(container_id).incoming_fluxes.push(flux_id);
    }
    Ok((flux_id, target_container))
}

fn build_processes(
    graph: &mut Graph,
    container_id: ContainerId,
    specs: &[ProcessSpec],
    hru_map: &NameMap,
    basin_map: &NameMap,
) -> Result<Vec<ProcessId>, EngineError> {
    let mut ids = Vec::with_capacity(specs.len());
    for process_spec in specs {
        let target_container = match &process_spec.target_brick {
            Some(name) => Some(resolve_container(name, graph, hru_map, basin_map)?),
            None => None,
        };

        let mut outputs = Vec::with_capacity(process_spec.outputs.len());
        for (i, out) in process_spec.outputs.iter().enumerate() {
            let label = format!("{}_out{i}", process_spec.name);
            let (flux_id, _) = build_output_flux(graph, label, Some(container_id), out, hru_map, basin_map)?;
            outputs.push(flux_id);
        }

        let mut process = ProcessState::new(process_spec.name.clone(), container_id, process_spec.kind.clone()).with_outputs(outputs);
        if let Some(target_container) = target_container {
            process = process.with_target(target_container);
        }
        let is_overflow = matches!(process_spec.kind, ProcessKind::Overflow);
        let process_id = graph.processes.push(process);
        graph.containers.get_mut(container_id).outgoing_processes.push(process_id);
        if is_overflow {
            graph.containers.get_mut(container_id).overflow_process = Some(process_id);
        }
        ids.push(process_id);
    }
    Ok(ids)
}

fn build_splitters(
    graph: &mut Graph,
    specs: &[SplitterSpec],
    hru_map: &NameMap,
    basin_map: &NameMap,
) -> Result<Vec<SplitterId>, EngineError> {
    let mut ids = Vec::with_capacity(specs.len());
    for splitter_spec in specs {
        let mut outputs = Vec::with_capacity(splitter_spec.outputs.len());
        for (i, out) in splitter_spec.outputs.iter().enumerate() {
            let label = format!("{}_out{i}", splitter_spec.name);
            let (flux_id, _) = build_output_flux(graph, label, None, out, hru_map, basin_map)?;
            outputs.push(flux_id);
        }
        let splitter_id = graph.splitters.push(Splitter::new(splitter_spec.name.clone(), splitter_spec.kind.clone(), outputs));
        ids.push(splitter_id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brick::LandCoverType;
    use crate::flux::FluxType;
    use crate::process::ProcessKind;
    use crate::spec::{HruSpec, TimerSpec};
    use crate::solver::SolverKind;
    use crate::time::{StepUnit, TimeStep};

    fn timer_spec() -> TimerSpec {
        TimerSpec {
            start: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            step: TimeStep::new(1, StepUnit::Day),
        }
    }

    fn one_unit(id: i32, area: f64) -> HydroUnitRecord {
        HydroUnitRecord { id, area, elevation: 1000.0, land_cover_fractions: vec![("ground".to_string(), 1.0)] }
    }

    #[test]
    fn builds_a_single_storage_with_linear_outflow_to_outlet() {
        let hru_spec = HruSpec {
            bricks: vec![BrickSpec::new("store", BrickTypeSpec::Storage).with_capacity(100.0).with_process(
                ProcessSpec::new("outflow", ProcessKind::OutflowLinear { response_factor: 0.3 }, vec![OutputSpec::to_outlet()]),
            )],
            splitters: vec![],
        };
        let spec = ModelSpec::new(SolverKind::EulerExplicit, timer_spec()).with_default_hru(hru_spec);
        let units = vec![one_unit(1, 100.0)];

        let (graph, basin, hru_of_brick) = build(&spec, &units).unwrap();
        assert_eq!(basin.hrus.len(), 1);
        assert_eq!(basin.hrus[0].bricks.len(), 1);
        let brick_id = basin.hrus[0].bricks[0];
        assert_eq!(hru_of_brick.get(&brick_id), Some(&1));
        assert_eq!(graph.bricks.get(brick_id).processes.len(), 1);
        assert_eq!(basin.outlet_fluxes.len(), 1);
    }

    #[test]
    fn land_cover_fraction_is_pulled_from_the_hydro_units_record() {
        let hru_spec = HruSpec {
            bricks: vec![BrickSpec::new("ground", BrickTypeSpec::LandCover(LandCoverType::Ground))],
            splitters: vec![],
        };
        let spec = ModelSpec::new(SolverKind::EulerExplicit, timer_spec()).with_default_hru(hru_spec);
        let units = vec![one_unit(1, 100.0)];

        let (graph, basin, _) = build(&spec, &units).unwrap();
        let brick_id = basin.hrus[0].bricks[0];
        assert_eq!(graph.bricks.get(brick_id).land_cover_fraction(), Some(1.0));
    }

    #[test]
    fn process_output_named_to_a_basin_brick_wires_through() {
        let spec = ModelSpec::new(SolverKind::EulerExplicit, timer_spec())
            .with_sub_basin_brick(BrickSpec::new("routing", BrickTypeSpec::Storage).with_infinite(true))
            .with_default_hru(HruSpec {
                bricks: vec![BrickSpec::new("store", BrickTypeSpec::Storage).with_capacity(100.0).with_process(
                    ProcessSpec::new(
                        "outflow",
                        ProcessKind::OutflowLinear { response_factor: 0.3 },
                        vec![OutputSpec::to_sub_basin_brick("routing", FluxType::Water).is_static()],
                    )
                    .with_target("routing"),
                )],
                splitters: vec![],
            });
        let units = vec![one_unit(1, 100.0)];

        let (graph, basin, _) = build(&spec, &units).unwrap();
        let routing_id = basin.bricks[0];
        let routing_container = graph.bricks.get(routing_id).container;
        assert_eq!(graph.containers.get(routing_container).incoming_fluxes.len(), 1);

        let store_id = basin.hrus[0].bricks[0];
        let process_id = graph.bricks.get(store_id).processes[0];
        assert_eq!(graph.processes.get(process_id).target_container, Some(routing_container));
    }

    #[test]
    fn unresolved_target_brick_name_is_an_error() {
        let hru_spec = HruSpec {
            bricks: vec![BrickSpec::new("store", BrickTypeSpec::Storage).with_process(ProcessSpec::new(
                "outflow",
                ProcessKind::OutflowLinear { response_factor: 0.3 },
                vec![OutputSpec::to_brick("does_not_exist", FluxType::Water)],
            ))],
            splitters: vec![],
        };
        let spec = ModelSpec::new(SolverKind::EulerExplicit, timer_spec()).with_default_hru(hru_spec);
        let units = vec![one_unit(1, 100.0)];
        assert!(build(&spec, &units).is_err());
    }
}
