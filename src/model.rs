//! Top-level `Model` API: wires spec -> builder -> processor -> solver ->
//! action manager -> timer behind `run()`/`step()` (§2 control flow).
//!
//! Grounded on `gr6j-core::model::GR6JModel::run`/`step`: a struct holding the
//! built state plus a step cursor, `step()` advancing one day and returning the
//! per-step output, `run()` looping `step()` until the cursor is exhausted, and
//! the same `debug!`/`info!` call sites around step boundaries.

use crate::action::{Action, ActionsManager};
use crate::brick::BrickId;
use crate::builder;
use crate::error::{EngineError, StepError};
use crate::forcing::{ForcingValues, ForcingsSource, HydroUnitRecord, ResultsSink};
use crate::graph::Graph;
use crate::processor;
use crate::solver::{self, SolverContext, SolverKind};
use crate::spec::ModelSpec;
use crate::splitter;
use crate::subbasin::SubBasin;
use crate::time::Timer;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::HashMap;

/// The built, runnable model: graph + sub-basin + solver context + action
/// manager + time cursor (§2, §6 "Model API").
pub struct Model {
    graph: Graph,
    basin: SubBasin,
    hru_of_brick: HashMap<BrickId, i32>,
    solver_kind: SolverKind,
    solver_ctx: SolverContext,
    timer: Timer,
    actions: ActionsManager,
}

impl Model {
    /// Builds the graph from `spec`/`units` and assembles the solver context
    /// (§4.8, §4.9). Does not read any forcing data yet.
    pub fn new(spec: &ModelSpec, units: &[HydroUnitRecord]) -> Result<Self, EngineError> {
        let (graph, basin, hru_of_brick) = builder::build(spec, units)?;
        let solver_ctx = solver::build_context(&graph, &basin);
        let timer = Timer::new(spec.timer.start, spec.timer.end, spec.timer.step)?;

        info!(
            "model ready: {} HRUs, {} solver-handled bricks, run period {}-{}",
            basin.hrus.len(),
            solver_ctx.bricks.len(),
            timer.start,
            timer.end
        );

        Ok(Self { graph, basin, hru_of_brick, solver_kind: spec.solver, solver_ctx, timer, actions: ActionsManager::new() })
    }

    /// Registers an action (§4.11). Order of registration is the order actions
    /// run on a shared trigger date.
    pub fn add_action(&mut self, action: Box<dyn Action>) {
        self.actions.add(action);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn basin(&self) -> &SubBasin {
        &self.basin
    }

    pub fn current_date(&self) -> NaiveDate {
        self.timer.current_date()
    }

    pub fn is_over(&self) -> bool {
        self.timer.is_over()
    }

    fn forcing_index(forcings: &dyn ForcingsSource, date: NaiveDate) -> Result<usize, EngineError> {
        forcings
            .dates()
            .iter()
            .position(|&d| d == date)
            .ok_or_else(|| EngineError::NotFound(format!("forcings source has no entry for {date}")))
    }

    /// One step's worth of work: actions, splitters, direct bricks, solver,
    /// outlet collection, logger sample (§2 control flow). Does not advance the
    /// timer; `step()`/`run()` do that once this succeeds.
    fn advance(&mut self, date: NaiveDate, forcings: &dyn ForcingsSource, sink: &mut dyn ResultsSink) -> Result<(), EngineError> {
        self.actions.on_date(date, &mut self.graph, &mut self.basin)?;

        let step_index = Self::forcing_index(forcings, date)?;
        let mut forcing_by_hru: HashMap<i32, ForcingValues> = HashMap::with_capacity(self.basin.hrus.len());
        for hru in &self.basin.hrus {
            forcing_by_hru.insert(hru.id, forcings.values_at(hru.id, step_index)?);
        }

        for hru in &self.basin.hrus {
            let forcing = forcing_by_hru[&hru.id];
            for &splitter_id in &hru.splitters {
                splitter::compute(&mut self.graph, splitter_id, &forcing);
            }
        }

        let dt = self.timer.step.in_days();
        processor::run_direct_bricks(&mut self.graph, &self.basin, &forcing_by_hru, date, dt)?;

        let forcing_of_brick: HashMap<BrickId, ForcingValues> = self
            .solver_ctx
            .bricks
            .iter()
            .filter_map(|&brick_id| {
                self.hru_of_brick.get(&brick_id).and_then(|hru_id| forcing_by_hru.get(hru_id)).map(|&f| (brick_id, f))
            })
            .collect();
        solver::solve(self.solver_kind, &mut self.graph, &self.solver_ctx, &forcing_of_brick, date, dt)?;

        self.basin.compute_outlet_discharge(&self.graph);
        let outlet = self.basin.outlet_total();
        debug!("step {date}: outlet = {outlet}");
        sink.record_aggregated(date, "outlet", outlet)?;

        Ok(())
    }

    /// Advances one step and returns its outlet discharge. On failure the
    /// timer is left un-advanced, matching the "last successful step
    /// committed" rule (§5).
    pub fn step(&mut self, forcings: &dyn ForcingsSource, sink: &mut dyn ResultsSink) -> Result<f64, StepError> {
        if self.timer.is_over() {
            return Err(StepError::new(
                self.timer.current_date(),
                EngineError::InvalidArgument("the simulation end date was already reached".to_string()),
            ));
        }
        let date = self.timer.current_date();
        self.advance(date, forcings, sink).map_err(|e| StepError::new(date, e))?;
        let outlet = self.basin.outlet_total();
        self.timer.advance().map_err(|e| StepError::new(date, e))?;
        Ok(outlet)
    }

    /// Runs every step from the timer's start to its end, inclusive.
    pub fn run(&mut self, forcings: &dyn ForcingsSource, sink: &mut dyn ResultsSink) -> Result<(), StepError> {
        forcings.check_covers(self.timer.start, self.timer.end).map_err(|e| StepError::new(self.timer.start, e))?;
        info!("starting run: {} -> {}", self.timer.start, self.timer.end);
        while !self.timer.is_over() {
            self.step(forcings, sink)?;
        }
        info!("run complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::{HydroUnitRecord, InMemoryForcingsSource, InMemoryResultsSink};
    use crate::process::ProcessKind;
    use crate::spec::{BrickSpec, BrickTypeSpec, HruSpec, OutputSpec, ProcessSpec, TimerSpec};
    use crate::time::{StepUnit, TimeStep};
    use float_cmp::{approx_eq, F64Margin};

    fn single_reservoir_spec(start: NaiveDate, end: NaiveDate) -> ModelSpec {
        let hru_spec = HruSpec {
            bricks: vec![BrickSpec::new("store", BrickTypeSpec::Storage).with_capacity(1000.0).with_process(
                ProcessSpec::new("outflow", ProcessKind::OutflowLinear { response_factor: 0.3 }, vec![OutputSpec::to_outlet()]),
            )],
            splitters: vec![],
        };
        ModelSpec::new(SolverKind::EulerExplicit, TimerSpec { start, end, step: TimeStep::new(1, StepUnit::Day) })
            .with_default_hru(hru_spec)
    }

    fn one_unit() -> HydroUnitRecord {
        HydroUnitRecord { id: 1, area: 100.0, elevation: 500.0, land_cover_fractions: vec![("ground".to_string(), 1.0)] }
    }

    fn flat_forcings(dates: Vec<NaiveDate>, precipitation: f64) -> InMemoryForcingsSource {
        let count = dates.len();
        InMemoryForcingsSource::new(dates)
            .with_hru(1, vec![ForcingValues { precipitation, temperature: 5.0, pet: 0.0, radiation: None }; count])
    }

    #[test]
    fn run_drains_a_reservoir_and_records_outlet() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let spec = single_reservoir_spec(start, end);
        let units = vec![one_unit()];
        let mut model = Model::new(&spec, &units).unwrap();

        let dates: Vec<NaiveDate> = (0..5).map(|d| start + chrono::Duration::days(d)).collect();
        let forcings = flat_forcings(dates, 0.0);
        let mut sink = InMemoryResultsSink::default();

        model.run(&forcings, &mut sink).unwrap();
        assert!(model.is_over());
        let outlet_series = &sink.aggregated["outlet"];
        assert_eq!(outlet_series.len(), 5);
        assert!(outlet_series[0].1 > 0.0);
    }

    #[test]
    fn stepping_past_the_end_date_is_an_error() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let spec = single_reservoir_spec(start, end);
        let units = vec![one_unit()];
        let mut model = Model::new(&spec, &units).unwrap();
        let forcings = flat_forcings(vec![start], 0.0);
        let mut sink = InMemoryResultsSink::default();

        model.step(&forcings, &mut sink).unwrap();
        assert!(model.step(&forcings, &mut sink).is_err());
    }

    #[test]
    fn land_cover_change_action_fires_mid_run() {
        use crate::action::{LandCoverChangeAction, LandCoverChangeEntry};
        use crate::brick::LandCoverType;

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let hru_spec = HruSpec {
            bricks: vec![
                BrickSpec::new("ground", BrickTypeSpec::LandCover(LandCoverType::Ground)).with_area_fraction(0.5),
                BrickSpec::new("glacier", BrickTypeSpec::LandCover(LandCoverType::Glacier)).with_area_fraction(0.5),
            ],
            splitters: vec![],
        };
        let spec = ModelSpec::new(SolverKind::EulerExplicit, TimerSpec { start, end, step: TimeStep::new(1, StepUnit::Day) })
            .with_default_hru(hru_spec);
        let units = vec![HydroUnitRecord {
            id: 1,
            area: 1000.0,
            elevation: 500.0,
            land_cover_fractions: vec![("ground".to_string(), 0.5), ("glacier".to_string(), 0.5)],
        }];
        let mut model = Model::new(&spec, &units).unwrap();
        model.add_action(Box::new(LandCoverChangeAction::new(
            "shrink-glacier",
            vec![LandCoverChangeEntry { date: start, hru_id: 1, land_cover_name: "glacier".to_string(), new_area: 200.0 }],
        )));

        let dates: Vec<NaiveDate> = (0..3).map(|d| start + chrono::Duration::days(d)).collect();
        let forcings = flat_forcings(dates, 0.0);
        let mut sink = InMemoryResultsSink::default();
        model.run(&forcings, &mut sink).unwrap();

        let glacier_brick = model.basin().hrus[0].bricks[1];
        let fraction = model.graph().bricks.get(glacier_brick).land_cover_fraction().unwrap();
        assert!(approx_eq!(f64, fraction, 0.2, F64Margin::default().epsilon(1e-9)));
    }
}
