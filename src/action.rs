//! Action manager: date-triggered structural/parameter mutations that run
//! between time steps (§4.11, §4.11.1).
//!
//! Two scheduling flavours, grounded on `original_source/core/src/actions/
//! ActionsManager.cpp`: sporadic actions hold a sorted `(date, ...)` schedule
//! with a single advancing cursor; recursive actions fire whenever the current
//! date's (month, day) matches a trigger, with `month == 0` meaning "every
//! month, this day" (used by the snow->ice transformation's annual trigger
//! when a basin spans both hemispheres' melt seasons).

use crate::brick::{BrickId, BrickKind};
use crate::error::EngineError;
use crate::graph::Graph;
use crate::subbasin::SubBasin;
use chrono::{Datelike, NaiveDate};
use log::info;
use std::collections::HashMap;
use std::fmt;

/// A scheduled mutation. `apply_due` both decides whether today is the day and,
/// if so, performs the mutation — the two are inseparable for sporadic actions,
/// which must consume every due entry in one call, not just the first.
pub trait Action: fmt::Debug {
    fn label(&self) -> &str;
    fn apply_due(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<bool, EngineError>;
}

#[derive(Debug, Default)]
pub struct ActionsManager {
    actions: Vec<Box<dyn Action>>,
}

impl ActionsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    /// Runs every action's due check for `date`, in registration order (§4.11:
    /// "actions run between time steps; they must not observe partial
    /// integrations" — the caller must invoke this only between `finalize()`
    /// calls, never mid-solve).
    pub fn on_date(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<(), EngineError> {
        for action in &mut self.actions {
            if action.apply_due(date, graph, basin)? {
                info!("action '{}' fired on {date}", action.label());
            }
        }
        Ok(())
    }
}

/// A recursive (month, day) trigger. `month == 0` matches every month.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveTrigger {
    pub month: u32,
    pub day: u32,
}

impl RecursiveTrigger {
    pub fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        date.day() == self.day && (self.month == 0 || date.month() == self.month)
    }
}

fn find_brick_by_label(graph: &Graph, bricks: &[BrickId], label: &str) -> Option<BrickId> {
    bricks.iter().copied().find(|&id| graph.bricks.get(id).label == label)
}

/// Re-normalises every other land-cover brick in `land_cover_ids` so fractions
/// sum to 1 after `changed` was just set to `new_fraction`, proportionally to
/// their previous shares (§4.11 item 1).
fn renormalise_siblings(graph: &mut Graph, land_cover_ids: &[BrickId], changed: BrickId, new_fraction: f64) -> Result<(), EngineError> {
    let total_other: f64 = land_cover_ids
        .iter()
        .filter(|&&id| id != changed)
        .filter_map(|&id| graph.bricks.get(id).land_cover_fraction())
        .sum();
    let remaining = (1.0 - new_fraction).max(0.0);
    if total_other <= 1e-12 {
        return Ok(());
    }
    for &id in land_cover_ids {
        if id == changed {
            continue;
        }
        if let Some(fraction) = graph.bricks.get(id).land_cover_fraction() {
            graph.bricks.get_mut(id).set_land_cover_fraction(fraction / total_other * remaining)?;
        }
    }
    Ok(())
}

/// One (date, HRU, land cover, new area) entry of a land-cover-change schedule.
#[derive(Debug, Clone)]
pub struct LandCoverChangeEntry {
    pub date: NaiveDate,
    pub hru_id: i32,
    pub land_cover_name: String,
    pub new_area: f64,
}

/// §4.11 item 1: sporadic, sorted by date, single cursor.
#[derive(Debug)]
pub struct LandCoverChangeAction {
    label: String,
    schedule: Vec<LandCoverChangeEntry>,
    cursor: usize,
}

impl LandCoverChangeAction {
    pub fn new(label: impl Into<String>, mut schedule: Vec<LandCoverChangeEntry>) -> Self {
        schedule.sort_by_key(|e| e.date);
        Self { label: label.into(), schedule, cursor: 0 }
    }

    fn apply_entry(entry: &LandCoverChangeEntry, graph: &mut Graph, basin: &SubBasin) -> Result<(), EngineError> {
        let hru = basin
            .hru(entry.hru_id)
            .ok_or_else(|| EngineError::NotFound(format!("no HRU {} for a land-cover change", entry.hru_id)))?;
        let land_cover_ids: Vec<BrickId> = hru.land_cover_bricks(graph).collect();
        let brick_id = find_brick_by_label(graph, &land_cover_ids, &entry.land_cover_name).ok_or_else(|| {
            EngineError::NotFound(format!("no land cover '{}' in HRU {}", entry.land_cover_name, entry.hru_id))
        })?;
        let new_fraction = (entry.new_area / hru.area).clamp(0.0, 1.0);

        graph.bricks.get_mut(brick_id).set_land_cover_fraction(new_fraction)?;
        renormalise_siblings(graph, &land_cover_ids, brick_id, new_fraction)
    }
}

impl Action for LandCoverChangeAction {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply_due(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<bool, EngineError> {
        let mut fired = false;
        while self.cursor < self.schedule.len() && self.schedule[self.cursor].date <= date {
            let entry = self.schedule[self.cursor].clone();
            Self::apply_entry(&entry, graph, basin)?;
            self.cursor += 1;
            fired = true;
        }
        Ok(fired)
    }
}

/// One retreat step of a glacier's area/volume depletion curve, ordered from
/// least retreated (`row 0`, the initial state) to most retreated.
#[derive(Debug, Clone, Copy)]
pub struct GlacierTableRow {
    pub area: f64,
    pub volume: f64,
}

/// §4.11 item 2. Tracks its own initial water-equivalent per HRU, populated by
/// [`init`](Self::init) before the first step.
#[derive(Debug)]
pub struct GlacierEvolutionAreaScaling {
    label: String,
    trigger: RecursiveTrigger,
    land_cover_name: String,
    ice_brick_name: String,
    ice_density: f64,
    tables: HashMap<i32, Vec<GlacierTableRow>>,
    initial_we: HashMap<i32, f64>,
}

impl GlacierEvolutionAreaScaling {
    pub fn new(
        label: impl Into<String>,
        trigger_day: u32,
        land_cover_name: impl Into<String>,
        ice_brick_name: impl Into<String>,
        ice_density: f64,
        tables: HashMap<i32, Vec<GlacierTableRow>>,
    ) -> Self {
        Self {
            label: label.into(),
            trigger: RecursiveTrigger::new(0, trigger_day),
            land_cover_name: land_cover_name.into(),
            ice_brick_name: ice_brick_name.into(),
            ice_density,
            tables,
            initial_we: HashMap::new(),
        }
    }

    fn ice_container(&self, graph: &Graph, hru_bricks: &[BrickId]) -> Option<crate::container::ContainerId> {
        let brick_id = find_brick_by_label(graph, hru_bricks, &self.ice_brick_name)?;
        match graph.bricks.get(brick_id).kind {
            BrickKind::Glacier { ice_container, .. } => Some(ice_container),
            _ => None,
        }
    }

    /// Sets every HRU's glacier fraction and ice content to the table's row 0 and
    /// records the initial water-equivalent used by `apply` to compute retreat.
    pub fn init(&mut self, graph: &mut Graph, basin: &SubBasin) -> Result<(), EngineError> {
        for hru in &basin.hrus {
            let Some(table) = self.tables.get(&hru.id) else { continue };
            let Some(row0) = table.first().copied() else { continue };
            let land_cover_ids: Vec<BrickId> = hru.land_cover_bricks(graph).collect();
            let land_cover_id = find_brick_by_label(graph, &land_cover_ids, &self.land_cover_name).ok_or_else(|| {
                EngineError::NotFound(format!("no land cover '{}' in HRU {}", self.land_cover_name, hru.id))
            })?;
            let fraction = (row0.area / hru.area).clamp(0.0, 1.0);
            graph.bricks.get_mut(land_cover_id).set_land_cover_fraction(fraction)?;
            renormalise_siblings(graph, &land_cover_ids, land_cover_id, fraction)?;

            let ice_content = if row0.area > 0.0 { row0.volume * self.ice_density / row0.area } else { 0.0 };
            if let Some(ice_container_id) = self.ice_container(graph, &hru.bricks) {
                graph.containers.get_mut(ice_container_id).reset(ice_content);
            }
            self.initial_we.insert(hru.id, row0.area * ice_content);
        }
        Ok(())
    }

    fn pick_row<'a>(table: &'a [GlacierTableRow], retreat_fraction: f64) -> &'a GlacierTableRow {
        let index = (retreat_fraction.clamp(0.0, 1.0) * (table.len() - 1) as f64).round() as usize;
        &table[index.min(table.len() - 1)]
    }
}

impl Action for GlacierEvolutionAreaScaling {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply_due(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<bool, EngineError> {
        if !self.trigger.matches(date) {
            return Ok(false);
        }
        for hru in &basin.hrus {
            let Some(table) = self.tables.get(&hru.id) else { continue };
            let Some(&initial_we) = self.initial_we.get(&hru.id) else { continue };
            let land_cover_ids: Vec<BrickId> = hru.land_cover_bricks(graph).collect();
            let Some(land_cover_id) = find_brick_by_label(graph, &land_cover_ids, &self.land_cover_name) else { continue };
            let Some(ice_container_id) = self.ice_container(graph, &hru.bricks) else { continue };

            let current_fraction = graph.bricks.get(land_cover_id).land_cover_fraction().unwrap_or(0.0);
            let current_area = current_fraction * hru.area;
            let current_ice_content = graph.containers.get(ice_container_id).content();
            let current_we = current_area * current_ice_content;

            if current_we <= 0.0 || initial_we <= 0.0 {
                graph.bricks.get_mut(land_cover_id).set_land_cover_fraction(0.0)?;
                renormalise_siblings(graph, &land_cover_ids, land_cover_id, 0.0)?;
                graph.containers.get_mut(ice_container_id).reset(0.0);
                continue;
            }

            let retreat_fraction = (initial_we - current_we) / initial_we;
            let row = *Self::pick_row(table, retreat_fraction);
            let new_fraction = (row.area / hru.area).clamp(0.0, 1.0);
            let new_ice_content = if row.area > 0.0 { row.volume * self.ice_density / row.area } else { 0.0 };

            graph.bricks.get_mut(land_cover_id).set_land_cover_fraction(new_fraction)?;
            renormalise_siblings(graph, &land_cover_ids, land_cover_id, new_fraction)?;
            graph.containers.get_mut(ice_container_id).reset(new_ice_content);
        }
        Ok(true)
    }
}

/// §4.11 item 3: moves all snow water-equivalent into the paired glacier's ice
/// container on a fixed calendar date.
#[derive(Debug)]
pub struct GlacierSnowToIceTransformation {
    label: String,
    trigger: RecursiveTrigger,
    snow_brick_name: String,
    ice_brick_name: String,
}

impl GlacierSnowToIceTransformation {
    pub fn new(
        label: impl Into<String>,
        trigger_month: u32,
        trigger_day: u32,
        snow_brick_name: impl Into<String>,
        ice_brick_name: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            trigger: RecursiveTrigger::new(trigger_month, trigger_day),
            snow_brick_name: snow_brick_name.into(),
            ice_brick_name: ice_brick_name.into(),
        }
    }
}

impl Action for GlacierSnowToIceTransformation {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply_due(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<bool, EngineError> {
        if !self.trigger.matches(date) {
            return Ok(false);
        }
        for hru in &basin.hrus {
            let Some(snow_brick_id) = find_brick_by_label(graph, &hru.bricks, &self.snow_brick_name) else { continue };
            let Some(ice_brick_id) = find_brick_by_label(graph, &hru.bricks, &self.ice_brick_name) else { continue };
            let snow_container_id = match graph.bricks.get(snow_brick_id).kind {
                BrickKind::Snowpack { snow_container } => snow_container,
                _ => continue,
            };
            let ice_container_id = match graph.bricks.get(ice_brick_id).kind {
                BrickKind::Glacier { ice_container, .. } => ice_container,
                _ => continue,
            };

            let moved = graph.containers.get(snow_container_id).content();
            if moved <= 0.0 {
                continue;
            }
            graph.containers.get_mut(snow_container_id).reset(0.0);
            let current_ice = graph.containers.get(ice_container_id).content();
            graph.containers.get_mut(ice_container_id).reset(current_ice + moved);
        }
        Ok(true)
    }
}

/// §4.11.1: same external shape as [`GlacierEvolutionAreaScaling`], but the
/// per-elevation-band mass-redistribution rule was never supplied in the
/// source, so `apply_due` always fails once triggered.
#[derive(Debug)]
pub struct GlacierEvolutionDeltaH {
    label: String,
    trigger: RecursiveTrigger,
}

impl GlacierEvolutionDeltaH {
    pub fn new(label: impl Into<String>, trigger_day: u32) -> Self {
        Self { label: label.into(), trigger: RecursiveTrigger::new(0, trigger_day) }
    }
}

impl Action for GlacierEvolutionDeltaH {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply_due(&mut self, date: NaiveDate, _graph: &mut Graph, _basin: &mut SubBasin) -> Result<bool, EngineError> {
        if !self.trigger.matches(date) {
            return Ok(false);
        }
        Err(EngineError::NotImplemented(
            "glacier evolution by delta-h has no elevation-band mass-redistribution rule".to_string(),
        ))
    }
}

/// §4.11.1: a pluggable transport rule moving snow between HRUs of the same
/// sub-basin. No implementation ships with this crate.
pub trait SnowRedistributionRule: fmt::Debug {
    fn redistribute(&self, graph: &mut Graph, basin: &mut SubBasin, date: NaiveDate) -> Result<(), EngineError>;
}

/// §4.11.1: with `transport_rule: None` (the only state reachable from the
/// public constructor today) `apply_due` is a silent no-op — the source never
/// even stubs a throwing body for this action, it simply has no translation
/// unit.
#[derive(Debug)]
pub struct SnowRedistribution {
    label: String,
    trigger: RecursiveTrigger,
    transport_rule: Option<Box<dyn SnowRedistributionRule>>,
}

impl SnowRedistribution {
    pub fn new(label: impl Into<String>, trigger_month: u32, trigger_day: u32) -> Self {
        Self { label: label.into(), trigger: RecursiveTrigger::new(trigger_month, trigger_day), transport_rule: None }
    }

    pub fn with_rule(mut self, rule: Box<dyn SnowRedistributionRule>) -> Self {
        self.transport_rule = Some(rule);
        self
    }
}

impl Action for SnowRedistribution {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply_due(&mut self, date: NaiveDate, graph: &mut Graph, basin: &mut SubBasin) -> Result<bool, EngineError> {
        if !self.trigger.matches(date) {
            return Ok(false);
        }
        match &self.transport_rule {
            Some(rule) => {
                rule.redistribute(graph, basin, date)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
