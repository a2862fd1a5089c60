//! Declarative model specification (§6, §9.1): plain Rust structs built by a
//! constructor/builder call chain, the same "already-parsed values" shape as
//! `gr6j-core::inputs::GR6JModelInputs` — parsing an on-disk format is out of
//! scope (§1), this is the in-memory shape that format would deserialise into.

use crate::flux::FluxType;
use crate::process::ProcessKind;
use crate::solver::SolverKind;
use crate::splitter::SplitterKind;
use crate::time::TimeStep;
use chrono::NaiveDate;

/// Where a process/splitter output is routed (§4.8 step 2).
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// A named brick/splitter in the same HRU.
    Named(String),
    /// A named brick/splitter at sub-basin level.
    SubBasin(String),
    /// The literal `"outlet"`.
    Outlet,
}

#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub target: OutputTarget,
    pub flux_type: FluxType,
    pub instantaneous: bool,
    pub is_static: bool,
}

impl OutputSpec {
    pub fn to_brick(name: impl Into<String>, flux_type: FluxType) -> Self {
        Self { target: OutputTarget::Named(name.into()), flux_type, instantaneous: false, is_static: false }
    }

    pub fn to_outlet() -> Self {
        Self { target: OutputTarget::Outlet, flux_type: FluxType::Water, instantaneous: false, is_static: false }
    }

    pub fn to_sub_basin_brick(name: impl Into<String>, flux_type: FluxType) -> Self {
        Self { target: OutputTarget::SubBasin(name.into()), flux_type, instantaneous: false, is_static: false }
    }

    pub fn instantaneous(mut self) -> Self {
        self.instantaneous = true;
        self
    }

    pub fn is_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub kind: ProcessKind,
    /// Name of the downstream container this process's rate law queries
    /// ("needs target brick", §9).
    pub target_brick: Option<String>,
    pub outputs: Vec<OutputSpec>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, kind: ProcessKind, outputs: Vec<OutputSpec>) -> Self {
        Self { name: name.into(), kind, target_brick: None, outputs }
    }

    pub fn with_target(mut self, target_brick: impl Into<String>) -> Self {
        self.target_brick = Some(target_brick.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrickTypeSpec {
    Storage,
    LandCover(crate::brick::LandCoverType),
    Snowpack,
    Glacier,
    GenericSurface,
}

#[derive(Debug, Clone)]
pub struct BrickSpec {
    pub name: String,
    pub brick_type: BrickTypeSpec,
    pub capacity: Option<f64>,
    pub infinite: bool,
    pub initial_content: f64,
    pub area_fraction: Option<f64>,
    pub no_melt_when_snow_cover: bool,
    pub processes: Vec<ProcessSpec>,
}

impl BrickSpec {
    pub fn new(name: impl Into<String>, brick_type: BrickTypeSpec) -> Self {
        Self {
            name: name.into(),
            brick_type,
            capacity: None,
            infinite: false,
            initial_content: 0.0,
            area_fraction: None,
            no_melt_when_snow_cover: false,
            processes: Vec::new(),
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

    pub fn with_area_fraction(mut self, fraction: f64) -> Self {
        self.area_fraction = Some(fraction);
        self
    }

    pub fn with_process(mut self, process: ProcessSpec) -> Self {
        self.processes.push(process);
        self
    }

    pub fn with_no_melt_when_snow_cover(mut self, value: bool) -> Self {
        self.no_melt_when_snow_cover = value;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SplitterSpec {
    pub name: String,
    pub kind: SplitterKind,
    pub outputs: Vec<OutputSpec>,
}

impl SplitterSpec {
    pub fn new(name: impl Into<String>, kind: SplitterKind, outputs: Vec<OutputSpec>) -> Self {
        Self { name: name.into(), kind, outputs }
    }
}

/// One HRU's spec: bricks + splitters, keyed to its id/area via `HydroUnitRecord`
/// at build time.
#[derive(Debug, Clone, Default)]
pub struct HruSpec {
    pub bricks: Vec<BrickSpec>,
    pub splitters: Vec<SplitterSpec>,
}

#[derive(Debug, Clone)]
pub struct TimerSpec {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub step: TimeStep,
}

/// Top-level model specification (§6).
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub solver: SolverKind,
    pub timer: TimerSpec,
    /// Per-HRU spec, applied identically to every HRU in the hydro-units source
    /// unless overridden per id.
    pub default_hru: HruSpec,
    pub hru_overrides: std::collections::HashMap<i32, HruSpec>,
    pub sub_basin_bricks: Vec<BrickSpec>,
}

impl ModelSpec {
    pub fn new(solver: SolverKind, timer: TimerSpec) -> Self {
        Self {
            solver,
            timer,
            default_hru: HruSpec::default(),
            hru_overrides: std::collections::HashMap::new(),
            sub_basin_bricks: Vec::new(),
        }
    }

    pub fn with_default_hru(mut self, hru: HruSpec) -> Self {
        self.default_hru = hru;
        self
    }

    pub fn with_hru_override(mut self, hru_id: i32, hru: HruSpec) -> Self {
        self.hru_overrides.insert(hru_id, hru);
        self
    }

    pub fn with_sub_basin_brick(mut self, brick: BrickSpec) -> Self {
        self.sub_basin_bricks.push(brick);
        self
    }

    pub fn hru_spec(&self, hru_id: i32) -> &HruSpec {
        self.hru_overrides.get(&hru_id).unwrap_or(&self.default_hru)
    }
}
