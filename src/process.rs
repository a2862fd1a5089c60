//! Process: a rate producer attached to one container (§4.3).

use crate::arena::Id;
use crate::container::ContainerId;
use crate::flux::FluxId;
use crate::forcing::ForcingValues;
use crate::graph::Graph;
use crate::time::day_of_year;
use chrono::NaiveDate;

pub type ProcessId = Id<ProcessState>;

/// Rate-producing variants (§4.3). Each carries exactly the parameters its formula
/// needs; a tagged union replaces the source's virtual `Process` hierarchy (§9).
#[derive(Debug, Clone)]
pub enum ProcessKind {
    /// `k * S`.
    OutflowLinear { response_factor: f64 },
    /// A fixed rate, independent of content.
    OutflowConstant { rate: f64 },
    /// The full stock released in one step.
    OutflowDirect,
    /// The stock minus whatever sibling processes of the same container already
    /// claimed this step — the "whatever remains" sink.
    OutflowRestDirect,
    /// Always reports zero; the container writes this process's rate directly
    /// during `apply_constraints` (§4.1 step 5).
    Overflow,
    /// `S * (1 - (S_target / C_target)^2)`.
    InfiltrationSocont,
    /// `min(S, beta * slope^0.5 * S^(5/3))`.
    RunoffSocont { beta: f64, slope: f64 },
    /// `PET * (S / C)^exponent`.
    EtSocont { exponent: f64 },
    /// `0` if `T < T_melt`, else `f_dd * (T - T_melt)`.
    MeltDegreeDay { degree_day_factor: f64, melt_threshold: f64 },
    /// `(T - T_melt) * (f + c_r * R)`.
    MeltDegreeDayAspect { degree_day_factor: f64, melt_threshold: f64, radiation_coefficient: f64 },
    /// Fixed rate in mm/day.
    SnowToIceConstant { rate: f64 },
    /// `c_basal * (1 + sin(2*pi*(doy - doy_ref)/365)) * S`.
    SnowToIceSwat { basal_rate: f64, southern_hemisphere: bool },
}

#[derive(Debug, Clone)]
pub struct ProcessState {
    pub label: String,
    pub container: ContainerId,
    /// "Needs target brick" link (§9): the downstream container some variants
    /// query for a fill ratio (infiltration, ET-against-capacity).
    pub target_container: Option<ContainerId>,
    pub outputs: Vec<FluxId>,
    pub kind: ProcessKind,
}

impl ProcessState {
    pub fn new(label: impl Into<String>, container: ContainerId, kind: ProcessKind) -> Self {
        Self { label: label.into(), container, target_container: None, outputs: Vec::new(), kind }
    }

    pub fn with_target(mut self, target: ContainerId) -> Self {
        self.target_container = Some(target);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<FluxId>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self.kind, ProcessKind::Overflow)
    }
}

/// `rates() -> Vec<f64>` (§4.3): one rate per output flux, mm/day, independent of
/// `Δt`. The caller is expected to have clamped the source container to `>= 0`
/// already; an empty container returns zeros without evaluating the physics.
pub fn rates(
    graph: &Graph,
    process_id: ProcessId,
    forcing: &ForcingValues,
    date: NaiveDate,
    dt: f64,
    siblings_already_routed: f64,
) -> Vec<f64> {
    let process = graph.processes.get(process_id);
    let n_outputs = process.outputs.len().max(1);
    let container = graph.containers.get(process.container);
    let s = container.effective_content();

    if s <= 0.0 && !matches!(process.kind, ProcessKind::Overflow) {
        return vec![0.0; n_outputs];
    }

    let rate = match &process.kind {
        ProcessKind::OutflowLinear { response_factor } => response_factor * s,
        ProcessKind::OutflowConstant { rate } => rate.min(s / dt.max(1e-12)),
        ProcessKind::OutflowDirect => s / dt.max(1e-12),
        ProcessKind::OutflowRestDirect => ((s - siblings_already_routed).max(0.0)) / dt.max(1e-12),
        ProcessKind::Overflow => 0.0,
        ProcessKind::InfiltrationSocont => {
            let (s_target, c_target) = target_fill(graph, process.target_container);
            let ratio = if c_target > 0.0 { (s_target / c_target).min(1.0) } else { 0.0 };
            s * (1.0 - ratio * ratio)
        }
        ProcessKind::RunoffSocont { beta, slope } => {
            let candidate = beta * slope.sqrt() * s.powf(5.0 / 3.0);
            candidate.min(s / dt.max(1e-12))
        }
        ProcessKind::EtSocont { exponent } => {
            let capacity = container.capacity.unwrap_or(s).max(1e-12);
            forcing.pet * (s / capacity).min(1.0).powf(*exponent)
        }
        ProcessKind::MeltDegreeDay { degree_day_factor, melt_threshold } => {
            if forcing.temperature < *melt_threshold {
                0.0
            } else {
                degree_day_factor * (forcing.temperature - melt_threshold)
            }
        }
        ProcessKind::MeltDegreeDayAspect { degree_day_factor, melt_threshold, radiation_coefficient } => {
            if forcing.temperature < *melt_threshold {
                0.0
            } else {
                let radiation = forcing.radiation.unwrap_or(0.0);
                (forcing.temperature - melt_threshold) * (degree_day_factor + radiation_coefficient * radiation)
            }
        }
        ProcessKind::SnowToIceConstant { rate } => *rate,
        ProcessKind::SnowToIceSwat { basal_rate, southern_hemisphere } => {
            let doy_ref = if *southern_hemisphere { 264.0 } else { 81.0 };
            let doy = day_of_year(date) as f64;
            basal_rate * (1.0 + (2.0 * std::f64::consts::PI * (doy - doy_ref) / 365.0).sin()) * s
        }
    };

    let rate = rate.max(0.0);
    vec![rate / n_outputs as f64; n_outputs]
}

fn target_fill(graph: &Graph, target: Option<ContainerId>) -> (f64, f64) {
    match target {
        Some(id) => {
            let container = graph.containers.get(id);
            (container.effective_content(), container.capacity.unwrap_or(0.0))
        }
        None => (0.0, 0.0),
    }
}
