//! The model graph: arenas for every component kind (§9 "pointer graph → arenas").
//!
//! A single `Graph` owns every brick, container, process, flux and splitter for the
//! whole model. Everything else (HRUs, the sub-basin, the processor, the solver,
//! actions) operates on `&mut Graph` plus the handles it hands out.

use crate::arena::Arena;
use crate::brick::Brick;
use crate::container::WaterContainer;
use crate::flux::Flux;
use crate::process::ProcessState;
use crate::splitter::Splitter;

#[derive(Debug, Default)]
pub struct Graph {
    pub containers: Arena<WaterContainer>,
    pub processes: Arena<ProcessState>,
    pub fluxes: Arena<Flux>,
    pub bricks: Arena<Brick>,
    pub splitters: Arena<Splitter>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }
}
