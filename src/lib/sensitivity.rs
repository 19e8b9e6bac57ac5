use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::errors::*;
use crate::params::ModelParameters;
use crate::runner::{cross_validate, SimulationRunner, Summary, DEFAULT_EXTINCTION_THRESHOLD};
use crate::sir::Stepper;

/// One (β, γ) cell of a sensitivity grid.
///
/// Equality and hashing are on the bit patterns, so each distinct float pair
/// is its own key. Negative zero is folded into zero.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct GridPoint {
    pub beta: f64,
    pub gamma: f64,
}

impl GridPoint {
    pub fn new(beta: f64, gamma: f64) -> Self {
        Self { beta: fold_zero(beta), gamma: fold_zero(gamma) }
    }

    fn key(&self) -> (u64, u64) {
        (fold_zero(self.beta).to_bits(), fold_zero(self.gamma).to_bits())
    }
}

fn fold_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

impl PartialEq for GridPoint {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GridPoint { }

impl Hash for GridPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum CellOutcome {
    Completed {
        summary: Summary,
        warnings: Vec<Warning>,
    },
    /// The cell's parameters were rejected; the rest of the sweep is unaffected.
    Failed {
        error: Error,
    },
}

impl CellOutcome {
    pub fn summary(&self) -> Option<&Summary> {
        match self {
            CellOutcome::Completed { summary, .. } => Some(summary),
            CellOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        match self {
            CellOutcome::Failed { .. } => true,
            _ => false,
        }
    }
}

/// Summaries keyed by grid cell. Iteration follows grid order (β-major), but
/// consumers are expected to look cells up by parameter pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityGridResult {
    cells: IndexMap<GridPoint, CellOutcome>,
}

impl SensitivityGridResult {
    pub fn get(&self, beta: f64, gamma: f64) -> Option<&CellOutcome> {
        self.cells.get(&GridPoint::new(beta, gamma))
    }

    pub fn summary(&self, beta: f64, gamma: f64) -> Option<&Summary> {
        self.get(beta, gamma).and_then(|outcome| outcome.summary())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GridPoint, &CellOutcome)> {
        self.cells.iter()
    }

    pub fn failed_cells(&self) -> Vec<GridPoint> {
        self.cells.iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(point, _)| *point)
            .collect()
    }

    pub fn warning_count(&self) -> usize {
        self.cells.values().map(|outcome| match outcome {
            CellOutcome::Completed { warnings, .. } => warnings.len(),
            CellOutcome::Failed { .. } => 0,
        }).sum()
    }
}

#[derive(Serialize)]
struct CellRecord<'a> {
    beta: f64,
    gamma: f64,
    outcome: &'a CellOutcome,
}

impl Serialize for SensitivityGridResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.cells.iter().map(|(point, outcome)| CellRecord {
            beta: point.beta,
            gamma: point.gamma,
            outcome,
        }))
    }
}

/// Runs the simulation over the cross product of β and γ values.
///
/// Every cell is a pure function of its parameters, so cells are evaluated in
/// parallel and the result does not depend on evaluation order.
#[derive(Debug, Clone)]
pub struct SensitivityAnalyzer {
    base: ModelParameters,
    betas: Vec<f64>,
    gammas: Vec<f64>,
    stepper: Stepper,
    extinction_threshold: f64,
    cross_validate: bool,
}

impl SensitivityAnalyzer {
    pub fn new(base: ModelParameters, betas: Vec<f64>, gammas: Vec<f64>) -> Self {
        Self {
            base,
            betas,
            gammas,
            stepper: Stepper::Discrete,
            extinction_threshold: DEFAULT_EXTINCTION_THRESHOLD,
            cross_validate: false,
        }
    }

    /// Varies β only, holding γ at the base value.
    pub fn beta_sweep(base: ModelParameters, betas: Vec<f64>) -> Self {
        let gammas = vec![base.gamma()];
        Self::new(base, betas, gammas)
    }

    /// Varies γ only, holding β at the base value.
    pub fn gamma_sweep(base: ModelParameters, gammas: Vec<f64>) -> Self {
        let betas = vec![base.beta()];
        Self::new(base, betas, gammas)
    }

    pub fn with_stepper(mut self, stepper: Stepper) -> Self {
        self.stepper = stepper;
        self
    }

    pub fn with_extinction_threshold(mut self, threshold: f64) -> Self {
        self.extinction_threshold = threshold;
        self
    }

    /// Also run the discrete/continuous comparison in every cell and attach
    /// its warning, if any.
    pub fn with_cross_validation(mut self, enabled: bool) -> Self {
        self.cross_validate = enabled;
        self
    }

    pub fn grid_points(&self) -> Vec<GridPoint> {
        self.betas.iter().flat_map(|beta| {
            self.gammas.iter().map(move |gamma| GridPoint::new(*beta, *gamma))
        }).collect()
    }

    pub fn run(&self) -> SensitivityGridResult {
        let points = self.grid_points();
        log::info!(
            "sensitivity sweep over {} cells ({} beta x {} gamma)",
            points.len(), self.betas.len(), self.gammas.len()
        );

        let outcomes: Vec<(GridPoint, CellOutcome)> = points.par_iter()
            .map(|point| (*point, self.run_cell(point)))
            .collect();

        let cells: IndexMap<GridPoint, CellOutcome> = outcomes.into_iter().collect();
        let result = SensitivityGridResult { cells };
        log::info!(
            "sensitivity sweep finished: {} failed cells, {} warnings",
            result.failed_cells().len(), result.warning_count()
        );
        result
    }

    /// The infected time series of every cell, for plotting.
    pub fn infected_curves(&self) -> IndexMap<GridPoint, Result<Vec<f64>, Error>> {
        let points = self.grid_points();
        let curves: Vec<(GridPoint, Result<Vec<f64>, Error>)> = points.par_iter()
            .map(|point| {
                let curve = self.runner_for(point).map(|runner| runner.run().infected_series());
                (*point, curve)
            })
            .collect();
        curves.into_iter().collect()
    }

    fn runner_for(&self, point: &GridPoint) -> Result<SimulationRunner, Error> {
        let params = self.base.with_rates(point.beta, point.gamma)?;
        SimulationRunner::new(params, self.stepper)?.with_extinction_threshold(self.extinction_threshold)
    }

    fn run_cell(&self, point: &GridPoint) -> CellOutcome {
        let runner = match self.runner_for(point) {
            Ok(runner) => runner,
            Err(error) => {
                log::warn!("cell beta = {}, gamma = {} failed: {}", point.beta, point.gamma, error);
                return CellOutcome::Failed { error };
            }
        };

        let result = runner.run();
        let mut warnings = result.warnings;
        if self.cross_validate {
            match cross_validate(runner.parameters(), self.extinction_threshold) {
                Ok(comparison) => warnings.extend(comparison.warning),
                Err(error) => return CellOutcome::Failed { error },
            }
        }

        log::debug!(
            "cell beta = {}, gamma = {}: peak day {}, peak {:.2}",
            point.beta, point.gamma, result.summary.peak_day, result.summary.peak_infected
        );
        CellOutcome::Completed {
            summary: result.summary,
            warnings,
        }
    }
}
