#![allow(non_snake_case)]

use serde::Serialize;

use crate::errors::*;
use crate::params::ModelParameters;
use crate::sir::{SIRState, StepDiagnostics, Stepper};
use crate::util::relative_difference;

/// Default extinction threshold: the epidemic is over once fewer than one
/// person is infected.
pub const DEFAULT_EXTINCTION_THRESHOLD: f64 = 1.0;

/// Largest tolerated |S + I + R − N| / N along a trajectory.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Peak days further apart than this flag a discrete/continuous divergence.
pub const PEAK_DAY_TOLERANCE: u32 = 2;

/// Relative peak-value difference above which the steppers are considered divergent.
pub const PEAK_VALUE_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub peak_day: u32,
    pub peak_infected: f64,
    pub peak_fraction: f64,
    /// First day after the peak with I below the extinction threshold, or the
    /// horizon if that never happens.
    pub end_day: u32,
    /// Days the epidemic lasted: the end day when an outbreak took off, 0 when
    /// none could, and `None` when I never fell below the threshold within the
    /// horizon.
    pub duration_days: Option<u32>,
    /// (N − S(horizon)) / N
    pub final_attack_rate: f64,
    pub final_recovered: f64,
    pub final_recovered_fraction: f64,
    pub outbreak: bool,
    pub basic_reproduction_number: f64,
    pub effective_reproduction_number: f64,
}

/// The full trajectory of one run, day 0 through the horizon, plus its summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub stepper: Stepper,
    pub parameters: ModelParameters,
    pub extinction_threshold: f64,
    /// Step the integrator actually took, in days; `None` for the discrete stepper.
    pub integration_step: Option<f64>,
    pub states: Vec<SIRState>,
    pub summary: Summary,
    pub warnings: Vec<Warning>,
}

impl SimulationResult {
    pub fn final_state(&self) -> &SIRState {
        // A run always holds at least the initial state.
        &self.states[self.states.len() - 1]
    }

    pub fn infected_series(&self) -> Vec<f64> {
        self.states.iter().map(|state| state.I).collect()
    }
}

/// Running peak/extinction bookkeeping, fed one state at a time.
struct SummaryTracker {
    threshold: f64,
    peak_day: u32,
    peak_infected: f64,
    end_day: Option<u32>,
    max_conservation_error: f64,
    diagnostics: StepDiagnostics,
    first_irregular_day: Option<u32>,
    irregular_days: u32,
}

impl SummaryTracker {
    fn new(initial: &SIRState, threshold: f64) -> Self {
        Self {
            threshold,
            peak_day: initial.day,
            peak_infected: initial.I,
            end_day: None,
            max_conservation_error: 0.0,
            diagnostics: StepDiagnostics::default(),
            first_irregular_day: None,
            irregular_days: 0,
        }
    }

    /// Tied maxima keep the earliest day.
    fn observe(&mut self, state: &SIRState, population: f64) {
        if state.I > self.peak_infected {
            self.peak_day = state.day;
            self.peak_infected = state.I;
            // A later, higher peak reopens the epidemic.
            self.end_day = None;
        }
        else if self.end_day.is_none() && state.day > self.peak_day && state.I < self.threshold {
            self.end_day = Some(state.day);
        }

        let error = state.conservation_error(population);
        if error > self.max_conservation_error {
            self.max_conservation_error = error;
        }
    }

    fn observe_step(&mut self, state: &SIRState, diagnostics: StepDiagnostics) {
        if diagnostics.is_clean() {
            return;
        }
        self.diagnostics.absorb(diagnostics);
        self.irregular_days += 1;
        if self.first_irregular_day.is_none() {
            self.first_irregular_day = Some(state.day);
        }
    }

    fn step_warning(&self, stepper: Stepper, step: Option<f64>) -> Option<Warning> {
        let first_day = self.first_irregular_day?;
        Some(Warning::numerical_instability(
            stepper.name(),
            format!(
                "step {} overshot on {} day(s) from day {}: {} refinement(s), {} clamped step(s)",
                step.unwrap_or(1.0), self.irregular_days, first_day,
                self.diagnostics.refined, self.diagnostics.clamped
            ),
        ))
    }

    fn finish(self, params: &ModelParameters, final_state: &SIRState) -> (Summary, Option<f64>) {
        let N = params.n();
        let outbreak = params.has_outbreak_potential();

        let end_day = self.end_day.unwrap_or(final_state.day);
        let (peak_day, peak_infected, duration_days) = if outbreak {
            (self.peak_day, self.peak_infected, self.end_day)
        }
        else {
            (0, params.initial_infected() as f64, Some(0))
        };

        let summary = Summary {
            peak_day,
            peak_infected,
            peak_fraction: peak_infected / N,
            end_day,
            duration_days,
            final_attack_rate: (N - final_state.S) / N,
            final_recovered: final_state.R,
            final_recovered_fraction: final_state.R / N,
            outbreak,
            basic_reproduction_number: params.basic_reproduction_number(),
            effective_reproduction_number: params.effective_reproduction_number(),
        };

        let drift = if self.max_conservation_error > CONSERVATION_TOLERANCE {
            Some(self.max_conservation_error)
        }
        else {
            None
        };
        (summary, drift)
    }
}

/// Drives a stepper from day 0 to the horizon.
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    params: ModelParameters,
    stepper: Stepper,
    extinction_threshold: f64,
}

impl SimulationRunner {
    /// Fails with `InvalidParameters` if the parameters break their
    /// invariants, which can only happen when they were built with
    /// `ModelParameters::new_unchecked`.
    pub fn new(params: ModelParameters, stepper: Stepper) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self {
            params,
            stepper,
            extinction_threshold: DEFAULT_EXTINCTION_THRESHOLD,
        })
    }

    pub fn with_extinction_threshold(mut self, threshold: f64) -> Result<Self, Error> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(invalid(format!(
                "extinction threshold must be a non-negative number, got {}", threshold
            )));
        }
        self.extinction_threshold = threshold;
        Ok(self)
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn stepper(&self) -> Stepper {
        self.stepper
    }

    pub fn run(&self) -> SimulationResult {
        let params = &self.params;
        let N = params.n();
        let horizon = params.horizon_days();
        log::debug!(
            "running {} stepper: beta = {}, gamma = {}, N = {}, horizon = {}",
            self.stepper.name(), params.beta(), params.gamma(), params.population(), horizon
        );

        let mut states = Vec::with_capacity(horizon as usize + 1);
        let mut state = SIRState::initial(params);
        let mut tracker = SummaryTracker::new(&state, self.extinction_threshold);
        states.push(state);

        let integration_step = self.stepper.integration_step(params);
        if params.dt() > 1.0 && integration_step.is_some() {
            log::info!("dt = {} exceeds one day; integrating with a step of one day", params.dt());
        }

        for _ in 0..horizon {
            let (next, diagnostics) = self.stepper.advance(params, &state);
            state = next;
            tracker.observe_step(&state, diagnostics);
            tracker.observe(&state, N);
            states.push(state);
        }

        let mut warnings = Vec::new();
        if let Some(warning) = tracker.step_warning(self.stepper, integration_step) {
            warnings.push(warning);
        }
        let (summary, drift) = tracker.finish(params, &state);
        if let Some(drift) = drift {
            warnings.push(Warning::numerical_instability(
                self.stepper.name(),
                format!("population drifted by a relative {:e}", drift),
            ));
        }

        SimulationResult {
            stepper: self.stepper,
            parameters: params.clone(),
            extinction_threshold: self.extinction_threshold,
            integration_step,
            states,
            summary,
            warnings,
        }
    }
}

/// Side-by-side summaries of the discrete stepper and the RK4 integrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidation {
    pub discrete: Summary,
    pub continuous: Summary,
    pub peak_day_difference: u32,
    pub peak_value_relative_difference: f64,
    pub warning: Option<Warning>,
}

impl CrossValidation {
    pub fn is_consistent(&self) -> bool {
        self.warning.is_none()
    }
}

/// Runs both steppers on the same parameters and compares their peaks.
///
/// Divergence beyond `PEAK_DAY_TOLERANCE` days or `PEAK_VALUE_TOLERANCE` is
/// reported as a `NumericalInstability` warning; it indicates a regime where
/// the one-day discretisation error is significant.
pub fn cross_validate(params: &ModelParameters, extinction_threshold: f64) -> Result<CrossValidation, Error> {
    let discrete = SimulationRunner::new(params.clone(), Stepper::Discrete)?
        .with_extinction_threshold(extinction_threshold)?
        .run()
        .summary;
    let continuous = SimulationRunner::new(params.clone(), Stepper::continuous())?
        .with_extinction_threshold(extinction_threshold)?
        .run()
        .summary;

    let peak_day_difference = if discrete.peak_day > continuous.peak_day {
        discrete.peak_day - continuous.peak_day
    }
    else {
        continuous.peak_day - discrete.peak_day
    };
    let peak_value_relative_difference =
        relative_difference(continuous.peak_infected, discrete.peak_infected);

    let warning = if peak_day_difference > PEAK_DAY_TOLERANCE
        || peak_value_relative_difference > PEAK_VALUE_TOLERANCE
    {
        Some(Warning::numerical_instability(
            "cross-validation",
            format!(
                "discrete peak (day {}, {:.2}) vs continuous peak (day {}, {:.2}) at beta = {}, gamma = {}",
                discrete.peak_day, discrete.peak_infected,
                continuous.peak_day, continuous.peak_infected,
                params.beta(), params.gamma()
            ),
        ))
    }
    else {
        None
    };

    Ok(CrossValidation {
        discrete,
        continuous,
        peak_day_difference,
        peak_value_relative_difference,
        warning,
    })
}
