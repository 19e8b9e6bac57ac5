#![allow(non_snake_case)]

use serde::{Serialize, Deserialize};

use crate::params::ModelParameters;

/// Compartment counts on a given day.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SIRState {
    pub day: u32,
    pub S: f64,
    pub I: f64,
    pub R: f64,
}

impl SIRState {
    pub fn initial(params: &ModelParameters) -> Self {
        Self {
            day: 0,
            S: params.initial_susceptible() as f64,
            I: params.initial_infected() as f64,
            R: params.initial_recovered() as f64,
        }
    }

    pub fn total(&self) -> f64 {
        self.S + self.I + self.R
    }

    /// |S + I + R − N| / N
    pub fn conservation_error(&self, population: f64) -> f64 {
        (self.total() - population).abs() / population
    }
}

/// Advances a state by one day using the discrete recurrence.
///
/// Flows that would drive a compartment negative are clamped. Infections are
/// capped at S first; recoveries are then capped at the infected pool
/// including the day's new infections. Both are transfers between
/// compartments, so S + I + R is unchanged.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscreteStepper;

impl DiscreteStepper {
    pub fn step(&self, params: &ModelParameters, state: &SIRState) -> SIRState {
        let N = params.n();

        let mut new_infections = params.beta() * state.S * state.I / N;
        if new_infections > state.S {
            log::debug!(
                "day {}: clamping infections {} to susceptible pool {}",
                state.day, new_infections, state.S
            );
            new_infections = state.S;
        }

        let mut new_recoveries = params.gamma() * state.I;
        let infected_pool = state.I + new_infections;
        if new_recoveries > infected_pool {
            log::debug!(
                "day {}: clamping recoveries {} to infected pool {}",
                state.day, new_recoveries, infected_pool
            );
            new_recoveries = infected_pool;
        }

        SIRState {
            day: state.day + 1,
            S: state.S - new_infections,
            I: (infected_pool - new_recoveries).max(0.0),
            R: state.R + new_recoveries,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationMethod {
    /// Classical fourth-order Runge-Kutta.
    RungeKutta4,
    /// Explicit Euler. First order; kept as a low-fidelity fallback.
    Euler,
}

impl Default for IntegrationMethod {
    fn default() -> Self {
        IntegrationMethod::RungeKutta4
    }
}

/// Integrates the SIR ODE over one day with a fixed step.
///
/// The step is Δt, capped at one day. A day takes as many full steps as fit,
/// then one partial step that lands on the day boundary. After each step the
/// state is rescaled so that S + I + R = N.
///
/// Every step is applied as a pair of flows, S → I and I → R. A step whose
/// flows would leave a compartment negative, or whose intermediate stages
/// would, is split in half and retried. Past `MAX_REFINEMENTS` halvings the
/// flows are clamped instead. Either event is recorded in `StepDiagnostics`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuousIntegrator {
    pub method: IntegrationMethod,
}

/// Halvings allowed for a single step before its flows are clamped.
pub const MAX_REFINEMENTS: u32 = 12;

/// Day boundaries closer than this to the end of the last full step need no
/// partial step.
const BOUNDARY_SLACK: f64 = 1e-9;

/// Counts of steps the integrator could not take as configured.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDiagnostics {
    /// Steps split in half because the full step overshot.
    pub refined: u32,
    /// Steps whose flows were clamped after refinement ran out.
    pub clamped: u32,
}

impl StepDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.refined == 0 && self.clamped == 0
    }

    pub fn absorb(&mut self, other: StepDiagnostics) {
        self.refined += other.refined;
        self.clamped += other.clamped;
    }
}

#[derive(Debug, Copy, Clone)]
struct Derivative {
    dS: f64,
    dI: f64,
    dR: f64,
}

/// Mass moved over one step: S → I and I → R.
#[derive(Debug, Copy, Clone)]
struct Flows {
    infections: f64,
    recoveries: f64,
}

impl Flows {
    fn fits(&self, y: [f64; 3]) -> bool {
        self.infections >= 0.0
            && self.infections <= y[0]
            && self.recoveries >= 0.0
            && self.recoveries <= y[1] + self.infections
    }

    /// Same order as the discrete stepper: infections first, then recoveries.
    fn clamp(self, y: [f64; 3]) -> Self {
        let infections = self.infections.max(0.0).min(y[0]);
        let recoveries = self.recoveries.max(0.0).min(y[1] + infections);
        Self { infections, recoveries }
    }

    fn apply(&self, y: [f64; 3], N: f64) -> [f64; 3] {
        let next = [
            y[0] - self.infections,
            (y[1] + self.infections - self.recoveries).max(0.0),
            y[2] + self.recoveries,
        ];
        rescale(next, N)
    }
}

impl ContinuousIntegrator {
    pub fn new(method: IntegrationMethod) -> Self {
        Self { method }
    }

    /// The step actually used for a configured Δt: days are never skipped.
    pub fn step_size(dt: f64) -> f64 {
        dt.min(1.0)
    }

    /// Number of full steps per day and the length of the closing partial
    /// step, which is 0 when the full steps already land on the boundary.
    pub fn day_schedule(dt: f64) -> (usize, f64) {
        let h = Self::step_size(dt);
        // Guard against 1/0.1 evaluating to 10.000000000000002.
        let full = (1.0 / h + BOUNDARY_SLACK).floor();
        let remainder = 1.0 - full * h;
        let partial = if remainder > BOUNDARY_SLACK { remainder } else { 0.0 };
        (full as usize, partial)
    }

    pub fn step(&self, params: &ModelParameters, state: &SIRState) -> SIRState {
        self.advance(params, state).0
    }

    /// Steps one day and reports any steps that had to be refined or clamped.
    pub fn advance(&self, params: &ModelParameters, state: &SIRState) -> (SIRState, StepDiagnostics) {
        let h = Self::step_size(params.dt());
        let (full, partial) = Self::day_schedule(params.dt());
        let mut diagnostics = StepDiagnostics::default();

        let mut y = [state.S, state.I, state.R];
        for _ in 0..full {
            y = self.integrate(params, y, h, 0, &mut diagnostics);
        }
        if partial > 0.0 {
            y = self.integrate(params, y, partial, 0, &mut diagnostics);
        }

        if !diagnostics.is_clean() {
            log::debug!(
                "day {}: step {} refined {} times, clamped {} times",
                state.day, h, diagnostics.refined, diagnostics.clamped
            );
        }

        let next = SIRState {
            day: state.day + 1,
            S: y[0],
            I: y[1],
            R: y[2],
        };
        (next, diagnostics)
    }

    fn flows(&self, params: &ModelParameters, y: [f64; 3], h: f64) -> Option<Flows> {
        match self.method {
            IntegrationMethod::RungeKutta4 => rk4_flows(params, y, h),
            IntegrationMethod::Euler => Some(euler_flows(params, y, h)),
        }
    }

    fn integrate(
        &self, params: &ModelParameters, y: [f64; 3], h: f64, depth: u32,
        diagnostics: &mut StepDiagnostics,
    ) -> [f64; 3] {
        match self.flows(params, y, h) {
            Some(flows) if flows.fits(y) => flows.apply(y, params.n()),
            _ if depth < MAX_REFINEMENTS => {
                diagnostics.refined += 1;
                let midpoint = self.integrate(params, y, h / 2.0, depth + 1, diagnostics);
                self.integrate(params, midpoint, h / 2.0, depth + 1, diagnostics)
            },
            _ => {
                diagnostics.clamped += 1;
                // Euler flows only read y itself, which is never negative.
                euler_flows(params, y, h).clamp(y).apply(y, params.n())
            },
        }
    }
}

fn derivative(params: &ModelParameters, y: [f64; 3]) -> Derivative {
    let force = params.beta() * y[0] * y[1] / params.n();
    let recovery = params.gamma() * y[1];
    Derivative {
        dS: -force,
        dI: force - recovery,
        dR: recovery,
    }
}

fn advance(y: [f64; 3], d: Derivative, h: f64) -> [f64; 3] {
    [y[0] + h * d.dS, y[1] + h * d.dI, y[2] + h * d.dR]
}

fn non_negative(y: [f64; 3]) -> bool {
    y.iter().all(|value| *value >= 0.0)
}

fn euler_flows(params: &ModelParameters, y: [f64; 3], h: f64) -> Flows {
    let d = derivative(params, y);
    Flows {
        infections: -h * d.dS,
        recoveries: h * d.dR,
    }
}

/// RK4 flows, or `None` if an intermediate stage leaves the feasible region.
fn rk4_flows(params: &ModelParameters, y: [f64; 3], h: f64) -> Option<Flows> {
    let k1 = derivative(params, y);
    let y2 = advance(y, k1, h / 2.0);
    if !non_negative(y2) {
        return None;
    }
    let k2 = derivative(params, y2);
    let y3 = advance(y, k2, h / 2.0);
    if !non_negative(y3) {
        return None;
    }
    let k3 = derivative(params, y3);
    let y4 = advance(y, k3, h);
    if !non_negative(y4) {
        return None;
    }
    let k4 = derivative(params, y4);

    // dI is the difference of the two flows, so it is implied.
    Some(Flows {
        infections: -h * (k1.dS + 2.0 * k2.dS + 2.0 * k3.dS + k4.dS) / 6.0,
        recoveries: h * (k1.dR + 2.0 * k2.dR + 2.0 * k3.dR + k4.dR) / 6.0,
    })
}

fn rescale(y: [f64; 3], N: f64) -> [f64; 3] {
    let total: f64 = y.iter().sum();
    if total > 0.0 {
        let scale = N / total;
        [y[0] * scale, y[1] * scale, y[2] * scale]
    }
    else {
        y
    }
}

/// The choice of stepper for a run.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Stepper {
    Discrete,
    Continuous {
        #[serde(default)]
        method: IntegrationMethod,
    },
}

impl Default for Stepper {
    fn default() -> Self {
        Stepper::Discrete
    }
}

impl Stepper {
    pub fn continuous() -> Self {
        Stepper::Continuous { method: IntegrationMethod::RungeKutta4 }
    }

    pub fn step(&self, params: &ModelParameters, state: &SIRState) -> SIRState {
        self.advance(params, state).0
    }

    /// Steps one day. The discrete recurrence clamps as part of its
    /// definition, so it never reports diagnostics.
    pub fn advance(&self, params: &ModelParameters, state: &SIRState) -> (SIRState, StepDiagnostics) {
        match self {
            Stepper::Discrete => (DiscreteStepper.step(params, state), StepDiagnostics::default()),
            Stepper::Continuous { method } => ContinuousIntegrator::new(*method).advance(params, state),
        }
    }

    /// The integration step in days, if this stepper integrates at all.
    pub fn integration_step(&self, params: &ModelParameters) -> Option<f64> {
        match self {
            Stepper::Discrete => None,
            Stepper::Continuous { .. } => Some(ContinuousIntegrator::step_size(params.dt())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stepper::Discrete => "discrete",
            Stepper::Continuous { method: IntegrationMethod::RungeKutta4 } => "continuous-rk4",
            Stepper::Continuous { method: IntegrationMethod::Euler } => "continuous-euler",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario() -> ModelParameters {
        ModelParameters::new(0.5, 0.1, 1000, 1, 75).unwrap()
    }

    #[test]
    fn test_discrete_first_days() {
        let params = scenario();
        let day1 = DiscreteStepper.step(&params, &SIRState::initial(&params));
        assert_eq!(day1.day, 1);
        assert_relative_eq!(day1.S, 998.5005, epsilon = 1e-9);
        assert_relative_eq!(day1.I, 1.3995, epsilon = 1e-9);
        assert_relative_eq!(day1.R, 0.1, epsilon = 1e-9);

        let day2 = DiscreteStepper.step(&params, &day1);
        assert_relative_eq!(day2.S, 997.801799275125, epsilon = 1e-9);
        assert_relative_eq!(day2.I, 1.958250724875, epsilon = 1e-9);
        assert_relative_eq!(day2.R, 0.23995, epsilon = 1e-9);
    }

    #[test]
    fn test_discrete_clamps_infections_to_susceptibles() {
        let params = ModelParameters::from_counts(3.0, 0.1, 50, 50, 0, 10, 0.1).unwrap();
        let next = DiscreteStepper.step(&params, &SIRState::initial(&params));
        assert_eq!(next.S, 0.0);
        assert_relative_eq!(next.I, 95.0, epsilon = 1e-12);
        assert_relative_eq!(next.R, 5.0, epsilon = 1e-12);
        assert_relative_eq!(next.total(), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_discrete_clamps_recoveries_to_infected() {
        let params = ModelParameters::from_counts(0.5, 1.5, 0, 10, 90, 10, 0.1).unwrap();
        let next = DiscreteStepper.step(&params, &SIRState::initial(&params));
        assert_eq!(next.S, 0.0);
        assert_eq!(next.I, 0.0);
        assert_eq!(next.R, 100.0);
    }

    #[test]
    fn test_day_schedule() {
        assert_eq!(ContinuousIntegrator::day_schedule(0.1), (10, 0.0));
        assert_eq!(ContinuousIntegrator::day_schedule(1.0), (1, 0.0));
        assert_eq!(ContinuousIntegrator::day_schedule(0.25), (4, 0.0));

        let (full, partial) = ContinuousIntegrator::day_schedule(0.3);
        assert_eq!(full, 3);
        assert_relative_eq!(partial, 0.1, epsilon = 1e-12);

        assert_eq!(ContinuousIntegrator::day_schedule(2.0), (1, 0.0));
        assert_eq!(ContinuousIntegrator::step_size(2.0), 1.0);
        assert_eq!(ContinuousIntegrator::step_size(0.3), 0.3);
    }

    #[test]
    fn test_partial_step_matches_fine_integration() {
        let params = scenario();
        let coarse = params.with_dt(0.3).unwrap();
        let fine = params.with_dt(0.01).unwrap();
        let integrator = ContinuousIntegrator::default();
        let mut a = SIRState::initial(&coarse);
        let mut b = SIRState::initial(&fine);
        for _ in 0..30 {
            a = integrator.step(&coarse, &a);
            b = integrator.step(&fine, &b);
        }
        assert_relative_eq!(a.I, b.I, max_relative = 1e-3);
    }

    #[test]
    fn test_reference_scenario_needs_no_refinement() {
        let params = scenario();
        for method in &[IntegrationMethod::RungeKutta4, IntegrationMethod::Euler] {
            let integrator = ContinuousIntegrator::new(*method);
            let mut state = SIRState::initial(&params);
            for _ in 0..75 {
                let (next, diagnostics) = integrator.advance(&params, &state);
                assert!(diagnostics.is_clean(), "day {}: {:?}", state.day, diagnostics);
                state = next;
            }
        }
    }

    #[test]
    fn test_large_step_is_refined_and_stays_monotone() {
        let params = ModelParameters::from_counts(50.0, 0.1, 999, 1, 0, 30, 1.0).unwrap();
        let integrator = ContinuousIntegrator::default();
        let initial = SIRState::initial(&params);
        let (day1, diagnostics) = integrator.advance(&params, &initial);
        assert!(diagnostics.refined > 0);
        assert_eq!(diagnostics.clamped, 0);
        assert!(day1.S < initial.S);
        assert!(day1.R >= initial.R);
        assert!(day1.I > 900.0, "I on day 1: {}", day1.I);
        assert_relative_eq!(day1.total(), 1000.0, max_relative = 1e-12);
    }

    #[test]
    fn test_fast_recovery_is_not_undone() {
        let params = ModelParameters::from_counts(5.0, 20.0, 999, 1, 0, 30, 1.0).unwrap();
        let integrator = ContinuousIntegrator::default();
        let mut state = SIRState::initial(&params);
        for _ in 0..30 {
            let next = integrator.step(&params, &state);
            assert!(next.S <= state.S + 1e-9, "{:?} -> {:?}", state, next);
            assert!(next.R + 1e-9 >= state.R, "{:?} -> {:?}", state, next);
            state = next;
        }
        assert!(state.R > 1.0);
        assert!(state.S < 999.0);
    }

    #[test]
    fn test_continuous_conserves_population() {
        let params = scenario();
        for method in &[IntegrationMethod::RungeKutta4, IntegrationMethod::Euler] {
            let integrator = ContinuousIntegrator::new(*method);
            let mut state = SIRState::initial(&params);
            for _ in 0..75 {
                state = integrator.step(&params, &state);
                assert!(state.conservation_error(1000.0) < 1e-12);
                assert!(state.S >= 0.0 && state.I >= 0.0 && state.R >= 0.0);
            }
            assert_eq!(state.day, 75);
        }
    }

    #[test]
    fn test_rk4_matches_exponential_decay() {
        // With β = 0, I(t) = I₀ exp(−γt).
        let params = ModelParameters::from_counts(0.0, 0.2, 900, 100, 0, 10, 0.1).unwrap();
        let integrator = ContinuousIntegrator::default();
        let mut state = SIRState::initial(&params);
        for _ in 0..10 {
            state = integrator.step(&params, &state);
        }
        assert_relative_eq!(state.I, 100.0 * (-2.0f64).exp(), max_relative = 1e-6);
        assert_relative_eq!(state.S, 900.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stepper_serde() {
        let stepper: Stepper = serde_json::from_str(r#"{"kind": "Continuous"}"#).unwrap();
        assert_eq!(stepper, Stepper::continuous());
        let stepper: Stepper = serde_json::from_str(r#"{"kind": "Continuous", "method": "Euler"}"#).unwrap();
        assert_eq!(stepper.name(), "continuous-euler");
        let stepper: Stepper = serde_json::from_str(r#"{"kind": "Discrete"}"#).unwrap();
        assert_eq!(stepper, Stepper::Discrete);
    }

    #[test]
    fn test_integration_step() {
        let params = scenario().with_dt(2.5).unwrap();
        assert_eq!(Stepper::Discrete.integration_step(&params), None);
        assert_eq!(Stepper::continuous().integration_step(&params), Some(1.0));
        assert_eq!(Stepper::continuous().integration_step(&scenario()), Some(0.1));
    }
}
