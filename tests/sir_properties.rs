use approx::assert_relative_eq;
use proptest::prelude::*;

use sirtools::{IntegrationMethod, ModelParameters, SimulationResult, SimulationRunner, Stepper};

fn run(params: &ModelParameters, stepper: Stepper) -> SimulationResult {
    SimulationRunner::new(params.clone(), stepper).unwrap().run()
}

fn steppers() -> Vec<Stepper> {
    vec![Stepper::Discrete, Stepper::continuous()]
}

fn arb_params(max_beta: f64, max_gamma: f64) -> impl Strategy<Value = ModelParameters> {
    (0.0..max_beta, 0.0..max_gamma, 1u64..100_000, 0.0..1.0f64, 0.0..0.5f64, 1u32..200)
        .prop_map(|(beta, gamma, population, infected_share, recovered_share, horizon)| {
            let infected = (population as f64 * infected_share) as u64;
            let recovered = ((population - infected) as f64 * recovered_share) as u64;
            let susceptible = population - infected - recovered;
            ModelParameters::from_counts(beta, gamma, susceptible, infected, recovered, horizon, 0.1)
                .unwrap()
        })
}

fn arb_stiff_params() -> impl Strategy<Value = ModelParameters> {
    (0.0..50.0f64, 0.0..20.0f64, 10u64..100_000, 0.0..0.1f64, 0.25..3.0f64, 1u32..40)
        .prop_map(|(beta, gamma, population, infected_share, dt, horizon)| {
            let infected = ((population as f64 * infected_share) as u64).max(1);
            ModelParameters::from_counts(beta, gamma, population - infected, infected, 0, horizon, dt)
                .unwrap()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn continuous_stays_monotone_for_large_steps(params in arb_stiff_params()) {
        for stepper in &[Stepper::continuous(), Stepper::Continuous { method: IntegrationMethod::Euler }] {
            let result = run(&params, *stepper);
            let n = params.n();
            let slack = 1e-9 * n;
            prop_assert_eq!(result.integration_step, Some(params.dt().min(1.0)));
            for state in &result.states {
                prop_assert!(state.conservation_error(n) < 1e-6, "state {:?}", state);
                prop_assert!(state.S >= 0.0 && state.I >= 0.0 && state.R >= 0.0, "state {:?}", state);
            }
            for pair in result.states.windows(2) {
                prop_assert!(pair[1].S <= pair[0].S + slack, "{:?}", pair);
                prop_assert!(pair[1].R + slack >= pair[0].R, "{:?}", pair);
            }
        }
    }
}

proptest! {
    #[test]
    fn discrete_conserves_population_and_is_monotone(params in arb_params(5.0, 2.0)) {
        let result = run(&params, Stepper::Discrete);
        let n = params.n();
        prop_assert_eq!(result.states.len(), params.horizon_days() as usize + 1);
        for state in &result.states {
            prop_assert!(state.conservation_error(n) < 1e-6, "state {:?}", state);
            prop_assert!(state.S >= 0.0 && state.I >= 0.0 && state.R >= 0.0, "state {:?}", state);
        }
        for pair in result.states.windows(2) {
            prop_assert!(pair[1].S <= pair[0].S);
            prop_assert!(pair[1].R >= pair[0].R);
        }
    }

    #[test]
    fn continuous_conserves_population_and_is_monotone(params in arb_params(2.0, 1.0)) {
        let result = run(&params, Stepper::continuous());
        let n = params.n();
        let slack = 1e-9 * n;
        for state in &result.states {
            prop_assert!(state.conservation_error(n) < 1e-6, "state {:?}", state);
            prop_assert!(state.S >= 0.0 && state.I >= 0.0 && state.R >= 0.0, "state {:?}", state);
        }
        for pair in result.states.windows(2) {
            prop_assert!(pair[1].S <= pair[0].S + slack);
            prop_assert!(pair[1].R + slack >= pair[0].R);
        }
    }

    #[test]
    fn replay_is_identical(params in arb_params(2.0, 1.0)) {
        for stepper in steppers() {
            prop_assert_eq!(run(&params, stepper), run(&params, stepper));
        }
    }
}

#[test]
fn no_transmission_keeps_susceptibles_fixed() {
    let params = ModelParameters::from_counts(0.0, 0.2, 800, 150, 50, 60, 0.1).unwrap();
    for stepper in steppers() {
        for state in &run(&params, stepper).states {
            assert_relative_eq!(state.S, 800.0, max_relative = 1e-12);
        }
    }
}

#[test]
fn no_transmission_and_no_recovery_freezes_everything() {
    let params = ModelParameters::from_counts(0.0, 0.0, 800, 150, 50, 60, 0.1).unwrap();
    for stepper in steppers() {
        for state in &run(&params, stepper).states {
            assert_eq!(state.I, 150.0);
            assert_eq!(state.R, 50.0);
        }
    }
}

#[test]
fn no_recovery_keeps_recovered_fixed() {
    let params = ModelParameters::from_counts(0.4, 0.0, 900, 10, 90, 60, 0.1).unwrap();
    for stepper in steppers() {
        let result = run(&params, stepper);
        for state in &result.states {
            assert_relative_eq!(state.R, 90.0, max_relative = 1e-9);
        }
        assert!(result.summary.outbreak);
    }
}

#[test]
fn reference_epidemic_window() {
    let params = ModelParameters::new(0.5, 0.1, 1000, 1, 75).unwrap();
    for stepper in steppers() {
        let summary = run(&params, stepper).summary;
        assert!(
            summary.peak_day >= 15 && summary.peak_day <= 30,
            "{}: peak day {}", stepper.name(), summary.peak_day
        );
        assert!(
            summary.peak_infected >= 400.0 && summary.peak_infected <= 600.0,
            "{}: peak {}", stepper.name(), summary.peak_infected
        );
        assert!(summary.final_attack_rate > 0.9);
    }
}

#[test]
fn subcritical_epidemic_only_declines() {
    let params = ModelParameters::new(0.05, 0.5, 1000, 1, 75).unwrap();
    assert!(params.effective_reproduction_number() <= 1.0);
    for stepper in steppers() {
        let result = run(&params, stepper);
        for pair in result.states.windows(2) {
            assert!(pair[1].I <= pair[0].I, "{}: {:?}", stepper.name(), pair);
        }
        assert!(!result.summary.outbreak);
        assert_eq!(result.summary.peak_day, 0);
    }
}
