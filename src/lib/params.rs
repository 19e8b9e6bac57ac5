use serde::{Serialize, Deserialize};

use crate::errors::*;

/// Integration step used when none is given.
pub const DEFAULT_DT: f64 = 0.1;

/// Validated configuration for a single SIR run.
///
/// Immutable once built. Every constructor except `new_unchecked` enforces
/// non-negative finite rates, S₀ + I₀ + R₀ = N with N > 0, a positive horizon,
/// and a finite Δt > 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParameters {
    beta: f64,
    gamma: f64,
    population: u64,
    initial_susceptible: u64,
    initial_infected: u64,
    initial_recovered: u64,
    horizon_days: u32,
    dt: f64,
}

impl ModelParameters {
    /// A fully susceptible population seeded with `initial_infected` cases.
    pub fn new(
        beta: f64, gamma: f64, population: u64, initial_infected: u64, horizon_days: u32,
    ) -> Result<Self, Error> {
        if initial_infected > population {
            return Err(invalid(format!(
                "initial infected ({}) exceeds population ({})", initial_infected, population
            )));
        }
        Self::from_counts(
            beta, gamma,
            population - initial_infected, initial_infected, 0,
            horizon_days, DEFAULT_DT,
        )
    }

    pub fn from_counts(
        beta: f64,
        gamma: f64,
        initial_susceptible: u64,
        initial_infected: u64,
        initial_recovered: u64,
        horizon_days: u32,
        dt: f64,
    ) -> Result<Self, Error> {
        let population = initial_susceptible
            .checked_add(initial_infected)
            .and_then(|x| x.checked_add(initial_recovered))
            .ok_or_else(|| invalid("population count overflows"))?;

        let params = Self::new_unchecked(
            beta, gamma, population,
            initial_susceptible, initial_infected, initial_recovered,
            horizon_days, dt,
        );
        params.validate()?;
        Ok(params)
    }

    /// Builds parameters without any checks. Callers are responsible for the
    /// invariants; `SimulationRunner::new` re-checks population conservation.
    pub fn new_unchecked(
        beta: f64,
        gamma: f64,
        population: u64,
        initial_susceptible: u64,
        initial_infected: u64,
        initial_recovered: u64,
        horizon_days: u32,
        dt: f64,
    ) -> Self {
        Self {
            beta,
            gamma,
            population,
            initial_susceptible,
            initial_infected,
            initial_recovered,
            horizon_days,
            dt,
        }
    }

    /// Same population and horizon with different rates, as used for one
    /// sensitivity grid cell.
    pub fn with_rates(&self, beta: f64, gamma: f64) -> Result<Self, Error> {
        let params = Self { beta, gamma, ..self.clone() };
        params.validate()?;
        Ok(params)
    }

    pub fn with_horizon(&self, horizon_days: u32) -> Result<Self, Error> {
        let params = Self { horizon_days, ..self.clone() };
        params.validate()?;
        Ok(params)
    }

    pub fn with_dt(&self, dt: f64) -> Result<Self, Error> {
        let params = Self { dt, ..self.clone() };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_rate("beta", self.beta)?;
        check_rate("gamma", self.gamma)?;
        if self.population == 0 {
            return Err(invalid("population must be positive"));
        }
        let total = self.initial_susceptible as u128
            + self.initial_infected as u128
            + self.initial_recovered as u128;
        if total != self.population as u128 {
            return Err(invalid(format!(
                "S0 + I0 + R0 = {} does not match population {}", total, self.population
            )));
        }
        if self.horizon_days == 0 {
            return Err(invalid("horizon must be at least one day"));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(invalid(format!("dt must be a positive number, got {}", self.dt)));
        }
        Ok(())
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    /// N as a float, the scale every state is compared against.
    pub fn n(&self) -> f64 {
        self.population as f64
    }

    pub fn initial_susceptible(&self) -> u64 {
        self.initial_susceptible
    }

    pub fn initial_infected(&self) -> u64 {
        self.initial_infected
    }

    pub fn initial_recovered(&self) -> u64 {
        self.initial_recovered
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// β/γ. Infinite when γ = 0 and β > 0.
    pub fn basic_reproduction_number(&self) -> f64 {
        ratio(self.beta, self.gamma)
    }

    /// βS₀/(γN): the expected number of secondary cases at day 0.
    pub fn effective_reproduction_number(&self) -> f64 {
        let susceptible_fraction = self.initial_susceptible as f64 / self.n();
        ratio(self.beta * susceptible_fraction, self.gamma)
    }

    /// 1 − 1/R₀, or 0 when R₀ ≤ 1.
    pub fn herd_immunity_threshold(&self) -> f64 {
        let r0 = self.basic_reproduction_number();
        if r0 <= 1.0 {
            0.0
        }
        else {
            1.0 - 1.0 / r0
        }
    }

    /// Whether an outbreak can take off from the initial condition.
    pub fn has_outbreak_potential(&self) -> bool {
        self.initial_infected > 0 && self.effective_reproduction_number() > 1.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if numerator == 0.0 {
        0.0
    }
    else if denominator == 0.0 {
        std::f64::INFINITY
    }
    else {
        numerator / denominator
    }
}

fn check_rate(name: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() {
        Err(invalid(format!("{} must be finite, got {}", name, value)))
    }
    else if value < 0.0 {
        Err(invalid(format!("{} must be non-negative, got {}", name, value)))
    }
    else {
        Ok(())
    }
}

/// Raw `model` block of a run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub beta: f64,
    pub gamma: f64,
    pub population: u64,
    pub initial_infected: u64,
    #[serde(default)]
    pub initial_recovered: u64,
    pub horizon_days: u32,
    pub dt: Option<f64>,
}

impl ModelConfig {
    pub fn to_parameters(&self) -> Result<ModelParameters, Error> {
        let assigned = self.initial_infected.checked_add(self.initial_recovered);
        let initial_susceptible = match assigned {
            Some(assigned) if assigned <= self.population => self.population - assigned,
            _ => {
                return Err(invalid(format!(
                    "initial infected ({}) plus recovered ({}) exceeds population ({})",
                    self.initial_infected, self.initial_recovered, self.population
                )));
            }
        };
        ModelParameters::from_counts(
            self.beta,
            self.gamma,
            initial_susceptible,
            self.initial_infected,
            self.initial_recovered,
            self.horizon_days,
            self.dt.unwrap_or(DEFAULT_DT),
        )
    }
}
