use rand::distributions::{Bernoulli, Distribution};
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use crate::errors::*;
use crate::util::cumulative_sum;

/// Monte Carlo trials drawn from one random stream. Fixed so that the
/// stream assignment, and therefore the result, does not depend on the
/// number of worker threads.
pub const TRIALS_PER_STREAM: u64 = 8192;

/// Allowed deviation of the exact pmf's total mass from 1.
pub const PMF_MASS_TOLERANCE: f64 = 1e-9;

/// n students, each independently infected with probability p, observed over
/// M Monte Carlo trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassroomModel {
    students: u32,
    probability: f64,
    trials: u64,
    horizon_days: u32,
}

impl ClassroomModel {
    pub fn new(students: u32, probability: f64, trials: u64) -> Result<Self, Error> {
        let model = Self { students, probability, trials, horizon_days: 1 };
        model.validate()?;
        Ok(model)
    }

    pub fn with_horizon_days(&self, horizon_days: u32) -> Result<Self, Error> {
        let model = Self { horizon_days, ..self.clone() };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.students == 0 {
            return Err(invalid("classroom must have at least one student"));
        }
        if !(self.probability.is_finite() && self.probability >= 0.0 && self.probability <= 1.0) {
            return Err(invalid(format!(
                "infection probability must lie in [0, 1], got {}", self.probability
            )));
        }
        if self.trials == 0 {
            return Err(invalid("trial count must be positive"));
        }
        if self.horizon_days == 0 {
            return Err(invalid("classroom horizon must be at least one day"));
        }
        Ok(())
    }

    pub fn students(&self) -> u32 {
        self.students
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    /// np
    pub fn expected_infections(&self) -> f64 {
        self.students as f64 * self.probability
    }

    /// np(1 − p)
    pub fn variance(&self) -> f64 {
        self.expected_infections() * (1.0 - self.probability)
    }

    pub fn exact_pmf(&self) -> Vec<f64> {
        binomial_pmf(self.students, self.probability)
    }

    pub fn exact_cdf(&self) -> Vec<f64> {
        binomial_cdf(&self.exact_pmf())
    }

    /// Per-count tallies of `trials` independent classroom days.
    ///
    /// Trials are split into batches of `TRIALS_PER_STREAM`; batch `i` draws
    /// from the seed's stream advanced by `i` jumps, so the tallies are a pure
    /// function of (seed, n, p, M).
    pub fn monte_carlo_counts(&self, seed: u64) -> Result<Vec<u64>, Error> {
        let coin = Bernoulli::new(self.probability).map_err(
            |e| invalid(format!("infection probability {}: {:?}", self.probability, e))
        )?;
        let n_outcomes = self.students as usize + 1;
        let n_streams = stream_count(self.trials);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut streams = Vec::with_capacity(n_streams as usize);
        for _ in 0..n_streams {
            streams.push(rng.clone());
            rng.jump();
        }

        let trials = self.trials;
        let students = self.students;
        let counts = streams.into_par_iter().enumerate().map(|(i, mut stream)| {
            let first = i as u64 * TRIALS_PER_STREAM;
            let batch = TRIALS_PER_STREAM.min(trials - first);
            let mut counts = vec![0u64; n_outcomes];
            simulate_trials(&mut stream, students, &coin, batch, &mut counts);
            counts
        }).reduce(
            || vec![0u64; n_outcomes],
            |mut total, counts| {
                for (t, c) in total.iter_mut().zip(counts.iter()) {
                    *t += *c;
                }
                total
            },
        );
        Ok(counts)
    }

    pub fn horizon_outlook(&self) -> HorizonOutlook {
        let days = self.horizon_days as f64;
        HorizonOutlook {
            days: self.horizon_days,
            expected_infections: self.expected_infections() * days,
            probability_infection_free: (1.0 - self.probability).powf(self.students as f64 * days),
        }
    }

    /// Exact and empirical distributions side by side.
    pub fn distribution(&self, seed: u64) -> Result<ClassroomDistribution, Error> {
        let pmf = self.exact_pmf();
        let cdf = binomial_cdf(&pmf);
        let counts = self.monte_carlo_counts(seed)?;
        let empirical = empirical_frequencies(&counts);

        let mut warnings = Vec::new();
        let mass: f64 = pmf.iter().sum();
        if (mass - 1.0).abs() > PMF_MASS_TOLERANCE {
            warnings.push(Warning::numerical_instability(
                "binomial pmf",
                format!("n = {}, p = {}: total mass {}", self.students, self.probability, mass),
            ));
        }

        let outcomes: Vec<OutcomeFrequency> = (0..pmf.len()).map(|k| OutcomeFrequency {
            infected: k as u32,
            exact: pmf[k],
            cumulative: cdf[k],
            empirical: empirical[k],
            count: counts[k],
        }).collect();

        let empirical_mean: f64 = empirical.iter().enumerate()
            .map(|(k, f)| k as f64 * f)
            .sum();
        let total_variation = total_variation_distance(&pmf, &empirical);
        let most_likely = mode(&pmf);
        log::info!(
            "classroom n = {}, p = {}, M = {}: E[X] = {:.4}, empirical mean = {:.4}, TV = {:.6}",
            self.students, self.probability, self.trials,
            self.expected_infections(), empirical_mean, total_variation
        );

        Ok(ClassroomDistribution {
            students: self.students,
            probability: self.probability,
            trials: self.trials,
            seed,
            outcomes,
            expected_infections: self.expected_infections(),
            variance: self.variance(),
            most_likely,
            probability_none: pmf[0],
            probability_any: 1.0 - pmf[0],
            empirical_mean,
            total_variation_distance: total_variation,
            horizon: self.horizon_outlook(),
            warnings,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeFrequency {
    pub infected: u32,
    pub exact: f64,
    pub cumulative: f64,
    pub empirical: f64,
    pub count: u64,
}

/// Infections accumulated over several independent classroom days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonOutlook {
    pub days: u32,
    pub expected_infections: f64,
    pub probability_infection_free: f64,
}

/// Snapshot of one classroom analysis. `outcomes[k]` describes k infections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassroomDistribution {
    pub students: u32,
    pub probability: f64,
    pub trials: u64,
    pub seed: u64,
    pub outcomes: Vec<OutcomeFrequency>,
    pub expected_infections: f64,
    pub variance: f64,
    pub most_likely: u32,
    pub probability_none: f64,
    pub probability_any: f64,
    pub empirical_mean: f64,
    pub total_variation_distance: f64,
    pub horizon: HorizonOutlook,
    pub warnings: Vec<Warning>,
}

impl ClassroomDistribution {
    pub fn exact(&self) -> Vec<f64> {
        self.outcomes.iter().map(|o| o.exact).collect()
    }

    pub fn empirical(&self) -> Vec<f64> {
        self.outcomes.iter().map(|o| o.empirical).collect()
    }
}

/// C(n,k) pᵏ(1−p)ⁿ⁻ᵏ for k = 0..n, evaluated in log space.
pub fn binomial_pmf(n: u32, p: f64) -> Vec<f64> {
    let n_outcomes = n as usize + 1;
    let mut pmf = vec![0.0; n_outcomes];
    if p <= 0.0 {
        pmf[0] = 1.0;
        return pmf;
    }
    if p >= 1.0 {
        pmf[n as usize] = 1.0;
        return pmf;
    }

    let ln_factorial = ln_factorials(n);
    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    let nn = n as usize;
    for k in 0..n_outcomes {
        let ln_choose = ln_factorial[nn] - ln_factorial[k] - ln_factorial[nn - k];
        pmf[k] = (ln_choose + k as f64 * ln_p + (nn - k) as f64 * ln_q).exp();
    }
    pmf
}

/// Running sum of a pmf, capped at 1 against rounding.
pub fn binomial_cdf(pmf: &[f64]) -> Vec<f64> {
    cumulative_sum(pmf).into_iter().map(|x| x.min(1.0)).collect()
}

fn ln_factorials(n: u32) -> Vec<f64> {
    let mut table = Vec::with_capacity(n as usize + 1);
    table.push(0.0);
    let mut acc = 0.0;
    for i in 1..=n {
        acc += (i as f64).ln();
        table.push(acc);
    }
    table
}

/// Number of `TRIALS_PER_STREAM` batches needed to cover `trials > 0`.
fn stream_count(trials: u64) -> u64 {
    (trials - 1) / TRIALS_PER_STREAM + 1
}

/// Adds `trials` classroom outcomes to `counts`, where `counts[k]` tallies
/// trials with exactly k of `students` infected.
pub fn simulate_trials<R: Rng + ?Sized>(
    rng: &mut R, students: u32, coin: &Bernoulli, trials: u64, counts: &mut [u64],
) {
    for _ in 0..trials {
        let mut infected = 0usize;
        for _ in 0..students {
            if coin.sample(rng) {
                infected += 1;
            }
        }
        counts[infected] += 1;
    }
}

pub fn empirical_frequencies(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|c| *c as f64 / total as f64).collect()
}

/// ½ Σ |aₖ − bₖ|
pub fn total_variation_distance(a: &[f64], b: &[f64]) -> f64 {
    0.5 * a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f64>()
}

/// Index of the largest mass; the smallest such index on ties.
pub fn mode(pmf: &[f64]) -> u32 {
    let mut best = 0;
    for (k, mass) in pmf.iter().enumerate() {
        if *mass > pmf[best] {
            best = k;
        }
    }
    best as u32
}

/// Raw `classroom` block of a run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassroomConfig {
    pub students: u32,
    pub probability: f64,
    pub trials: u64,
    pub horizon_days: Option<u32>,
}

impl ClassroomConfig {
    pub fn to_model(&self) -> Result<ClassroomModel, Error> {
        ClassroomModel::new(self.students, self.probability, self.trials)?
            .with_horizon_days(self.horizon_days.unwrap_or(1))
    }
}
