use serde::Serialize;

use crate::classroom::ClassroomDistribution;
use crate::config::Config;
use crate::errors::*;
use crate::runner::{cross_validate, CrossValidation, SimulationResult, SimulationRunner};
use crate::sensitivity::{SensitivityAnalyzer, SensitivityGridResult};

/// Everything one configured run produces, ready to be serialised.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub rng_seed: u64,
    pub simulation: SimulationResult,
    pub cross_validation: Option<CrossValidation>,
    pub sensitivity: Option<SensitivityGridResult>,
    pub classroom: Option<ClassroomDistribution>,
}

/// Runs every analysis the configuration asks for.
///
/// Invalid model or classroom parameters fail the whole run; a bad
/// sensitivity cell only fails that cell.
pub fn run_analysis(config: &Config, rng_seed: u64) -> Result<Report, Error> {
    let params = config.model.to_parameters()?;
    let threshold = config.extinction_threshold();

    let simulation = SimulationRunner::new(params.clone(), config.stepper)?
        .with_extinction_threshold(threshold)?
        .run();
    let summary = &simulation.summary;
    log::info!(
        "{} run: peak of {:.1} infected on day {}, attack rate {:.3}",
        config.stepper.name(), summary.peak_infected, summary.peak_day, summary.final_attack_rate
    );

    let cross_validation = if config.cross_validate {
        Some(cross_validate(&params, threshold)?)
    }
    else {
        None
    };

    let sensitivity = config.sensitivity.as_ref().map(|grid| {
        SensitivityAnalyzer::new(params.clone(), grid.betas.clone(), grid.gammas.clone())
            .with_stepper(config.stepper)
            .with_extinction_threshold(threshold)
            .with_cross_validation(grid.cross_validate)
            .run()
    });

    let classroom = match &config.classroom {
        Some(classroom) => Some(classroom.to_model()?.distribution(rng_seed)?),
        None => None,
    };

    Ok(Report {
        rng_seed,
        simulation,
        cross_validation,
        sensitivity,
        classroom,
    })
}
