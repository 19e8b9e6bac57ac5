use std::time::Instant;

use rand::Rng;

use sirtools::analysis::run_analysis;
use sirtools::config::Config;
use sirtools::errors::*;
use sirtools::logging::init_logging;
use sirtools::util::*;

fn main() -> Result<(), Error> {
    // Read JSON config from file specified in first command-line argument or from stdin
    let args: Vec<String> = std::env::args().collect();
    let json_data = if args.len() > 1 {
        read_data_from_file(&args[1])?
    }
    else {
        read_data_from_stdin()?
    };

    let config = Config::from_json(&json_data)?;
    let _log_handle = init_logging(config.log_level()?)?;

    let rng_seed = match config.rng_seed {
        Some(rng_seed) => rng_seed,
        None => {
            let rng_seed: u64 = rand::thread_rng().gen();
            log::info!("no rng_seed configured; using {}", rng_seed);
            rng_seed
        }
    };

    let start = Instant::now();
    let report = run_analysis(&config, rng_seed)?;
    log::info!("elapsed time: {} s", start.elapsed().as_secs_f64());

    let report_json = serde_json::to_string_pretty(&report)?;
    match &config.output_path {
        Some(output_path) => {
            write_data_to_file(output_path, &report_json)?;
            log::info!("report written to {}", output_path);
        },
        None => {
            println!("{}", report_json);
        }
    }

    Ok(())
}
