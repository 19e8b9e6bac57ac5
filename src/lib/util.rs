use crate::errors::*;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub fn write_data_to_file(path_str: &str, data: &str) -> Result<(), Error> {
    let mut file = File::create(path_str).map_err(
        |e| Error::OutputFailure(format!("{}: {}", path_str, e))
    )?;
    file.write_all(data.as_bytes()).map_err(
        |e| Error::OutputFailure(format!("{}: {}", path_str, e))
    )?;
    Ok(())
}

pub fn read_data_from_stdin() -> Result<String, Error> {
    let mut data = String::new();
    std::io::stdin().read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

pub fn read_data_from_file(path_str: &str) -> Result<String, Error> {
    let path = Path::new(path_str).canonicalize().map_err(
        |_| Error::InvalidInputPath(path_str.into())
    )?;
    let mut file = File::open(&path).map_err(
        |_| Error::InvalidInputFile(path_str.into())
    )?;
    let mut data = String::new();
    file.read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

pub fn cumulative_sum(v: &[f64]) -> Vec<f64> {
    let mut cs: Vec<f64> = Vec::with_capacity(v.len());
    for x in v {
        match cs.last() {
            Some(last) => {
                let next = *x + *last;
                cs.push(next);
            },
            None => {
                cs.push(*x);
            }
        }
    }
    cs
}

/// Relative difference of `b` from the reference `a`, with 0/0 treated as equal.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    }
    else {
        (a - b).abs() / scale
    }
}
