//! Streaming loader for external stress sequences.
//!
//! An STH file holds the peaks of each typical flight and an FLS file
//! the order in which the flights are flown. Both are read line by line
//! with progress reported against a pre-counted line total.
//!
//! STH layout after 4 header lines, for each flight:
//!
//! ```text
//! <validity> <block size>
//! <number of peaks> <name> [severity]
//! <peak> <peak> ...
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::error::{Error, Result};
use crate::store::{FlightRecord, Store};
use crate::task::Task;

/// Number of lines at the top of an STH file before the first flight.
pub const STH_HEADER_LINES: usize = 4;
pub const MAX_SEVERITY_LENGTH: usize = 500;
/// Characters kept when a severity is too long.
pub const TRUNCATED_SEVERITY_LENGTH: usize = 100;
pub const FLIGHT_PREFIX: &str = "TF_";

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFlight {
    pub flight_id: i64,
    pub name: String,
}

/// A stress sequence loaded from an STH and FLS file pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSequence {
    pub id: i64,
    pub name: String,
    pub peaks_table: String,
    pub flights: Vec<ExternalFlight>,
}

/// Count the lines of a file. Returns `None` if cancelled.
pub fn count_lines(path: &Path, task: &dyn Task) -> Result<Option<usize>> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.split(b'\n') {
        if task.is_cancelled() {
            return Ok(None);
        }
        line?;
        count += 1;
    }
    Ok(Some(count))
}

/// Reads lines and reports progress for each one.
struct Lines<'a> {
    inner: std::io::Lines<BufReader<File>>,
    task: &'a dyn Task,
    file: String,
    read: usize,
    total: usize,
}

impl<'a> Lines<'a> {
    fn open(path: &Path, task: &'a dyn Task, total: usize) -> Result<Self> {
        Ok(Self {
            inner: BufReader::new(File::open(path)?).lines(),
            task,
            file: path.display().to_string(),
            read: 0,
            total,
        })
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.inner.next() {
            Some(line) => {
                let line = line?;
                self.read += 1;
                self.task.update_progress(self.read, self.total);
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    fn parse_error(&self, token: &str, reason: String) -> Error {
        Error::Parse {
            file: self.file.clone(),
            line: self.read,
            token: token.to_string(),
            reason,
        }
    }

    fn parse_f64(&self, token: &str) -> Result<f64> {
        token.parse::<f64>().map_err(|why| self.parse_error(token, why.to_string()))
    }

    fn parse_usize(&self, token: &str) -> Result<usize> {
        token.parse::<usize>().map_err(|why| self.parse_error(token, why.to_string()))
    }
}

pub fn flight_name(name: &str) -> String {
    if name.starts_with(FLIGHT_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", FLIGHT_PREFIX, name)
    }
}

pub fn limit_severity(severity: &str) -> String {
    if severity.chars().count() > MAX_SEVERITY_LENGTH {
        let kept = severity.chars().take(TRUNCATED_SEVERITY_LENGTH).collect::<String>();
        format!("{}... (truncated due to character limit)", kept)
    } else {
        severity.to_string()
    }
}

/// Read the two header lines and the peaks of one flight. Returns `None`
/// if cancelled part way through.
fn read_flight(lines: &mut Lines, first: &str, flight_num: i64) -> Result<Option<(FlightRecord, Vec<f64>)>> {
    let mut tokens = first.split_whitespace();
    let validity = match tokens.next() {
        Some(token) => lines.parse_f64(token)?,
        None => 0.0,
    };
    let block_size = match tokens.next() {
        Some(token) => lines.parse_f64(token)?,
        None => 0.0,
    };

    let eof = |file: &str, flight: String| Error::PrematureEof {
        file: file.to_string(),
        flight,
    };

    let second = match lines.next_line()? {
        Some(line) => line,
        None => return Err(eof(&lines.file, format!("number {}", flight_num))),
    };
    let mut tokens = second.split_whitespace();
    let num_peaks = match tokens.next() {
        Some(token) => lines.parse_usize(token)?,
        None => return Err(lines.parse_error("", "missing number of peaks".to_string())),
    };
    let name = flight_name(tokens.next().unwrap_or(""));
    let severity = limit_severity(tokens.next().unwrap_or(""));

    lines
        .task
        .update_message(&format!("Saving peaks for flight {} to database...", flight_num));

    let mut peaks = Vec::with_capacity(num_peaks);
    while peaks.len() < num_peaks {
        if lines.task.is_cancelled() {
            return Ok(None);
        }
        let line = match lines.next_line()? {
            Some(line) => line,
            None => return Err(eof(&lines.file, name)),
        };
        let values = line
            .split_whitespace()
            .map(|token| lines.parse_f64(token))
            .collect::<Result<Vec<f64>>>()?;
        if peaks.len() + values.len() > num_peaks {
            return Err(Error::PeakCountMismatch {
                flight: name,
                declared: num_peaks,
                found: peaks.len() + values.len(),
            });
        }
        peaks.extend(values);
    }

    let (max_val, min_val) = if peaks.is_empty() {
        (0.0, 0.0)
    } else {
        peaks
            .iter()
            .fold((std::f64::NEG_INFINITY, std::f64::INFINITY), |(max, min), &p| {
                (max.max(p), min.min(p))
            })
    };

    let flight = FlightRecord {
        flight_num,
        name,
        severity,
        num_peaks,
        validity,
        block_size,
        max_val,
        min_val,
    };
    Ok(Some((flight, peaks)))
}

fn load_sth_flights(
    store: &dyn Store,
    task: &dyn Task,
    sequence: &mut ExternalSequence,
    sth_path: &Path,
) -> Result<Option<i64>> {
    task.update_message("Getting STH file size...");
    let total = match count_lines(sth_path, task)? {
        Some(total) => total,
        None => return Ok(None),
    };

    let mut lines = Lines::open(sth_path, task, total)?;
    let mut flight_num = 0;
    loop {
        if task.is_cancelled() {
            return Ok(None);
        }
        let line = match lines.next_line()? {
            Some(line) => line,
            None => break,
        };
        if lines.read <= STH_HEADER_LINES || line.trim().is_empty() {
            continue;
        }

        task.update_message(&format!("Saving flight info for flight {} to database...", flight_num));
        let (flight, peaks) = match read_flight(&mut lines, &line, flight_num)? {
            Some(flight) => flight,
            None => return Ok(None),
        };
        let flight_id = store.save_sth_flight(sequence.id, &sequence.peaks_table, &flight, &peaks)?;
        sequence.flights.push(ExternalFlight {
            flight_id,
            name: flight.name,
        });
        flight_num += 1;
    }

    task.update_message("Saving number of flights to database...");
    store.set_sth_num_flights(sequence.id, flight_num)?;
    Ok(Some(flight_num))
}

/// Split an FLS line on the delimiter, dropping empty columns.
fn fls_columns<'l>(line: &'l str, delimiter: char) -> Vec<&'l str> {
    line.trim()
        .split(delimiter)
        .map(|col| col.trim())
        .filter(|col| !col.is_empty())
        .collect()
}

/// Returns false when cancelled.
fn load_fls_flights(store: &dyn Store, task: &dyn Task, sth_id: i64, fls_path: &Path) -> Result<bool> {
    task.update_message("Getting FLS file size...");
    let total = match count_lines(fls_path, task)? {
        Some(total) => total,
        None => return Ok(false),
    };

    task.update_message("Loading FLS flights to database...");
    let mut lines = Lines::open(fls_path, task, total)?;
    let mut delimiter = None;
    loop {
        if task.is_cancelled() {
            return Ok(false);
        }
        let line = match lines.next_line()? {
            Some(line) => line,
            None => break,
        };
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let delim = *delimiter.get_or_insert_with(|| if line.trim().contains('\t') { '\t' } else { ' ' });
        let columns = fls_columns(&line, delim);
        let flight_num = match columns.first() {
            Some(token) => token
                .parse::<i64>()
                .map_err(|why| lines.parse_error(token, why.to_string()))?,
            None => continue,
        };
        let name = columns.get(1).cloned().unwrap_or("");
        let severity = columns.get(2).cloned().unwrap_or("");
        store.insert_fls_flight(sth_id, flight_num, name, severity)?;
    }
    Ok(true)
}

/// Load an STH file and its FLS flight order into the store.
///
/// Every flight is committed with its peaks as it is completed. An error
/// part way through a flight leaves that flight out of the store. Returns
/// `None` if the task is cancelled.
pub fn load_sth(store: &dyn Store, task: &dyn Task, sth_path: &Path, fls_path: &Path) -> Result<Option<ExternalSequence>> {
    task.update_message("Creating stress sequence...");
    let name = sth_path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| sth_path.display().to_string());
    let id = store.create_sth_file(&name)?;
    if task.is_cancelled() {
        return Ok(None);
    }

    task.update_message("Creating stress peaks table...");
    let peaks_table = store.create_sth_peaks_table(id)?;
    if task.is_cancelled() {
        return Ok(None);
    }

    let mut sequence = ExternalSequence {
        id,
        name,
        peaks_table,
        flights: Vec::new(),
    };

    let num_flights = match load_sth_flights(store, task, &mut sequence, sth_path)? {
        Some(num_flights) => num_flights,
        None => return Ok(None),
    };

    if !load_fls_flights(store, task, id, fls_path)? || task.is_cancelled() {
        return Ok(None);
    }

    info!("Loaded {} flights of stress sequence '{}'", num_flights, sequence.name);
    Ok(Some(sequence))
}
