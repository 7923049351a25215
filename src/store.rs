//! Access to the spectrum, stress table and stress sequence records.
//!
//! The pipeline only ever talks to the database through the `Store`
//! trait. `SqliteStore` is the implementation backed by SQLite, with the
//! statements cached on the connection so that each query is prepared
//! once per run.

use std::path::Path;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::classcode::Increment;
use crate::error::{Error, Result};
use crate::stress::StressRow;

/// A flight of a spectrum, ready for sigma generation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnaFlight {
    pub flight_id: i64,
    /// Zero based position of the flight in the spectrum.
    pub flight_num: i64,
    pub name: String,
    pub validity: f64,
    pub num_peaks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnaPeak {
    pub peak_num: i64,
    pub class_code: String,
    pub delta_p: f64,
    pub delta_t: f64,
}

/// Load case of a 1g code.
#[derive(Debug, Clone, PartialEq)]
pub struct OnegIssyCode {
    pub flight_phase: String,
    pub issy_code: String,
    pub order: i64,
}

/// Load case of an increment together with the factor selected by the
/// increment block.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementIssyCode {
    pub flight_phase: String,
    pub issy_code: String,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadcaseInfo {
    pub flight_phase: String,
    pub issy_code: String,
}

/// A flight read from a stress sequence (STH) file.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightRecord {
    pub flight_num: i64,
    pub name: String,
    pub severity: String,
    pub num_peaks: usize,
    pub validity: f64,
    pub block_size: f64,
    pub max_val: f64,
    pub min_val: f64,
}

pub trait Store {
    /// Number of distinct typical flights of a spectrum.
    fn num_flight_types(&self, ana_id: i64) -> Result<i64>;

    fn total_peaks(&self, ana_id: i64) -> Result<usize>;

    /// Flight names of the flight sequence, in sequence order.
    fn fls_flight_names(&self, fls_id: i64) -> Result<Vec<String>>;

    fn ana_flight_numbers(&self, ana_id: i64, name: &str) -> Result<Vec<i64>>;

    /// Typical flights of a spectrum in ascending flight number.
    fn ana_flights(&self, ana_id: i64) -> Result<Vec<AnaFlight>>;

    /// Peaks of one flight in stored order.
    fn ana_peaks(&self, ana_id: i64, flight_id: i64) -> Result<Vec<AnaPeak>>;

    fn oneg_issy_code(&self, txt_id: i64, oneg_code: &str) -> Result<Option<OnegIssyCode>>;

    fn increment_issy_codes(&self, txt_id: i64, oneg_code: &str, increment: &Increment) -> Result<Vec<IncrementIssyCode>>;

    fn stf_stress(&self, stf_id: i64, issy_code: &str) -> Result<Option<StressRow>>;

    /// All stresses of a stress table ordered by issy code.
    fn stf_stresses(&self, stf_id: i64) -> Result<Vec<(String, StressRow)>>;

    /// The load case flagged as the delta-p case.
    fn delta_p_loadcase(&self, txt_id: i64) -> Result<Option<LoadcaseInfo>>;

    fn loadcase(&self, txt_id: i64, issy_code: &str) -> Result<Option<LoadcaseInfo>>;

    /// Reference pressure of a conversion table, zero when not given.
    fn conversion_ref_dp(&self, conv_id: i64) -> Result<f64>;

    /// Largest delta-p over the flights of a spectrum, zero when empty.
    fn max_delta_p(&self, ana_id: i64) -> Result<f64>;

    fn create_sth_file(&self, name: &str) -> Result<i64>;

    /// Create the peak table of a stress sequence and return its name.
    fn create_sth_peaks_table(&self, sth_id: i64) -> Result<String>;

    /// Commit a flight together with its peaks. Either all of it is
    /// stored or nothing is.
    fn save_sth_flight(&self, sth_id: i64, peaks_table: &str, flight: &FlightRecord, peaks: &[f64]) -> Result<i64>;

    fn set_sth_num_flights(&self, sth_id: i64, num_flights: i64) -> Result<()>;

    fn insert_fls_flight(&self, sth_id: i64, flight_num: i64, name: &str, severity: &str) -> Result<()>;
}

static SCHEMA: &str = "
    create table if not exists ana_files (
        file_id integer primary key,
        name text not null,
        num_flights integer not null default 0
    );
    create table if not exists ana_flights (
        flight_id integer primary key,
        file_id integer not null,
        flight_num integer not null,
        name text not null,
        severity text not null default '',
        num_peaks integer not null,
        validity real not null,
        block_size real not null default 0,
        max_dp real not null default 0
    );
    create table if not exists ana_peaks (
        file_id integer not null,
        flight_id integer not null,
        peak_num integer not null,
        fourteen_digit_code text not null,
        delta_p real not null default 0,
        delta_t real not null default 0
    );
    create index if not exists ana_peaks_flight on ana_peaks(file_id, flight_id);
    create table if not exists txt_codes (
        file_id integer not null,
        one_g_code text not null,
        increment_num integer not null,
        direction_num text,
        nl_factor_num text,
        flight_phase text not null,
        issy_code text not null,
        oneg_order integer not null default 0,
        dp_case integer not null default 0,
        factor_1 real, factor_2 real, factor_3 real, factor_4 real,
        factor_5 real, factor_6 real, factor_7 real, factor_8 real
    );
    create table if not exists stf_stresses (
        file_id integer not null,
        issy_code text not null,
        stress_x real not null default 0,
        stress_y real not null default 0,
        stress_xy real not null default 0
    );
    create index if not exists stf_stresses_code on stf_stresses(file_id, issy_code);
    create table if not exists xls_files (
        file_id integer primary key,
        ref_dp real
    );
    create table if not exists fls_flights (
        file_id integer not null,
        flight_num integer not null,
        name text not null
    );
    create table if not exists ext_sth_files (
        file_id integer primary key,
        name text not null,
        num_flights integer not null default 0
    );
    create table if not exists ext_sth_flights (
        flight_id integer primary key,
        file_id integer not null,
        flight_num integer not null,
        name text not null,
        severity text not null,
        num_peaks integer not null,
        validity real not null,
        block_size real not null,
        max_val real not null,
        min_val real not null
    );
    create table if not exists ext_fls_flights (
        sth_id integer not null,
        flight_num integer not null,
        name text,
        severity text
    );
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert_ana_file(&self, name: &str, num_flights: i64) -> Result<i64> {
        self.conn.execute(
            "insert into ana_files(name, num_flights) values(?1, ?2)",
            params![name, num_flights],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_ana_flight(&self, ana_id: i64, flight_num: i64, name: &str, num_peaks: usize, validity: f64, max_dp: f64) -> Result<i64> {
        self.conn.execute(
            "insert into ana_flights(file_id, flight_num, name, num_peaks, validity, max_dp) values(?1, ?2, ?3, ?4, ?5, ?6)",
            params![ana_id, flight_num, name, num_peaks as i64, validity, max_dp],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_ana_peak(&self, ana_id: i64, flight_id: i64, peak: &AnaPeak) -> Result<()> {
        let mut statement = self.conn.prepare_cached(
            "insert into ana_peaks(file_id, flight_id, peak_num, fourteen_digit_code, delta_p, delta_t) values(?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        statement.execute(params![ana_id, flight_id, peak.peak_num, peak.class_code, peak.delta_p, peak.delta_t])?;
        Ok(())
    }

    pub fn insert_oneg_code(&self, txt_id: i64, oneg_code: &str, flight_phase: &str, issy_code: &str, order: i64, dp_case: bool) -> Result<()> {
        self.conn.execute(
            "insert into txt_codes(file_id, one_g_code, increment_num, flight_phase, issy_code, oneg_order, dp_case) values(?1, ?2, 0, ?3, ?4, ?5, ?6)",
            params![txt_id, oneg_code, flight_phase, issy_code, order, dp_case as i64],
        )?;
        Ok(())
    }

    /// Insert an increment load case. `factors` fills `factor_1` onwards.
    pub fn insert_increment_code(
        &self,
        txt_id: i64,
        oneg_code: &str,
        increment_num: i64,
        direction_num: &str,
        nl_factor_num: Option<&str>,
        flight_phase: &str,
        issy_code: &str,
        factors: &[f64],
    ) -> Result<()> {
        let mut values = [None; 8];
        for (slot, factor) in values.iter_mut().zip(factors.iter()) {
            *slot = Some(*factor);
        }
        self.conn.execute(
            "insert into txt_codes(file_id, one_g_code, increment_num, direction_num, nl_factor_num, flight_phase, issy_code,
                 factor_1, factor_2, factor_3, factor_4, factor_5, factor_6, factor_7, factor_8)
             values(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                txt_id,
                oneg_code,
                increment_num,
                direction_num,
                nl_factor_num,
                flight_phase,
                issy_code,
                values[0],
                values[1],
                values[2],
                values[3],
                values[4],
                values[5],
                values[6],
                values[7]
            ],
        )?;
        Ok(())
    }

    /// Insert a load case that is neither a 1g nor an increment case, e.g.
    /// a delta-p or delta-t case.
    pub fn insert_loadcase(&self, txt_id: i64, flight_phase: &str, issy_code: &str, dp_case: bool) -> Result<()> {
        self.conn.execute(
            "insert into txt_codes(file_id, one_g_code, increment_num, flight_phase, issy_code, dp_case) values(?1, '', -1, ?2, ?3, ?4)",
            params![txt_id, flight_phase, issy_code, dp_case as i64],
        )?;
        Ok(())
    }

    pub fn insert_stf_stress(&self, stf_id: i64, issy_code: &str, row: &StressRow) -> Result<()> {
        self.conn.execute(
            "insert into stf_stresses(file_id, issy_code, stress_x, stress_y, stress_xy) values(?1, ?2, ?3, ?4, ?5)",
            params![stf_id, issy_code, row.x, row.y, row.xy],
        )?;
        Ok(())
    }

    pub fn insert_conversion_table(&self, ref_dp: Option<f64>) -> Result<i64> {
        self.conn
            .execute("insert into xls_files(ref_dp) values(?1)", params![ref_dp])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_fls_flight_name(&self, fls_id: i64, flight_num: i64, name: &str) -> Result<()> {
        self.conn.execute(
            "insert into fls_flights(file_id, flight_num, name) values(?1, ?2, ?3)",
            params![fls_id, flight_num, name],
        )?;
        Ok(())
    }

    pub fn sth_flights(&self, sth_id: i64) -> Result<Vec<FlightRecord>> {
        let mut statement = self.conn.prepare_cached(
            "select flight_num, name, severity, num_peaks, validity, block_size, max_val, min_val
             from ext_sth_flights where file_id = ?1 order by flight_num",
        )?;
        let rows = statement.query_map(params![sth_id], |row| {
            Ok(FlightRecord {
                flight_num: row.get(0)?,
                name: row.get(1)?,
                severity: row.get(2)?,
                num_peaks: row.get::<_, i64>(3)? as usize,
                validity: row.get(4)?,
                block_size: row.get(5)?,
                max_val: row.get(6)?,
                min_val: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn sth_num_flights(&self, sth_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "select num_flights from ext_sth_files where file_id = ?1",
            params![sth_id],
            |row| row.get(0),
        )?)
    }

    pub fn sth_peaks(&self, peaks_table: &str, flight_id: i64) -> Result<Vec<f64>> {
        let sql = format!("select peak_val from {} where flight_id = ?1 order by peak_num", peaks_table);
        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement.query_map(params![flight_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<f64>>>()?)
    }

    pub fn fls_flights(&self, sth_id: i64) -> Result<Vec<(i64, String, Option<String>)>> {
        let mut statement = self.conn.prepare_cached(
            "select flight_num, name, severity from ext_fls_flights where sth_id = ?1 order by rowid",
        )?;
        let rows = statement.query_map(params![sth_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl Store for SqliteStore {
    fn num_flight_types(&self, ana_id: i64) -> Result<i64> {
        let count = self
            .conn
            .query_row(
                "select num_flights from ana_files where file_id = ?1",
                params![ana_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    fn total_peaks(&self, ana_id: i64) -> Result<usize> {
        let total: Option<i64> = self.conn.query_row(
            "select sum(num_peaks) from ana_flights where file_id = ?1",
            params![ana_id],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0) as usize)
    }

    fn fls_flight_names(&self, fls_id: i64) -> Result<Vec<String>> {
        let mut statement = self
            .conn
            .prepare_cached("select name from fls_flights where file_id = ?1 order by flight_num asc")?;
        let rows = statement.query_map(params![fls_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn ana_flight_numbers(&self, ana_id: i64, name: &str) -> Result<Vec<i64>> {
        let mut statement = self
            .conn
            .prepare_cached("select flight_num from ana_flights where file_id = ?1 and name = ?2")?;
        let rows = statement.query_map(params![ana_id, name], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
    }

    fn ana_flights(&self, ana_id: i64) -> Result<Vec<AnaFlight>> {
        let mut statement = self.conn.prepare_cached(
            "select flight_id, flight_num, name, validity, num_peaks from ana_flights where file_id = ?1 order by flight_num",
        )?;
        let rows = statement.query_map(params![ana_id], |row| {
            Ok(AnaFlight {
                flight_id: row.get(0)?,
                flight_num: row.get(1)?,
                name: row.get(2)?,
                validity: row.get(3)?,
                num_peaks: row.get::<_, i64>(4)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn ana_peaks(&self, ana_id: i64, flight_id: i64) -> Result<Vec<AnaPeak>> {
        let mut statement = self.conn.prepare_cached(
            "select peak_num, fourteen_digit_code, delta_p, delta_t from ana_peaks
             where file_id = ?1 and flight_id = ?2 order by peak_num",
        )?;
        let rows = statement.query_map(params![ana_id, flight_id], |row| {
            Ok(AnaPeak {
                peak_num: row.get(0)?,
                class_code: row.get(1)?,
                delta_p: row.get(2)?,
                delta_t: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn oneg_issy_code(&self, txt_id: i64, oneg_code: &str) -> Result<Option<OnegIssyCode>> {
        let mut statement = self.conn.prepare_cached(
            "select flight_phase, issy_code, oneg_order from txt_codes
             where file_id = ?1 and one_g_code = ?2 and increment_num = 0",
        )?;
        let rows = statement.query_map(params![txt_id, oneg_code], |row| {
            Ok(OnegIssyCode {
                flight_phase: row.get(0)?,
                issy_code: row.get(1)?,
                order: row.get(2)?,
            })
        })?;
        // the last definition of a 1g code wins
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?.pop())
    }

    fn increment_issy_codes(&self, txt_id: i64, oneg_code: &str, increment: &Increment) -> Result<Vec<IncrementIssyCode>> {
        let mut statement = self.conn.prepare_cached(
            "select flight_phase, issy_code, factor_1, factor_2, factor_3, factor_4, factor_5, factor_6, factor_7, factor_8
             from txt_codes
             where file_id = ?1 and one_g_code = ?2 and increment_num = ?3 and direction_num = ?4
             and (nl_factor_num is null or nl_factor_num = ?5)",
        )?;
        let rows = statement.query_map(
            params![txt_id, oneg_code, increment.number, increment.direction, increment.factor],
            |row| {
                let mut factors = [None; 8];
                for (i, factor) in factors.iter_mut().enumerate() {
                    *factor = row.get::<_, Option<f64>>(i + 2)?;
                }
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, factors))
            },
        )?;
        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        // the factor digit only matters once a load case matches
        let column = match increment.factor.parse::<usize>() {
            Ok(n) if (1..=8).contains(&n) => n - 1,
            _ => return Err(Error::InvalidClassCode(format!("{}: factor digit '{}'", oneg_code, increment.factor))),
        };
        Ok(rows
            .into_iter()
            .map(|(flight_phase, issy_code, factors)| IncrementIssyCode {
                flight_phase,
                issy_code,
                factor: factors[column].unwrap_or(0.0),
            })
            .collect())
    }

    fn stf_stress(&self, stf_id: i64, issy_code: &str) -> Result<Option<StressRow>> {
        let mut statement = self
            .conn
            .prepare_cached("select stress_x, stress_y, stress_xy from stf_stresses where file_id = ?1 and issy_code = ?2")?;
        let row = statement
            .query_row(params![stf_id, issy_code], |row| {
                Ok(StressRow {
                    x: row.get(0)?,
                    y: row.get(1)?,
                    xy: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn stf_stresses(&self, stf_id: i64) -> Result<Vec<(String, StressRow)>> {
        let mut statement = self.conn.prepare_cached(
            "select issy_code, stress_x, stress_y, stress_xy from stf_stresses where file_id = ?1 order by issy_code asc",
        )?;
        let rows = statement.query_map(params![stf_id], |row| {
            Ok((
                row.get(0)?,
                StressRow {
                    x: row.get(1)?,
                    y: row.get(2)?,
                    xy: row.get(3)?,
                },
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn delta_p_loadcase(&self, txt_id: i64) -> Result<Option<LoadcaseInfo>> {
        let mut statement = self
            .conn
            .prepare_cached("select flight_phase, issy_code from txt_codes where file_id = ?1 and dp_case = 1")?;
        let mut rows = statement.query_map(params![txt_id], |row| {
            Ok(LoadcaseInfo {
                flight_phase: row.get(0)?,
                issy_code: row.get(1)?,
            })
        })?;
        let first = rows.next().transpose()?;
        Ok(first)
    }

    fn loadcase(&self, txt_id: i64, issy_code: &str) -> Result<Option<LoadcaseInfo>> {
        let mut statement = self
            .conn
            .prepare_cached("select flight_phase, issy_code from txt_codes where file_id = ?1 and issy_code = ?2")?;
        let mut rows = statement.query_map(params![txt_id, issy_code], |row| {
            Ok(LoadcaseInfo {
                flight_phase: row.get(0)?,
                issy_code: row.get(1)?,
            })
        })?;
        let first = rows.next().transpose()?;
        Ok(first)
    }

    fn conversion_ref_dp(&self, conv_id: i64) -> Result<f64> {
        let ref_dp: Option<Option<f64>> = self
            .conn
            .query_row("select ref_dp from xls_files where file_id = ?1", params![conv_id], |row| row.get(0))
            .optional()?;
        Ok(ref_dp.flatten().unwrap_or(0.0))
    }

    fn max_delta_p(&self, ana_id: i64) -> Result<f64> {
        let max_dp: Option<f64> = self.conn.query_row(
            "select max(max_dp) from ana_flights where file_id = ?1",
            params![ana_id],
            |row| row.get(0),
        )?;
        Ok(max_dp.unwrap_or(0.0))
    }

    fn create_sth_file(&self, name: &str) -> Result<i64> {
        self.conn.execute(
            "insert into ext_sth_files(name, num_flights) values(?1, 0)",
            params![name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn create_sth_peaks_table(&self, sth_id: i64) -> Result<String> {
        let table = format!("ext_sth_peaks_{}", sth_id);
        self.conn.execute_batch(&format!(
            "create table {table}(flight_id integer not null, peak_num integer not null, peak_val real not null);
             create index {table}_flight on {table}(flight_id);",
            table = table
        ))?;
        debug!("created peaks table {}", table);
        Ok(table)
    }

    fn save_sth_flight(&self, sth_id: i64, peaks_table: &str, flight: &FlightRecord, peaks: &[f64]) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "insert into ext_sth_flights(file_id, flight_num, name, severity, num_peaks, validity, block_size, max_val, min_val)
             values(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                sth_id,
                flight.flight_num,
                flight.name,
                flight.severity,
                flight.num_peaks as i64,
                flight.validity,
                flight.block_size,
                flight.max_val,
                flight.min_val
            ],
        )?;
        let flight_id = tx.last_insert_rowid();
        {
            let sql = format!("insert into {}(flight_id, peak_num, peak_val) values(?1, ?2, ?3)", peaks_table);
            let mut statement = tx.prepare_cached(&sql)?;
            for (peak_num, value) in peaks.iter().enumerate() {
                statement.execute(params![flight_id, peak_num as i64, value])?;
            }
        }
        tx.commit()?;
        Ok(flight_id)
    }

    fn set_sth_num_flights(&self, sth_id: i64, num_flights: i64) -> Result<()> {
        self.conn.execute(
            "update ext_sth_files set num_flights = ?1 where file_id = ?2",
            params![num_flights, sth_id],
        )?;
        Ok(())
    }

    fn insert_fls_flight(&self, sth_id: i64, flight_num: i64, name: &str, severity: &str) -> Result<()> {
        let mut statement = self.conn.prepare_cached(
            "insert into ext_fls_flights(sth_id, flight_num, name, severity) values(?1, ?2, ?3, ?4)",
        )?;
        statement.execute(params![sth_id, flight_num, name, severity])?;
        Ok(())
    }
}
