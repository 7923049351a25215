//! fatigue
//! A library for generating fatigue stress sequences and running
//! damage contribution analyses.
//!
//! A spectrum of typical flights is combined with a stress table to give
//! the peak stresses of every flight in a sigma file. External stress
//! sequences can be loaded from STH and FLS files, and each damage
//! contribution can be sent through the external fatigue engine.

pub static COMMENT: &str = "#  ";

extern crate log;

#[macro_use]
extern crate lazy_static;

pub mod classcode;
pub mod deltap;
pub mod deltat;
pub mod engine;
pub mod error;
pub mod modifier;
pub mod sigma;
pub mod stf;
pub mod sth;
pub mod store;
pub mod stress;
pub mod task;
