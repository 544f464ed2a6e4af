#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

#[macro_use]
mod ops;

pub mod block;
pub mod buildup;
pub mod calibration;
pub mod complex;
pub mod correction;
pub mod error;
pub mod excitation;
pub mod extraction;
pub mod math;
pub mod report;
pub mod run;
pub mod scalar;
pub mod topology;
pub mod uncertain;

pub use error::{Error, Result};
