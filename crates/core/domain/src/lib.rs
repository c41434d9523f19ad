pub mod reading;
pub mod unit;

pub use reading::{Reading, SystemReading};
pub use unit::{Coefficients, EnergyUnit, UnknownUnit};
