#[macro_use]
mod macros;

pub mod cost;
pub mod energy;
pub mod power;
pub mod proportions;
pub mod rate;
pub mod time;
mod zero;

pub use self::zero::Zero;
