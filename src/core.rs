pub mod battery;
pub mod decision;
pub mod horizon;
pub mod plan;
pub mod prices;
pub mod resolver;
pub mod simulator;
