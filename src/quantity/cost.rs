use crate::quantity::{energy::KilowattHours, rate::KilowattHourRate};

quantity!(
    /// Money in the currency of the price curve.
    Cost, suffix: "", precision: 2
);

implement_mul!(KilowattHourRate, KilowattHours, Cost);
