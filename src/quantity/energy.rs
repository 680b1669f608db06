use crate::quantity::{
    power::{Kilowatts, Watts},
    time::Hours,
};

quantity!(WattHours, suffix: " Wh", precision: 1);
quantity!(KilowattHours, suffix: " kWh", precision: 3);
finite!(KilowattHours);

implement_mul!(Watts, Hours, WattHours);
implement_mul!(Kilowatts, Hours, KilowattHours);

impl KilowattHours {
    /// Smallest battery flow worth acting upon.
    pub const MIN_ORDER: Self = Self(0.01);
}

impl From<WattHours> for KilowattHours {
    fn from(watt_hours: WattHours) -> Self {
        Self(watt_hours.0 / 1000.0)
    }
}

impl From<KilowattHours> for WattHours {
    fn from(kilowatt_hours: KilowattHours) -> Self {
        Self(kilowatt_hours.0 * 1000.0)
    }
}
