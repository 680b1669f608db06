quantity!(
    /// Price of one kilowatt-hour in the currency of the price curve.
    KilowattHourRate, suffix: "/kWh", precision: 3
);
finite!(KilowattHourRate);
