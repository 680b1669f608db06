quantity!(Watts, suffix: " W", precision: 0);
quantity!(Kilowatts, suffix: " kW", precision: 3);
finite!(Watts, Kilowatts);

impl From<Watts> for Kilowatts {
    fn from(watts: Watts) -> Self {
        Self(watts.0 / 1000.0)
    }
}

impl From<Kilowatts> for Watts {
    fn from(kilowatts: Kilowatts) -> Self {
        Self(kilowatts.0 * 1000.0)
    }
}
