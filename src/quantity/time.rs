quantity!(Hours, suffix: " h", precision: 2);

impl Hours {
    /// Duration of a single dispatch quarter.
    pub const QUARTER: Self = Self(0.25);
}
