use measurements::AngularVelocity;

/// One chassis or PSU fan reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanData {
    /// Connector index on the control board; -1 when the firmware does not
    /// say which header a reading belongs to
    pub position: i16,
    /// Measured fan speed
    pub rpm: AngularVelocity,
}
