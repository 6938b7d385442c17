/// How urgently an operator should care about a device message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

/// An error or notice a device reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerMessage {
    /// When the condition appeared, as a unix timestamp; 0 when the
    /// firmware only reports a device-local datetime string
    pub timestamp: u32,
    /// Vendor-specific numeric code; 0 when the firmware assigns none
    pub code: u64,
    /// Human-readable text for the condition
    pub message: String,
    /// How severe the device considers the condition
    pub severity: MessageSeverity,
}
