use super::hashrate::HashRate;
use measurements::{Frequency, Temperature};

/// Per-hashboard telemetry, assembled from whichever per-slot table the
/// firmware exposes.
///
/// A slot the firmware lists still gets an entry when the board is dead or
/// disabled, with `active` false and its readings absent.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardData {
    /// Slot index as the control board numbers it, starting at 0
    pub position: u8,
    /// Hashrate this board currently contributes
    pub hashrate: Option<HashRate>,
    /// Factory or nominal hashrate for this board, when reported
    pub expected_hashrate: Option<HashRate>,
    /// PCB temperature sensor reading
    pub board_temperature: Option<Temperature>,
    /// Chip temperature at the board's intake end
    pub intake_temperature: Option<Temperature>,
    /// Chip temperature at the board's exhaust end
    pub outlet_temperature: Option<Temperature>,
    /// Chip count this board carries when fully working
    pub expected_chips: Option<u16>,
    /// Chips currently detected and hashing on this board
    pub working_chips: Option<u16>,
    /// Board serial number, when the firmware exposes one
    pub serial_number: Option<String>,
    /// Average chip frequency or frequency set point
    pub frequency: Option<Frequency>,
    /// Whether frequency tuning has settled on this board
    pub tuned: Option<bool>,
    /// Whether the board is enabled and hashing
    pub active: Option<bool>,
}
