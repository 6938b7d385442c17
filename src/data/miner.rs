use std::{net::IpAddr, time::Duration};

use macaddr::MacAddr;
use measurements::{Power, Temperature};

use super::{
    board::BoardData, device::DeviceInfo, fan::FanData, hashrate::HashRate, message::MinerMessage,
    pool::PoolData,
};

/// One device's telemetry, assembled by a driver from however many raw
/// calls its firmware needs.
///
/// Every reading a firmware might withhold is optional; absence means the
/// device did not report it, never that collection failed as a whole. The
/// `expected_*` counts come from the static hardware table for the model,
/// so a report can be checked for missing boards, chips or fans without
/// knowing the model's layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MinerData {
    /// Schema revision for consumers that persist or ship these records
    pub schema_version: String,
    /// Unix timestamp taken when the record was assembled
    pub timestamp: u64,
    /// Address the device was read from
    pub ip: IpAddr,
    /// MAC address, when a management surface exposes it
    pub mac: Option<MacAddr>,
    /// Make, model and firmware identity resolved at discovery time
    pub device_info: DeviceInfo,
    /// Control board serial number
    pub serial_number: Option<String>,
    /// Network hostname the device announces
    pub hostname: Option<String>,
    /// Version of the telemetry API the firmware speaks
    pub api_version: Option<String>,
    /// Firmware build or version string
    pub firmware_version: Option<String>,
    /// Control board hardware revision
    pub control_board_version: Option<String>,
    /// Hashboard count this model ships with
    pub expected_hashboards: Option<u8>,
    /// Per-board readings, one entry per slot the firmware lists
    pub hashboards: Vec<BoardData>,
    /// Whole-device hashrate in the unit the firmware reports
    pub hashrate: Option<HashRate>,
    /// Chip count across all boards when the model is fully working
    pub expected_chips: Option<u16>,
    /// Chips currently detected across all boards
    pub total_chips: Option<u16>,
    /// Fan count this model ships with
    pub expected_fans: Option<u8>,
    /// Chassis fan readings
    pub fans: Vec<FanData>,
    /// Power supply fan readings, for models with a managed PSU
    pub psu_fans: Vec<FanData>,
    /// Mean chip temperature across the device
    pub average_temperature: Option<Temperature>,
    /// Air or immersion-fluid temperature around the device
    pub fluid_temperature: Option<Temperature>,
    /// Measured wall power draw
    pub wattage: Option<Power>,
    /// Configured power limit or tuner power target
    pub wattage_limit: Option<Power>,
    /// Joules per terahash, derived from wattage and hashrate
    pub efficiency: Option<f64>,
    /// Whether the locate/fault light is currently flashing
    pub light_flashing: Option<bool>,
    /// Error and notice messages the device reports about itself
    pub messages: Vec<MinerMessage>,
    /// How long the device has been up
    pub uptime: Option<Duration>,
    /// Whether the device is currently hashing
    pub is_mining: bool,
    /// Configured pools, in the firmware's priority order
    pub pools: Vec<PoolData>,
}
