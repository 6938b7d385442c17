use serde::Serialize;
use std::fmt;

/// The hardware manufacturer of a miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MinerMake {
    AntMiner,
    WhatsMiner,
    AvalonMiner,
    Innosilicon,
    Goldshell,
    Auradine,
    BitAxe,
    IceRiver,
    Hammer,
    VolcMiner,
    ElphaPex,
    /// Devices whose manufacturer could not be established.
    Unknown,
}

impl fmt::Display for MinerMake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerMake::AntMiner => "AntMiner",
            MinerMake::WhatsMiner => "WhatsMiner",
            MinerMake::AvalonMiner => "AvalonMiner",
            MinerMake::Innosilicon => "Innosilicon",
            MinerMake::Goldshell => "Goldshell",
            MinerMake::Auradine => "Auradine",
            MinerMake::BitAxe => "BitAxe",
            MinerMake::IceRiver => "IceRiver",
            MinerMake::Hammer => "Hammer",
            MinerMake::VolcMiner => "VolcMiner",
            MinerMake::ElphaPex => "ElphaPex",
            MinerMake::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// The firmware family a miner is running.
///
/// Third party firmware forks report themselves differently from the stock
/// firmware they are based on, and expose different APIs, so this is tracked
/// separately from the hardware make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MinerFirmware {
    Stock,
    BraiinsOS,
    VNish,
    EPic,
    HiveOS,
    LuxOS,
    Marathon,
}

impl fmt::Display for MinerFirmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerFirmware::Stock => "Stock",
            MinerFirmware::BraiinsOS => "Braiins OS",
            MinerFirmware::VNish => "VNish",
            MinerFirmware::EPic => "ePIC",
            MinerFirmware::HiveOS => "HiveOS",
            MinerFirmware::LuxOS => "LuxOS",
            MinerFirmware::Marathon => "Marathon",
        };
        write!(f, "{name}")
    }
}

/// The hashing algorithm a device is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum HashAlgorithm {
    SHA256,
    Scrypt,
    KHeavyHash,
}

/// Static hardware expectations for a known model.
///
/// Populated from the driver registry when the model is recognized; every
/// field is optional because generic fallback drivers know none of this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinerHardware {
    /// Canonical model name, e.g. "Antminer S19 Pro"
    pub model: Option<&'static str>,
    /// The expected number of hashboards in the machine
    pub expected_hashboards: Option<u8>,
    /// The expected number of chassis fans
    pub expected_fans: Option<u8>,
    /// The expected total number of chips across all boards
    pub expected_chips: Option<u16>,
    /// The lowest power limit the firmware will accept, in watts
    pub min_wattage: Option<f64>,
    /// The highest power limit the firmware will accept, in watts
    pub max_wattage: Option<f64>,
}

impl MinerHardware {
    /// Hardware metadata for a machine nothing is known about.
    pub const fn unknown() -> Self {
        Self {
            model: None,
            expected_hashboards: None,
            expected_fans: None,
            expected_chips: None,
            min_wattage: None,
            max_wattage: None,
        }
    }
}

/// Identity metadata for one device: who made it, what model it reports,
/// which firmware family it runs and what it hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub make: MinerMake,
    /// The model string reported by the device, uppercased; `None` when the
    /// device never reported one and a generic driver is in use.
    pub model: Option<String>,
    pub firmware: MinerFirmware,
    pub algo: HashAlgorithm,
}

impl DeviceInfo {
    pub fn new(
        make: MinerMake,
        model: Option<String>,
        firmware: MinerFirmware,
        algo: HashAlgorithm,
    ) -> Self {
        Self {
            make,
            model,
            firmware,
            algo,
        }
    }
}
