use std::net::IpAddr;

use async_trait::async_trait;
use macaddr::MacAddr;
use measurements::Power;

use crate::data::device::{DeviceInfo, MinerHardware};
use crate::data::miner::MinerData;
use crate::error::{Error, Result};
use crate::miners::data::{DataField, DataLocation};

/// The data plane every backend implements.
#[async_trait]
pub trait GetMinerData: Send + Sync {
    /// Assemble the full standardized report for this device.
    async fn get_data(&self) -> MinerData;

    /// Where one field lives on this firmware.
    ///
    /// Each location pairs a device command with the extractor that digs
    /// the field out of that command's response. Fields the firmware
    /// cannot answer map to an empty slice.
    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation];
}

/// How much authority a driver has over a device's power draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerControl {
    /// The firmware accepts an arbitrary power target within a range.
    Tunable,
    /// Mining can be stopped and resumed, but not throttled in between.
    ShutdownOnly,
    /// No power control at all; the device draws what it draws.
    Fixed,
}

/// The full driver surface for a single device.
///
/// [`GetMinerData`] is the data plane; this adds identity, selective field
/// reads and control operations. Control defaults are refusals, so a
/// backend only opts into what its firmware can actually do and callers get
/// [`Error::NotSupported`] everywhere else.
#[async_trait]
pub trait Miner: GetMinerData {
    /// Address the driver talks to.
    fn ip(&self) -> IpAddr;

    /// Make, model and firmware as established during identification.
    fn device_info(&self) -> DeviceInfo;

    /// Driver name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Factory expectations for the identified model, when recognized.
    fn hardware(&self) -> MinerHardware {
        MinerHardware::unknown()
    }

    /// Retrieve only the named fields, normalized into `MinerData`.
    ///
    /// Costs only the device commands those fields need, which matters when
    /// polling a large fleet for a couple of values.
    async fn get_fields(&self, fields: &[DataField]) -> MinerData;

    /// The device's MAC address, when the firmware reports one.
    async fn get_mac(&self) -> Option<MacAddr> {
        None
    }

    /// Whether the fault light is currently flashing.
    async fn get_fault_light(&self) -> Option<bool> {
        None
    }

    /// Power authority of this driver.
    fn power_control(&self) -> PowerControl {
        PowerControl::Fixed
    }

    /// Lowest and highest power targets the firmware accepts.
    ///
    /// Only tunable drivers report a range, and only when the model was
    /// recognized; a tunable driver on an unknown model returns `None`.
    fn power_limit_range(&self) -> Option<(Power, Power)> {
        None
    }

    /// Reboot the device or restart its mining process.
    async fn restart(&self) -> Result<()> {
        Err(Error::not_supported(self.name(), "restart"))
    }

    /// Stop hashing while leaving the control board reachable.
    async fn stop_mining(&self) -> Result<()> {
        Err(Error::not_supported(self.name(), "stop mining"))
    }

    /// Resume hashing after [`Self::stop_mining`].
    async fn resume_mining(&self) -> Result<()> {
        Err(Error::not_supported(self.name(), "resume mining"))
    }

    /// Set the firmware's power target.
    async fn set_power_limit(&self, _limit: Power) -> Result<()> {
        Err(Error::not_supported(self.name(), "set power limit"))
    }

    /// Turn the fault light on or off.
    async fn set_fault_light(&self, _on: bool) -> Result<()> {
        Err(Error::not_supported(self.name(), "set fault light"))
    }
}
