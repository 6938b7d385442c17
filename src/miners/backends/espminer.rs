use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use macaddr::MacAddr;
use measurements::{AngularVelocity, Power, Temperature};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::data::device::{DeviceInfo, MinerHardware};
use crate::data::fan::FanData;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::miner::MinerData;
use crate::error::Result;
use crate::miners::api::ApiClient;
use crate::miners::api::web::{EspWebApi, WebApiClient};
use crate::miners::backends::traits::{GetMinerData, Miner};
use crate::miners::backends::{
    f64_field, mac_field, string_field, u64_field, unix_timestamp_now,
};
use crate::miners::commands::MinerCommand;
use crate::miners::data::{DataCollector, DataExtractor, DataField, DataLocation, get_by_key};

const SYSTEM_INFO_CMD: MinerCommand = MinerCommand::Web {
    command: "system/info",
};
const ASIC_INFO_CMD: MinerCommand = MinerCommand::Web {
    command: "system/asic",
};

/// Driver for ESPMiner firmware on BitAxe and similar open source boards.
///
/// A single-chip hobbyist device with a plain JSON web API and no power
/// management beyond a restart.
pub struct EspMiner {
    ip: IpAddr,
    device_info: DeviceInfo,
    hardware: MinerHardware,
    web: EspWebApi,
    /// Last-known MAC; treated as fixed for as long as the device is up.
    mac: Mutex<Option<MacAddr>>,
}

impl EspMiner {
    pub fn new(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Self {
        EspMiner {
            ip,
            device_info,
            hardware,
            web: EspWebApi::new(ip, 80),
            mac: Mutex::new(None),
        }
    }

    fn parse_data(&self, data: HashMap<DataField, &Value>) -> MinerData {
        let hashrate = f64_field(&data, DataField::Hashrate).map(|f| HashRate {
            value: f,
            unit: HashRateUnit::GigaHash,
            algo: String::from("SHA256"),
        });

        let wattage = f64_field(&data, DataField::Wattage).map(Power::from_watts);
        let efficiency = match (&wattage, &hashrate) {
            (Some(w), Some(hr)) => super::efficiency_j_per_th(w.as_watts(), hr),
            _ => None,
        };

        let fans = f64_field(&data, DataField::Fans)
            .map(|rpm| {
                vec![FanData {
                    position: 0,
                    rpm: AngularVelocity::from_rpm(rpm),
                }]
            })
            .unwrap_or_default();

        let total_chips = u64_field(&data, DataField::TotalChips).map(|u| u as u16);
        let is_mining = hashrate.as_ref().is_some_and(|hr| hr.value > 0.0);

        MinerData {
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_timestamp_now(),
            ip: self.ip,
            mac: mac_field(&data, DataField::Mac),
            device_info: self.device_info.clone(),
            serial_number: None,
            hostname: string_field(&data, DataField::Hostname),
            api_version: None,
            firmware_version: string_field(&data, DataField::FirmwareVersion),
            control_board_version: string_field(&data, DataField::ControlBoardVersion),
            expected_hashboards: u64_field(&data, DataField::ExpectedHashboards).map(|u| u as u8),
            hashboards: vec![],
            hashrate,
            expected_chips: total_chips,
            total_chips,
            expected_fans: Some(1),
            fans,
            psu_fans: vec![],
            average_temperature: f64_field(&data, DataField::AverageTemperature)
                .map(Temperature::from_celsius),
            fluid_temperature: None,
            wattage,
            wattage_limit: None,
            efficiency,
            light_flashing: None,
            messages: vec![],
            uptime: u64_field(&data, DataField::Uptime).map(Duration::from_secs),
            is_mining,
            pools: vec![],
        }
    }
}

#[async_trait]
impl ApiClient for EspMiner {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Web { command } => self.web.send_command(command).await,
            MinerCommand::Rpc { command } => Err(crate::error::Error::not_supported(
                "ESPMiner",
                format!("rpc command {command}"),
            )),
        }
    }
}

#[async_trait]
impl GetMinerData for EspMiner {
    async fn get_data(&self) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect_all().await;
        self.parse_data(data)
    }

    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
        match data_field {
            DataField::Mac => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("macAddr"),
                },
            )],
            DataField::Hostname => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("hostname"),
                },
            )],
            DataField::FirmwareVersion => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("version"),
                },
            )],
            DataField::ControlBoardVersion => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("boardVersion"),
                },
            )],
            DataField::ExpectedHashboards => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("asicCount"),
                },
            )],
            DataField::Hashrate => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("hashRate"),
                },
            )],
            DataField::TotalChips => &[
                (
                    SYSTEM_INFO_CMD,
                    DataExtractor {
                        func: get_by_key,
                        key: Some("smallCoreCount"),
                    },
                ),
                (
                    ASIC_INFO_CMD,
                    DataExtractor {
                        func: get_by_key,
                        key: Some("smallCoreCount"),
                    },
                ),
            ],
            DataField::Fans => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("fanrpm"),
                },
            )],
            DataField::AverageTemperature => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("temp"),
                },
            )],
            DataField::Wattage => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("power"),
                },
            )],
            DataField::Uptime => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("uptimeSeconds"),
                },
            )],
            _ => &[],
        }
    }
}

#[async_trait]
impl Miner for EspMiner {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        "ESPMiner"
    }

    fn hardware(&self) -> MinerHardware {
        self.hardware
    }

    async fn get_fields(&self, fields: &[DataField]) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect(fields).await;
        self.parse_data(data)
    }

    async fn get_mac(&self) -> Option<MacAddr> {
        if let Some(mac) = *self.mac.lock().await {
            return Some(mac);
        }
        let mac = self.get_fields(&[DataField::Mac]).await.mac?;
        *self.mac.lock().await = Some(mac);
        Some(mac)
    }

    async fn restart(&self) -> Result<()> {
        self.web.restart().await?;
        Ok(())
    }
}
