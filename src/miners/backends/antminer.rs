use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use macaddr::MacAddr;
use measurements::{AngularVelocity, Temperature};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::data::board::BoardData;
use crate::data::device::{DeviceInfo, MinerHardware, MinerMake};
use crate::data::fan::FanData;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::miner::MinerData;
use crate::error::{Error, Result};
use crate::miners::api::ApiClient;
use crate::miners::api::rpc::RpcApiClient;
use crate::miners::api::web::{AntminerWebApi, WebApiClient};
use crate::miners::backends::traits::{GetMinerData, Miner, PowerControl};
use crate::miners::backends::{
    bool_field, f64_field, mac_field, pools_from_value, string_field, unix_timestamp_now,
    value_as_f64,
};
use crate::miners::commands::MinerCommand;
use crate::miners::data::{
    DataCollector, DataExtractor, DataField, DataLocation, get_by_key, get_by_pointer,
};

const SUMMARY_CMD: MinerCommand = MinerCommand::Rpc { command: "summary" };
const STATS_CMD: MinerCommand = MinerCommand::Rpc { command: "stats" };
const POOLS_CMD: MinerCommand = MinerCommand::Rpc { command: "pools" };
const VERSION_CMD: MinerCommand = MinerCommand::Rpc { command: "version" };
const SYSTEM_INFO_CMD: MinerCommand = MinerCommand::Web {
    command: "get_system_info",
};
const BLINK_STATUS_CMD: MinerCommand = MinerCommand::Web {
    command: "get_blink_status",
};

/// Work mode values accepted by `set_miner_conf`.
const WORK_MODE_NORMAL: &str = "0";
const WORK_MODE_SLEEP: &str = "1";

/// Driver for stock Antminer firmware, plus the rebrands and forks that
/// kept its control surface (Hammer hardware, Hiveon firmware).
///
/// Telemetry mixes the socket API with the digest-authed CGI endpoints;
/// power control is sleep mode only, toggled through the miner conf.
pub struct AntMinerStock {
    ip: IpAddr,
    device_info: DeviceInfo,
    hardware: MinerHardware,
    rpc: RpcApiClient,
    web: AntminerWebApi,
    /// Last-known MAC; treated as fixed for as long as the device is up.
    mac: Mutex<Option<MacAddr>>,
    /// Last-known fault light state, updated by reads and by set commands.
    light: Mutex<Option<bool>>,
}

impl AntMinerStock {
    pub fn new(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Self {
        AntMinerStock {
            ip,
            device_info,
            hardware,
            rpc: RpcApiClient::new(ip),
            web: AntminerWebApi::new(ip),
            mac: Mutex::new(None),
            light: Mutex::new(None),
        }
    }

    async fn set_work_mode(&self, mode: &str) -> Result<()> {
        let mut conf = self.web.get_miner_conf().await?;
        match conf.as_object_mut() {
            Some(obj) => {
                obj.insert("bitmain-work-mode".to_string(), Value::from(mode));
            }
            None => {
                return Err(Error::command(
                    self.ip,
                    "get_miner_conf",
                    "configuration response was not an object",
                ));
            }
        }
        self.web.set_miner_conf(&conf).await?;
        Ok(())
    }

    fn parse_data(&self, data: HashMap<DataField, &Value>) -> MinerData {
        let mac = mac_field(&data, DataField::Mac);
        let hostname = string_field(&data, DataField::Hostname);
        let serial_number = string_field(&data, DataField::SerialNumber);
        let api_version = string_field(&data, DataField::ApiVersion);
        let firmware_version = string_field(&data, DataField::FirmwareVersion);

        let hashrate = f64_field(&data, DataField::Hashrate).map(|f| HashRate {
            value: f,
            unit: HashRateUnit::GigaHash,
            algo: String::from("SHA256"),
        });

        // Several fields alias the same STATS entry; accept whichever the
        // caller asked for.
        let stats = data
            .get(&DataField::Hashboards)
            .or_else(|| data.get(&DataField::Fans))
            .or_else(|| data.get(&DataField::AverageTemperature))
            .or_else(|| data.get(&DataField::TotalChips));

        let hashboards = stats.map(|v| boards_from_stats(v)).unwrap_or_default();
        let fans = stats.map(|v| fans_from_stats(v)).unwrap_or_default();

        let chip_temps: Vec<f64> = hashboards
            .iter()
            .filter_map(|b| b.outlet_temperature)
            .map(|t| t.as_celsius())
            .collect();
        let average_temperature = (!chip_temps.is_empty())
            .then(|| chip_temps.iter().sum::<f64>() / chip_temps.len() as f64)
            .map(Temperature::from_celsius);

        let total_chips = hashboards
            .iter()
            .filter_map(|b| b.working_chips)
            .reduce(|a, b| a + b);

        let pools = data
            .get(&DataField::Pools)
            .map(|v| pools_from_value(v))
            .unwrap_or_default();

        let is_mining = hashrate.as_ref().is_some_and(|hr| hr.value > 0.0);

        MinerData {
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_timestamp_now(),
            ip: self.ip,
            mac,
            device_info: self.device_info.clone(),
            serial_number,
            hostname,
            api_version,
            firmware_version,
            control_board_version: None,
            expected_hashboards: self.hardware.expected_hashboards,
            hashboards,
            hashrate,
            expected_chips: self.hardware.expected_chips,
            total_chips,
            expected_fans: self.hardware.expected_fans,
            fans,
            psu_fans: vec![],
            average_temperature,
            fluid_temperature: None,
            wattage: None,
            wattage_limit: None,
            efficiency: None,
            light_flashing: bool_field(&data, DataField::LightFlashing),
            messages: vec![],
            uptime: f64_field(&data, DataField::Uptime).map(|f| Duration::from_secs(f as u64)),
            is_mining,
            pools,
        }
    }
}

/// Board data on stock firmware lives in flattened 1-based keys on the
/// second STATS entry: `chain_acn{i}`, `chain_rate{i}`, `temp{i}`,
/// `temp2_{i}`.
fn boards_from_stats(stats: &Value) -> Vec<BoardData> {
    let mut boards = Vec::new();
    for i in 1..=8 {
        let working_chips = stats
            .get(format!("chain_acn{i}"))
            .and_then(Value::as_u64)
            .map(|c| c as u16);
        let rate = stats.get(format!("chain_rate{i}")).and_then(value_as_f64);
        if working_chips.is_none() && rate.is_none() {
            continue;
        }

        let board_temperature = stats
            .get(format!("temp{i}"))
            .and_then(value_as_f64)
            .filter(|t| *t != 0.0)
            .map(Temperature::from_celsius);
        let outlet_temperature = stats
            .get(format!("temp2_{i}"))
            .and_then(value_as_f64)
            .filter(|t| *t != 0.0)
            .map(Temperature::from_celsius);

        let hashrate = rate.filter(|r| *r > 0.0).map(|r| HashRate {
            value: r,
            unit: HashRateUnit::GigaHash,
            algo: String::from("SHA256"),
        });

        boards.push(BoardData {
            position: (i - 1) as u8,
            hashrate: hashrate.clone(),
            expected_hashrate: None,
            board_temperature,
            intake_temperature: None,
            outlet_temperature,
            expected_chips: None,
            working_chips,
            serial_number: None,
            frequency: None,
            tuned: None,
            active: Some(hashrate.is_some()),
        });
    }
    boards
}

/// Fan speeds use the same flattened layout: `fan1` through `fan8`.
fn fans_from_stats(stats: &Value) -> Vec<FanData> {
    let mut fans = Vec::new();
    for i in 1..=8 {
        if let Some(rpm) = stats.get(format!("fan{i}")).and_then(value_as_f64) {
            if rpm > 0.0 {
                fans.push(FanData {
                    position: (i - 1) as i16,
                    rpm: AngularVelocity::from_rpm(rpm),
                });
            }
        }
    }
    fans
}

#[async_trait]
impl ApiClient for AntMinerStock {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Rpc { command } => self.rpc.send_command(command).await,
            MinerCommand::Web { command } => self.web.send_command(command).await,
        }
    }
}

#[async_trait]
impl GetMinerData for AntMinerStock {
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
                    key: Some("macaddr"),
                },
            )],
            DataField::Hostname => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("hostname"),
                },
            )],
            DataField::SerialNumber => &[(
                SYSTEM_INFO_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("serinum"),
                },
            )],
            DataField::ApiVersion => &[(
                VERSION_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/VERSION/0/API"),
                },
            )],
            DataField::FirmwareVersion => &[
                (
                    SYSTEM_INFO_CMD,
                    DataExtractor {
                        func: get_by_key,
                        key: Some("system_filesystem_version"),
                    },
                ),
                (
                    VERSION_CMD,
                    DataExtractor {
                        func: get_by_pointer,
                        key: Some("/VERSION/0/CompileTime"),
                    },
                ),
            ],
            DataField::Hashrate => &[
                (
                    SUMMARY_CMD,
                    DataExtractor {
                        func: get_by_pointer,
                        key: Some("/SUMMARY/0/GHS av"),
                    },
                ),
                (
                    SUMMARY_CMD,
                    DataExtractor {
                        func: get_by_pointer,
                        key: Some("/SUMMARY/0/GHS 5s"),
                    },
                ),
            ],
            DataField::Hashboards
            | DataField::Fans
            | DataField::AverageTemperature
            | DataField::TotalChips => &[(
                STATS_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/STATS/1"),
                },
            )],
            DataField::Uptime => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Elapsed"),
                },
            )],
            DataField::LightFlashing => &[(
                BLINK_STATUS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("blink"),
                },
            )],
            DataField::Pools => &[(
                POOLS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("POOLS"),
                },
            )],
            _ => &[],
        }
    }
}

#[async_trait]
impl Miner for AntMinerStock {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        match self.device_info.make {
            MinerMake::Hammer => "Hammer (Stock)",
            _ => "AntMiner (Stock)",
        }
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

    async fn get_fault_light(&self) -> Option<bool> {
        if let Some(state) = *self.light.lock().await {
            return Some(state);
        }
        let state = self
            .get_fields(&[DataField::LightFlashing])
            .await
            .light_flashing?;
        *self.light.lock().await = Some(state);
        Some(state)
    }

    fn power_control(&self) -> PowerControl {
        PowerControl::ShutdownOnly
    }

    async fn restart(&self) -> Result<()> {
        self.web.reboot().await?;
        Ok(())
    }

    async fn stop_mining(&self) -> Result<()> {
        self.set_work_mode(WORK_MODE_SLEEP).await
    }

    async fn resume_mining(&self) -> Result<()> {
        self.set_work_mode(WORK_MODE_NORMAL).await
    }

    async fn set_fault_light(&self, on: bool) -> Result<()> {
        self.web.blink(on).await?;
        *self.light.lock().await = Some(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_flattened_stats_tables() {
        let stats = json!({
            "fan_num": 4,
            "fan1": 5880, "fan2": 5850, "fan3": 0, "fan4": 6000,
            "chain_acn1": 114, "chain_rate1": "34505.21",
            "temp1": 56, "temp2_1": 71,
            "chain_acn2": 114, "chain_rate2": "34218.93",
            "temp2": 54, "temp2_2": 69,
            "chain_acn3": 0, "chain_rate3": "0.00",
            "temp3": 0, "temp2_3": 0
        });

        let boards = boards_from_stats(&stats);
        assert_eq!(boards.len(), 3);
        assert_eq!(boards[0].working_chips, Some(114));
        assert_eq!(
            boards[0].hashrate.as_ref().map(|h| h.value),
            Some(34505.21)
        );
        assert_eq!(
            boards[1].outlet_temperature.map(|t| t.as_celsius()),
            Some(69.0)
        );
        // Dead chain: no rate, no temps, but the slot is still reported.
        assert_eq!(boards[2].active, Some(false));
        assert_eq!(boards[2].outlet_temperature, None);

        let fans = fans_from_stats(&stats);
        assert_eq!(fans.len(), 3);
        assert_eq!(fans[0].rpm.as_rpm(), 5880.0);
        // Stopped fan slots are dropped, positions keep the device indexing.
        assert_eq!(fans[2].position, 3);
    }
}
