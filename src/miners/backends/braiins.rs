use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use measurements::{AngularVelocity, Power, Temperature};
use serde_json::Value;

use crate::data::board::BoardData;
use crate::data::device::{DeviceInfo, MinerHardware};
use crate::data::fan::FanData;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::miner::MinerData;
use crate::error::Result;
use crate::miners::api::ApiClient;
use crate::miners::api::rpc::RpcApiClient;
use crate::miners::api::web::BraiinsWebApi;
use crate::miners::api::web::traits::WebApiClient;
use crate::miners::backends::traits::{GetMinerData, Miner, PowerControl};
use crate::miners::backends::{
    f64_field, pools_from_value, string_field, unix_timestamp_now, value_as_f64,
};
use crate::miners::commands::MinerCommand;
use crate::miners::data::{
    DataCollector, DataExtractor, DataField, DataLocation, get_by_key, get_by_pointer,
};

const SUMMARY_CMD: MinerCommand = MinerCommand::Rpc { command: "summary" };
const POOLS_CMD: MinerCommand = MinerCommand::Rpc { command: "pools" };
const FANS_CMD: MinerCommand = MinerCommand::Rpc { command: "fans" };
const TEMPS_CMD: MinerCommand = MinerCommand::Rpc { command: "temps" };
const VERSION_CMD: MinerCommand = MinerCommand::Rpc { command: "version" };
const TUNER_CMD: MinerCommand = MinerCommand::Rpc {
    command: "tunerstatus",
};

/// Driver for machines running Braiins OS.
///
/// BOSminer keeps the cgminer socket surface for telemetry and adds tuner
/// introspection; control goes through the management web API, which also
/// owns the autotuner's power target.
pub struct BraiinsOS {
    ip: IpAddr,
    device_info: DeviceInfo,
    hardware: MinerHardware,
    rpc: RpcApiClient,
    web: BraiinsWebApi,
}

impl BraiinsOS {
    pub fn new(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Self {
        BraiinsOS {
            ip,
            device_info,
            hardware,
            rpc: RpcApiClient::new(ip),
            web: BraiinsWebApi::new(ip),
        }
    }

    fn parse_data(&self, data: HashMap<DataField, &Value>) -> MinerData {
        let hashrate = f64_field(&data, DataField::Hashrate).map(|f| HashRate {
            value: f,
            unit: HashRateUnit::MegaHash,
            algo: String::from("SHA256"),
        });

        // The temps table backs both fields, so accept it under either key.
        let hashboards = data
            .get(&DataField::Hashboards)
            .or_else(|| data.get(&DataField::AverageTemperature))
            .map(|v| boards_from_temps(v))
            .unwrap_or_default();
        let fans = data
            .get(&DataField::Fans)
            .map(|v| fans_from_value(v))
            .unwrap_or_default();

        let wattage = f64_field(&data, DataField::Wattage).map(Power::from_watts);
        let wattage_limit = f64_field(&data, DataField::WattageLimit).map(Power::from_watts);
        let efficiency = match (&wattage, &hashrate) {
            (Some(w), Some(hr)) => super::efficiency_j_per_th(w.as_watts(), hr),
            _ => None,
        };

        let chip_temps: Vec<f64> = hashboards
            .iter()
            .filter_map(|b| b.outlet_temperature)
            .map(|t| t.as_celsius())
            .collect();
        let average_temperature = (!chip_temps.is_empty())
            .then(|| chip_temps.iter().sum::<f64>() / chip_temps.len() as f64)
            .map(Temperature::from_celsius);

        let pools = data
            .get(&DataField::Pools)
            .map(|v| pools_from_value(v))
            .unwrap_or_default();

        let is_mining = hashrate.as_ref().is_some_and(|hr| hr.value > 0.0);

        MinerData {
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_timestamp_now(),
            ip: self.ip,
            mac: None,
            device_info: self.device_info.clone(),
            serial_number: None,
            hostname: None,
            api_version: string_field(&data, DataField::ApiVersion),
            firmware_version: string_field(&data, DataField::FirmwareVersion),
            control_board_version: None,
            expected_hashboards: self.hardware.expected_hashboards,
            hashboards,
            hashrate,
            expected_chips: self.hardware.expected_chips,
            total_chips: None,
            expected_fans: self.hardware.expected_fans,
            fans,
            psu_fans: vec![],
            average_temperature,
            fluid_temperature: None,
            wattage,
            wattage_limit,
            efficiency,
            light_flashing: None,
            messages: vec![],
            uptime: f64_field(&data, DataField::Uptime).map(|f| Duration::from_secs(f as u64)),
            is_mining,
            pools,
        }
    }
}

/// BOSminer reports per-board temperatures with the hashboard slot as ID.
fn boards_from_temps(temps: &Value) -> Vec<BoardData> {
    let Some(entries) = temps.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| BoardData {
            position: entry
                .get("ID")
                .and_then(Value::as_u64)
                .map(|v| v as u8)
                .unwrap_or(idx as u8),
            hashrate: None,
            expected_hashrate: None,
            board_temperature: entry
                .get("Board")
                .and_then(value_as_f64)
                .map(Temperature::from_celsius),
            intake_temperature: None,
            outlet_temperature: entry
                .get("Chip")
                .and_then(value_as_f64)
                .map(Temperature::from_celsius),
            expected_chips: None,
            working_chips: None,
            serial_number: None,
            frequency: None,
            tuned: None,
            active: None,
        })
        .collect()
}

fn fans_from_value(fans: &Value) -> Vec<FanData> {
    let Some(entries) = fans.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let rpm = entry.get("RPM").and_then(value_as_f64)?;
            Some(FanData {
                position: entry
                    .get("ID")
                    .and_then(Value::as_u64)
                    .map(|v| v as i16)
                    .unwrap_or(-1),
                rpm: AngularVelocity::from_rpm(rpm),
            })
        })
        .collect()
}

#[async_trait]
impl ApiClient for BraiinsOS {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Rpc { command } => self.rpc.send_command(command).await,
            MinerCommand::Web { command } => self.web.send_command(command).await,
        }
    }
}

#[async_trait]
impl GetMinerData for BraiinsOS {
    async fn get_data(&self) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect_all().await;
        self.parse_data(data)
    }

    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
        match data_field {
            DataField::ApiVersion => &[(
                VERSION_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/VERSION/0/API"),
                },
            )],
            DataField::FirmwareVersion => &[(
                VERSION_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/VERSION/0/BOSminer"),
                },
            )],
            DataField::Hashrate => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/MHS av"),
                },
            )],
            DataField::Uptime => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Elapsed"),
                },
            )],
            DataField::Hashboards => &[(
                TEMPS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("TEMPS"),
                },
            )],
            DataField::AverageTemperature => &[(
                TEMPS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("TEMPS"),
                },
            )],
            DataField::Fans => &[(
                FANS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("FANS"),
                },
            )],
            DataField::Wattage => &[(
                TUNER_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/TUNERSTATUS/0/ApproximateMinerPowerConsumption"),
                },
            )],
            DataField::WattageLimit => &[(
                TUNER_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/TUNERSTATUS/0/PowerLimit"),
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
impl Miner for BraiinsOS {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        "AntMiner (Braiins OS)"
    }

    fn hardware(&self) -> MinerHardware {
        self.hardware
    }

    async fn get_fields(&self, fields: &[DataField]) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect(fields).await;
        self.parse_data(data)
    }

    fn power_control(&self) -> PowerControl {
        PowerControl::Tunable
    }

    fn power_limit_range(&self) -> Option<(Power, Power)> {
        match (self.hardware.min_wattage, self.hardware.max_wattage) {
            (Some(min), Some(max)) => Some((Power::from_watts(min), Power::from_watts(max))),
            _ => None,
        }
    }

    async fn restart(&self) -> Result<()> {
        self.web.restart().await?;
        Ok(())
    }

    async fn stop_mining(&self) -> Result<()> {
        self.web.pause_mining().await?;
        Ok(())
    }

    async fn resume_mining(&self) -> Result<()> {
        self.web.resume_mining().await?;
        Ok(())
    }

    async fn set_power_limit(&self, limit: Power) -> Result<()> {
        let watts = limit.as_watts().round() as u64;
        self.web.set_power_target(watts).await?;
        Ok(())
    }

    async fn set_fault_light(&self, on: bool) -> Result<()> {
        self.web.set_locate_device(on).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_board_and_chip_temps() {
        let temps = json!([
            {"TEMP": 0, "ID": 6, "Board": 68.0, "Chip": 81.2},
            {"TEMP": 1, "ID": 7, "Board": 66.5, "Chip": 79.9}
        ]);

        let boards = boards_from_temps(&temps);
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].position, 6);
        assert_eq!(
            boards[0].board_temperature.map(|t| t.as_celsius()),
            Some(68.0)
        );
        assert_eq!(
            boards[1].outlet_temperature.map(|t| t.as_celsius()),
            Some(79.9)
        );
    }
}
