use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use macaddr::MacAddr;
use measurements::{AngularVelocity, Power, Temperature};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::data::board::BoardData;
use crate::data::device::{DeviceInfo, MinerHardware};
use crate::data::fan::FanData;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::miner::MinerData;
use crate::error::{Error, Result};
use crate::miners::api::ApiClient;
use crate::miners::api::rpc::RpcApiClient;
use crate::miners::backends::traits::{GetMinerData, Miner, PowerControl};
use crate::miners::backends::{
    f64_field, mac_field, pools_from_value, string_field, unix_timestamp_now, value_as_f64,
};
use crate::miners::commands::MinerCommand;
use crate::miners::data::{
    DataCollector, DataExtractor, DataField, DataLocation, get_by_key, get_by_pointer,
};

const SUMMARY_CMD: MinerCommand = MinerCommand::Rpc { command: "summary" };
const POOLS_CMD: MinerCommand = MinerCommand::Rpc { command: "pools" };
const DEVS_CMD: MinerCommand = MinerCommand::Rpc { command: "devs" };
const FANS_CMD: MinerCommand = MinerCommand::Rpc { command: "fans" };
const POWER_CMD: MinerCommand = MinerCommand::Rpc { command: "power" };
const CONFIG_CMD: MinerCommand = MinerCommand::Rpc { command: "config" };
const VERSION_CMD: MinerCommand = MinerCommand::Rpc { command: "version" };

/// Driver for Antminer hardware running the LuxOS firmware.
///
/// LuxOS keeps the cgminer socket surface and extends it with dedicated
/// commands for fans, power and config. Write commands need a session id
/// from `logon`, passed as the first element of the parameter string.
pub struct LuxOS {
    ip: IpAddr,
    device_info: DeviceInfo,
    hardware: MinerHardware,
    rpc: RpcApiClient,
    /// Last-known MAC; treated as fixed for as long as the device is up.
    mac: Mutex<Option<MacAddr>>,
}

impl LuxOS {
    pub fn new(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Self {
        LuxOS {
            ip,
            device_info,
            hardware,
            rpc: RpcApiClient::new(ip),
            mac: Mutex::new(None),
        }
    }

    async fn session_id(&self) -> Result<String> {
        let response = self.rpc.send_command("logon").await?;
        let session = response.pointer("/SESSION/0/SessionID");
        session
            .and_then(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .or_else(|| v.as_u64().map(|n| n.to_string()))
            })
            .ok_or_else(|| Error::auth("logon response carried no session id"))
    }

    fn parse_data(&self, data: HashMap<DataField, &Value>) -> MinerData {
        let hashrate = f64_field(&data, DataField::Hashrate).map(|f| HashRate {
            value: f,
            unit: HashRateUnit::MegaHash,
            algo: String::from("SHA256"),
        });

        let hashboards = data
            .get(&DataField::Hashboards)
            .map(|v| boards_from_devs(v))
            .unwrap_or_default();
        let fans = data
            .get(&DataField::Fans)
            .map(|v| fans_from_value(v))
            .unwrap_or_default();

        let wattage = f64_field(&data, DataField::Wattage).map(Power::from_watts);
        let efficiency = match (&wattage, &hashrate) {
            (Some(w), Some(hr)) => super::efficiency_j_per_th(w.as_watts(), hr),
            _ => None,
        };

        let board_temps: Vec<f64> = hashboards
            .iter()
            .filter_map(|b| b.board_temperature)
            .map(|t| t.as_celsius())
            .collect();
        let average_temperature = (!board_temps.is_empty())
            .then(|| board_temps.iter().sum::<f64>() / board_temps.len() as f64)
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
            mac: mac_field(&data, DataField::Mac),
            device_info: self.device_info.clone(),
            serial_number: None,
            hostname: string_field(&data, DataField::Hostname),
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
            wattage_limit: None,
            efficiency,
            light_flashing: None,
            messages: vec![],
            uptime: f64_field(&data, DataField::Uptime).map(|f| Duration::from_secs(f as u64)),
            is_mining,
            pools,
        }
    }
}

fn boards_from_devs(devs: &Value) -> Vec<BoardData> {
    let Some(entries) = devs.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let hashrate = entry
                .get("MHS av")
                .and_then(value_as_f64)
                .filter(|r| *r > 0.0)
                .map(|r| HashRate {
                    value: r,
                    unit: HashRateUnit::MegaHash,
                    algo: String::from("SHA256"),
                });

            BoardData {
                position: entry
                    .get("ID")
                    .and_then(Value::as_u64)
                    .map(|v| v as u8)
                    .unwrap_or(idx as u8),
                hashrate,
                expected_hashrate: None,
                board_temperature: entry
                    .get("Temperature")
                    .and_then(value_as_f64)
                    .map(Temperature::from_celsius),
                intake_temperature: None,
                outlet_temperature: None,
                expected_chips: None,
                working_chips: None,
                serial_number: None,
                frequency: None,
                tuned: None,
                active: entry
                    .get("Status")
                    .and_then(Value::as_str)
                    .map(|s| s == "Alive"),
            }
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
                    .get("Fan")
                    .and_then(Value::as_u64)
                    .map(|v| v as i16)
                    .unwrap_or(-1),
                rpm: AngularVelocity::from_rpm(rpm),
            })
        })
        .collect()
}

#[async_trait]
impl ApiClient for LuxOS {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Rpc { command } => self.rpc.send_command(command).await,
            MinerCommand::Web { command } => Err(Error::not_supported(
                "AntMiner (LuxOS)",
                format!("web command {command}"),
            )),
        }
    }
}

#[async_trait]
impl GetMinerData for LuxOS {
    async fn get_data(&self) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect_all().await;
        self.parse_data(data)
    }

    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
        match data_field {
            DataField::Mac => &[(
                CONFIG_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/CONFIG/0/MACAddr"),
                },
            )],
            DataField::Hostname => &[(
                CONFIG_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/CONFIG/0/Hostname"),
                },
            )],
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
                    key: Some("/VERSION/0/LUXminer"),
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
                DEVS_CMD,
                DataExtractor {
                    func: get_by_key,
                    key: Some("DEVS"),
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
                POWER_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/POWER/0/Watts"),
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
impl Miner for LuxOS {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        "AntMiner (LuxOS)"
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

    fn power_control(&self) -> PowerControl {
        PowerControl::ShutdownOnly
    }

    async fn restart(&self) -> Result<()> {
        let session = self.session_id().await?;
        self.rpc
            .send_command_with_parameter("rebootdevice", &session)
            .await?;
        Ok(())
    }

    async fn stop_mining(&self) -> Result<()> {
        let session = self.session_id().await?;
        self.rpc
            .send_command_with_parameter("curtail", &format!("{session},sleep"))
            .await?;
        Ok(())
    }

    async fn resume_mining(&self) -> Result<()> {
        let session = self.session_id().await?;
        self.rpc
            .send_command_with_parameter("curtail", &format!("{session},wakeup"))
            .await?;
        Ok(())
    }

    async fn set_fault_light(&self, on: bool) -> Result<()> {
        let session = self.session_id().await?;
        let parameter = if on {
            format!("{session},red,blink")
        } else {
            format!("{session},auto")
        };
        self.rpc
            .send_command_with_parameter("ledset", &parameter)
            .await?;
        Ok(())
    }
}
