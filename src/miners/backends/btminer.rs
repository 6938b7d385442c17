use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use macaddr::MacAddr;
use measurements::{AngularVelocity, Frequency, Power, Temperature};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::data::board::BoardData;
use crate::data::device::{DeviceInfo, MinerHardware};
use crate::data::fan::FanData;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::message::{MessageSeverity, MinerMessage};
use crate::data::miner::MinerData;
use crate::error::Result;
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
const MINER_INFO_CMD: MinerCommand = MinerCommand::Rpc {
    command: "get_miner_info",
};
const VERSION_CMD: MinerCommand = MinerCommand::Rpc {
    command: "get_version",
};
const ERROR_CODE_CMD: MinerCommand = MinerCommand::Rpc {
    command: "get_error_code",
};

/// Driver for WhatsMiner machines running stock BTMiner firmware.
///
/// Everything runs over the socket API, which on this firmware keys its
/// requests with `cmd` and wraps most answers in a `Msg` object. The write
/// surface is the unencrypted control API; locked-down firmware rejects it
/// and the rejection is surfaced as an error.
pub struct BTMiner {
    ip: IpAddr,
    device_info: DeviceInfo,
    hardware: MinerHardware,
    rpc: RpcApiClient,
    /// Last-known MAC; treated as fixed for as long as the device is up.
    mac: Mutex<Option<MacAddr>>,
    /// Last-known fault light state, updated by reads and by set commands.
    light: Mutex<Option<bool>>,
}

impl BTMiner {
    pub fn new(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Self {
        BTMiner {
            ip,
            device_info,
            hardware,
            rpc: RpcApiClient::new(ip).with_command_key("cmd"),
            mac: Mutex::new(None),
            light: Mutex::new(None),
        }
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
            .map(|v| fans_from_summary(v))
            .unwrap_or_default();
        let psu_fans = data
            .get(&DataField::PsuFans)
            .and_then(|v| value_as_f64(v))
            .map(|rpm| {
                vec![FanData {
                    position: 0,
                    rpm: AngularVelocity::from_rpm(rpm),
                }]
            })
            .unwrap_or_default();

        let wattage = f64_field(&data, DataField::Wattage).map(Power::from_watts);
        let wattage_limit = f64_field(&data, DataField::WattageLimit).map(Power::from_watts);

        let efficiency = match (&wattage, &hashrate) {
            (Some(w), Some(hr)) => super::efficiency_j_per_th(w.as_watts(), hr),
            _ => None,
        };

        let total_chips = hashboards
            .iter()
            .filter_map(|b| b.working_chips)
            .reduce(|a, b| a + b);

        let pools = data
            .get(&DataField::Pools)
            .map(|v| pools_from_value(v))
            .unwrap_or_default();

        // The LED reports "auto" while healthy; anything else means an
        // operator or an alarm has it flashing.
        let light_flashing = data
            .get(&DataField::LightFlashing)
            .and_then(|v| v.as_str())
            .map(|s| s != "auto");

        let messages = data
            .get(&DataField::Messages)
            .map(|v| messages_from_error_codes(v))
            .unwrap_or_default();

        let is_mining = hashrate.as_ref().is_some_and(|hr| hr.value > 0.0);

        MinerData {
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_timestamp_now(),
            ip: self.ip,
            mac: mac_field(&data, DataField::Mac),
            device_info: self.device_info.clone(),
            serial_number: string_field(&data, DataField::SerialNumber),
            hostname: None,
            api_version: string_field(&data, DataField::ApiVersion),
            firmware_version: string_field(&data, DataField::FirmwareVersion),
            control_board_version: None,
            expected_hashboards: self.hardware.expected_hashboards,
            hashboards,
            hashrate,
            expected_chips: self.hardware.expected_chips,
            total_chips,
            expected_fans: self.hardware.expected_fans,
            fans,
            psu_fans,
            average_temperature: f64_field(&data, DataField::AverageTemperature)
                .map(Temperature::from_celsius),
            fluid_temperature: f64_field(&data, DataField::FluidTemperature)
                .map(Temperature::from_celsius),
            wattage,
            wattage_limit,
            efficiency,
            light_flashing,
            messages,
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
            let position = entry
                .get("Slot")
                .and_then(Value::as_u64)
                .map(|v| v as u8)
                .unwrap_or(idx as u8);
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
                position,
                hashrate,
                expected_hashrate: None,
                board_temperature: entry
                    .get("Temperature")
                    .and_then(value_as_f64)
                    .map(Temperature::from_celsius),
                intake_temperature: None,
                outlet_temperature: None,
                expected_chips: None,
                working_chips: entry
                    .get("Effective Chips")
                    .and_then(Value::as_u64)
                    .map(|v| v as u16),
                serial_number: entry
                    .get("PCB SN")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                frequency: entry
                    .get("Chip Frequency")
                    .and_then(value_as_f64)
                    .map(Frequency::from_megahertz),
                tuned: entry
                    .get("Upfreq Complete")
                    .and_then(Value::as_u64)
                    .map(|v| v == 1),
                active: entry
                    .get("Status")
                    .and_then(Value::as_str)
                    .map(|s| s == "Alive"),
            }
        })
        .collect()
}

/// Chassis fans are reported as intake/exhaust pairs on the summary.
fn fans_from_summary(summary: &Value) -> Vec<FanData> {
    let mut fans = Vec::new();
    for (position, key) in [(0, "Fan Speed In"), (1, "Fan Speed Out")] {
        if let Some(rpm) = summary.get(key).and_then(value_as_f64) {
            fans.push(FanData {
                position,
                rpm: AngularVelocity::from_rpm(rpm),
            });
        }
    }
    fans
}

/// Error codes arrive either as a bare list of codes or, on newer firmware,
/// as a code -> first-seen map. The map's timestamps are device-local
/// datetime strings, so they travel in the message text rather than the
/// timestamp field.
fn messages_from_error_codes(value: &Value) -> Vec<MinerMessage> {
    match value {
        Value::Array(codes) => codes
            .iter()
            .filter_map(Value::as_u64)
            .map(|code| MinerMessage {
                timestamp: 0,
                code,
                message: format!("miner error {code}"),
                severity: MessageSeverity::Error,
            })
            .collect(),
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(code, seen)| {
                let code = code.trim().parse().ok()?;
                let message = match seen.as_str() {
                    Some(when) => format!("miner error {code}, first seen {when}"),
                    None => format!("miner error {code}"),
                };
                Some(MinerMessage {
                    timestamp: 0,
                    code,
                    message,
                    severity: MessageSeverity::Error,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl ApiClient for BTMiner {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Rpc { command } => self.rpc.send_command(command).await,
            MinerCommand::Web { command } => Err(crate::error::Error::not_supported(
                "WhatsMiner (Stock)",
                format!("web command {command}"),
            )),
        }
    }
}

#[async_trait]
impl GetMinerData for BTMiner {
    async fn get_data(&self) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect_all().await;
        self.parse_data(data)
    }

    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
        match data_field {
            DataField::Mac => &[(
                MINER_INFO_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/mac"),
                },
            )],
            DataField::SerialNumber => &[(
                MINER_INFO_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/minersn"),
                },
            )],
            DataField::LightFlashing => &[(
                MINER_INFO_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/ledstat"),
                },
            )],
            DataField::ApiVersion => &[(
                VERSION_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/api_ver"),
                },
            )],
            DataField::FirmwareVersion => &[(
                VERSION_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/fw_ver"),
                },
            )],
            DataField::Hashrate => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/MHS av"),
                },
            )],
            DataField::Wattage => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Power"),
                },
            )],
            DataField::WattageLimit => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Power Limit"),
                },
            )],
            DataField::AverageTemperature => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Temperature"),
                },
            )],
            DataField::Fans => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0"),
                },
            )],
            DataField::PsuFans => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Power Fanspeed"),
                },
            )],
            DataField::FluidTemperature => &[(
                SUMMARY_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/SUMMARY/0/Env Temp"),
                },
            )],
            DataField::Messages => &[(
                ERROR_CODE_CMD,
                DataExtractor {
                    func: get_by_pointer,
                    key: Some("/Msg/error_code"),
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
impl Miner for BTMiner {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        "WhatsMiner (Stock)"
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
        PowerControl::Tunable
    }

    fn power_limit_range(&self) -> Option<(Power, Power)> {
        match (self.hardware.min_wattage, self.hardware.max_wattage) {
            (Some(min), Some(max)) => Some((Power::from_watts(min), Power::from_watts(max))),
            _ => None,
        }
    }

    async fn restart(&self) -> Result<()> {
        self.rpc
            .send_request("reboot", json!({"cmd": "reboot"}))
            .await?;
        Ok(())
    }

    async fn stop_mining(&self) -> Result<()> {
        self.rpc
            .send_request("power_off", json!({"cmd": "power_off", "respbefore": "true"}))
            .await?;
        Ok(())
    }

    async fn resume_mining(&self) -> Result<()> {
        self.rpc
            .send_request("power_on", json!({"cmd": "power_on"}))
            .await?;
        Ok(())
    }

    async fn set_power_limit(&self, limit: Power) -> Result<()> {
        let watts = limit.as_watts().round() as u64;
        self.rpc
            .send_request(
                "adjust_power_limit",
                json!({"cmd": "adjust_power_limit", "power_limit": watts.to_string()}),
            )
            .await?;
        Ok(())
    }

    async fn set_fault_light(&self, on: bool) -> Result<()> {
        let request = if on {
            json!({"cmd": "set_led", "color": "red", "period": 60, "duration": 20, "start": 0})
        } else {
            json!({"cmd": "set_led", "param": "auto"})
        };
        self.rpc.send_request("set_led", request).await?;
        *self.light.lock().await = Some(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dev_slots_into_boards() {
        let devs = json!([
            {
                "ASC": 0, "Slot": 0, "Status": "Alive", "Temperature": 68.5,
                "Chip Frequency": 618, "MHS av": 38012.5, "Effective Chips": 111,
                "PCB SN": "H3M1S7B9", "Upfreq Complete": 1
            },
            {
                "ASC": 1, "Slot": 1, "Status": "Dead", "Temperature": 0.0,
                "Chip Frequency": 0, "MHS av": 0.0, "Effective Chips": 0,
                "Upfreq Complete": 0
            }
        ]);

        let boards = boards_from_devs(&devs);
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].position, 0);
        assert_eq!(boards[0].working_chips, Some(111));
        assert_eq!(boards[0].tuned, Some(true));
        assert_eq!(boards[0].serial_number.as_deref(), Some("H3M1S7B9"));
        assert_eq!(boards[1].active, Some(false));
        assert_eq!(boards[1].hashrate, None);
    }

    #[test]
    fn reads_intake_and_exhaust_fans() {
        let summary = json!({"Fan Speed In": 4950, "Fan Speed Out": 4920, "MHS av": 1.0});
        let fans = fans_from_summary(&summary);
        assert_eq!(fans.len(), 2);
        assert_eq!(fans[0].position, 0);
        assert_eq!(fans[1].rpm.as_rpm(), 4920.0);
    }

    #[test]
    fn decodes_error_codes_in_both_shapes() {
        let bare = json!([2010, 2030]);
        let messages = messages_from_error_codes(&bare);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].code, 2010);
        assert_eq!(messages[0].severity, MessageSeverity::Error);

        let mapped = json!({"2010": "2023-08-17 09:28:22"});
        let messages = messages_from_error_codes(&mapped);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, 2010);
        assert!(messages[0].message.contains("2023-08-17"));
    }
}
