use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::data::device::DeviceInfo;
use crate::data::hashrate::{HashRate, HashRateUnit};
use crate::data::miner::MinerData;
use crate::error::Result;
use crate::miners::api::ApiClient;
use crate::miners::api::rpc::RpcApiClient;
use crate::miners::backends::traits::{GetMinerData, Miner};
use crate::miners::backends::{f64_field, pools_from_value, string_field, unix_timestamp_now};
use crate::miners::commands::MinerCommand;
use crate::miners::data::{
    DataCollector, DataExtractor, DataField, DataLocation, get_by_key, get_by_pointer,
};

const SUMMARY_CMD: MinerCommand = MinerCommand::Rpc { command: "summary" };
const VERSION_CMD: MinerCommand = MinerCommand::Rpc { command: "version" };
const POOLS_CMD: MinerCommand = MinerCommand::Rpc { command: "pools" };

/// Fallback driver for devices that answer the socket API but resisted
/// classification.
///
/// Reads whatever the generic cgminer command set yields and refuses every
/// control operation, so an operator still sees the machine in fleet
/// reports without any risk of driving it wrong.
pub struct UnknownMiner {
    ip: IpAddr,
    device_info: DeviceInfo,
    rpc: RpcApiClient,
}

impl UnknownMiner {
    pub fn new(ip: IpAddr, device_info: DeviceInfo) -> Self {
        UnknownMiner {
            ip,
            device_info,
            rpc: RpcApiClient::new(ip),
        }
    }

    fn parse_data(&self, data: HashMap<DataField, &Value>) -> MinerData {
        let hashrate = f64_field(&data, DataField::Hashrate).map(|f| HashRate {
            value: f,
            unit: HashRateUnit::MegaHash,
            algo: String::from("SHA256"),
        });

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
            expected_hashboards: None,
            hashboards: vec![],
            hashrate,
            expected_chips: None,
            total_chips: None,
            expected_fans: None,
            fans: vec![],
            psu_fans: vec![],
            average_temperature: None,
            fluid_temperature: None,
            wattage: None,
            wattage_limit: None,
            efficiency: None,
            light_flashing: None,
            messages: vec![],
            uptime: f64_field(&data, DataField::Uptime).map(|f| Duration::from_secs(f as u64)),
            is_mining,
            pools,
        }
    }
}

#[async_trait]
impl ApiClient for UnknownMiner {
    async fn send_command(&self, command: MinerCommand) -> Result<Value> {
        match command {
            MinerCommand::Rpc { command } => self.rpc.send_command(command).await,
            MinerCommand::Web { command } => Err(crate::error::Error::not_supported(
                "Generic (Unknown)",
                format!("web command {command}"),
            )),
        }
    }
}

#[async_trait]
impl GetMinerData for UnknownMiner {
    async fn get_data(&self) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect_all().await;
        self.parse_data(data)
    }

    fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
        match data_field {
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
                    key: Some("/VERSION/0/CompileTime"),
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
impl Miner for UnknownMiner {
    fn ip(&self) -> IpAddr {
        self.ip
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn name(&self) -> &'static str {
        "Generic (Unknown)"
    }

    async fn get_fields(&self, fields: &[DataField]) -> MinerData {
        let mut collector = DataCollector::new(self, self);
        let data = collector.collect(fields).await;
        self.parse_data(data)
    }
}
