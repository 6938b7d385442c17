use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use serde_json::Value;
use strum::{EnumIter, IntoEnumIterator};
use tracing::debug;

use crate::miners::api::ApiClient;
use crate::miners::backends::traits::GetMinerData;
use crate::miners::commands::MinerCommand;

/// The closed set of logical fields a driver can be asked for.
///
/// One variant per field of the assembled report. Drivers declare where
/// each field lives on their firmware; fields a firmware cannot answer are
/// simply absent from its location table.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Copy, EnumIter)]
pub enum DataField {
    /// Report schema revision.
    SchemaVersion,
    /// When the report was assembled.
    Timestamp,
    /// Address the device is reached at.
    Ip,
    /// MAC address of the management interface.
    Mac,
    /// Resolved make/model/firmware identity.
    DeviceInfo,
    /// Control board serial number.
    SerialNumber,
    /// Announced network hostname.
    Hostname,
    /// Version of the telemetry API.
    ApiVersion,
    /// Firmware build string.
    FirmwareVersion,
    /// Control board hardware revision.
    ControlBoardVersion,
    /// Board count the model ships with.
    ExpectedHashboards,
    /// Per-board readings.
    Hashboards,
    /// Whole-device hashrate.
    Hashrate,
    /// Chip count the model ships with.
    ExpectedChips,
    /// Chips currently detected.
    TotalChips,
    /// Fan count the model ships with.
    ExpectedFans,
    /// Chassis fan readings.
    Fans,
    /// PSU fan readings.
    PsuFans,
    /// Mean chip temperature.
    AverageTemperature,
    /// Air or immersion fluid temperature.
    FluidTemperature,
    /// Measured wall power draw.
    Wattage,
    /// Configured power limit or target.
    WattageLimit,
    /// Joules per terahash.
    Efficiency,
    /// Whether the locate/fault light is flashing.
    LightFlashing,
    /// Device-reported errors and notices.
    Messages,
    /// Time since the device booted.
    Uptime,
    /// Whether the device is hashing right now.
    IsMining,
    /// Configured pools.
    Pools,
}

/// Digs one value out of a decoded response, steered by an optional key.
type ExtractorFn = for<'a> fn(&'a Value, Option<&'static str>) -> Option<&'a Value>;

/// How a field is read out of one command's response.
#[derive(Clone, Copy)]
pub struct DataExtractor {
    /// Walks the response shape.
    pub func: ExtractorFn,
    /// Key or pointer handed to `func`, for shapes that need one.
    pub key: Option<&'static str>,
}

/// Where a field lives: the command that answers it, paired with the
/// extractor that reads the answer.
pub type DataLocation = (MinerCommand, DataExtractor);

/// Flat lookup of `key` at the top level of the response.
///
/// `None` when no key was given or the response lacks it.
pub fn get_by_key<'a>(data: &'a Value, key: Option<&str>) -> Option<&'a Value> {
    data.get(key?)
}

/// Follows a JSON pointer down through the response.
///
/// `None` when no pointer was given or the path dead-ends.
pub fn get_by_pointer<'a>(data: &'a Value, pointer: Option<&str>) -> Option<&'a Value> {
    data.pointer(pointer?)
}

/// Turns a driver's location table into answered fields.
///
/// Fields are declarative: the backend's location table names which command
/// answers each field and how to dig the value out. The collector derives
/// the minimum command set, fetches it concurrently, and extracts per field,
/// so one unreadable field never poisons its siblings.
pub struct DataCollector<'a> {
    /// Driver whose location table is being read.
    miner: &'a dyn GetMinerData,
    /// Transport used to execute commands against the miner.
    api_client: &'a dyn ApiClient,
    /// Responses fetched so far; commands shared between fields are served
    /// from here instead of going back on the wire.
    cache: HashMap<MinerCommand, Value>,
}

impl<'a> DataCollector<'a> {
    /// Binds a driver's location table to the transport that serves it.
    pub fn new(miner: &'a dyn GetMinerData, api_client: &'a dyn ApiClient) -> Self {
        Self {
            miner,
            api_client,
            cache: HashMap::new(),
        }
    }

    /// Gathers every field in the schema; unmapped ones simply come back
    /// absent.
    pub async fn collect_all(&mut self) -> HashMap<DataField, &Value> {
        self.collect(DataField::iter().collect::<Vec<_>>().as_slice())
            .await
    }

    /// Gathers the named fields, fetching no more than they call for.
    ///
    /// Each required command is sent at most once per collection, no matter
    /// how many fields share it, and all of them are sent concurrently.
    pub async fn collect(&mut self, fields: &[DataField]) -> HashMap<DataField, &Value> {
        let needed: Vec<MinerCommand> = self
            .get_required_commands(fields)
            .into_iter()
            .filter(|command| !self.cache.contains_key(command))
            .collect();

        let api_client = self.api_client;
        let responses = join_all(needed.into_iter().map(|command| async move {
            (command, api_client.send_command(command).await)
        }))
        .await;

        for (command, result) in responses {
            match result {
                Ok(response) => {
                    self.cache.insert(command, response);
                }
                Err(error) => debug!(%command, %error, "command failed during collection"),
            }
        }

        // Extraction never touches the wire, only what arrived.
        let mut results = HashMap::new();
        for &field in fields {
            if let Some(value) = self.extract_field(field) {
                results.insert(field, value);
            }
        }

        results
    }

    /// The distinct commands the requested fields depend on, straight from
    /// the driver's location table.
    fn get_required_commands(&self, fields: &[DataField]) -> HashSet<MinerCommand> {
        fields
            .iter()
            .flat_map(|&field| self.miner.get_locations(field))
            .map(|(cmd, _)| *cmd)
            .collect()
    }

    /// Reads one field out of the responses that made it into the cache.
    ///
    /// Locations are tried in declaration order; the first hit wins.
    fn extract_field(&self, field: DataField) -> Option<&Value> {
        for (command, extractor) in self.miner.get_locations(field) {
            if let Some(response_data) = self.cache.get(command) {
                if let Some(value) = (extractor.func)(response_data, extractor.key) {
                    return Some(value);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::miner::MinerData;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const SUMMARY: MinerCommand = MinerCommand::Rpc { command: "summary" };
    const SYSTEM_INFO: MinerCommand = MinerCommand::Web {
        command: "system/info",
    };

    /// Transport double that records every command it is asked to run.
    struct ScriptedApi {
        calls: Mutex<Vec<MinerCommand>>,
        responses: HashMap<MinerCommand, Value>,
    }

    impl ScriptedApi {
        fn new(responses: Vec<(MinerCommand, Value)>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: responses.into_iter().collect(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ApiClient for ScriptedApi {
        async fn send_command(&self, command: MinerCommand) -> Result<Value> {
            self.calls.lock().unwrap().push(command);
            self.responses
                .get(&command)
                .cloned()
                .ok_or_else(|| Error::timeout("scripted transport"))
        }
    }

    struct TableOnly;

    #[async_trait]
    impl GetMinerData for TableOnly {
        async fn get_data(&self) -> MinerData {
            unreachable!("collector tests never call get_data")
        }

        fn get_locations(&self, data_field: DataField) -> &'static [DataLocation] {
            match data_field {
                DataField::Hashrate => &[(
                    SUMMARY,
                    DataExtractor {
                        func: get_by_pointer,
                        key: Some("/SUMMARY/0/MHS av"),
                    },
                )],
                DataField::Uptime => &[(
                    SUMMARY,
                    DataExtractor {
                        func: get_by_pointer,
                        key: Some("/SUMMARY/0/Elapsed"),
                    },
                )],
                DataField::Mac => &[(
                    SYSTEM_INFO,
                    DataExtractor {
                        func: get_by_key,
                        key: Some("macAddr"),
                    },
                )],
                _ => &[],
            }
        }
    }

    #[tokio::test]
    async fn fields_sharing_a_command_fetch_it_once() {
        let api = ScriptedApi::new(vec![(
            SUMMARY,
            json!({"SUMMARY": [{"MHS av": 13000.0, "Elapsed": 77}]}),
        )]);
        let miner = TableOnly;
        let mut collector = DataCollector::new(&miner, &api);

        let data = collector
            .collect(&[DataField::Hashrate, DataField::Uptime])
            .await;

        assert_eq!(data.get(&DataField::Hashrate), Some(&&json!(13000.0)));
        assert_eq!(data.get(&DataField::Uptime), Some(&&json!(77)));
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_command_leaves_other_fields_intact() {
        // Only the socket summary is scripted; the web command errors out.
        let api = ScriptedApi::new(vec![(
            SUMMARY,
            json!({"SUMMARY": [{"MHS av": 9000.0, "Elapsed": 10}]}),
        )]);
        let miner = TableOnly;
        let mut collector = DataCollector::new(&miner, &api);

        let data = collector
            .collect(&[DataField::Hashrate, DataField::Mac])
            .await;

        assert_eq!(data.get(&DataField::Hashrate), Some(&&json!(9000.0)));
        assert!(!data.contains_key(&DataField::Mac));
    }

    #[tokio::test]
    async fn absent_value_is_omitted_not_null() {
        // Summary answers, but carries no Elapsed key.
        let api = ScriptedApi::new(vec![(SUMMARY, json!({"SUMMARY": [{"MHS av": 1.0}]}))]);
        let miner = TableOnly;
        let mut collector = DataCollector::new(&miner, &api);

        let data = collector.collect(&[DataField::Uptime]).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn unmapped_fields_cost_no_commands() {
        let api = ScriptedApi::new(vec![]);
        let miner = TableOnly;
        let mut collector = DataCollector::new(&miner, &api);

        let data = collector.collect(&[DataField::SerialNumber]).await;
        assert!(data.is_empty());
        assert_eq!(api.call_count(), 0);
    }
}
