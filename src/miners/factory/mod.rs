//! Device discovery and classification.
//!
//! Classification runs in two stages. Stage one races the socket and web
//! probes and takes the first channel that can name a family; stage two
//! asks the typed device for its model string. Each stage spends the
//! factory's retry budget before settling, and both are best-effort:
//! a device that answers but matches nothing still gets the generic driver,
//! only an address where nothing answers at all yields no miner.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use strum::EnumIter;
use tracing::debug;

use crate::data::device::{HashAlgorithm, MinerFirmware, MinerMake};
use crate::miners::backends::Miner;
use crate::util::race_first;

mod model;
mod registry;
mod rpc;
mod web;

pub(crate) const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_PROBE_RETRIES: u32 = 1;
/// Ceiling on concurrent probes during bulk discovery.
pub const DEFAULT_DISCOVERY_CONCURRENCY: usize = 64;

/// The vendor/firmware family a device was classified into.
///
/// Families are coarser than models: one family covers every SKU speaking
/// the same dialect, and third party firmwares are families of their own
/// regardless of the hardware underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum MinerType {
    Antminer,
    Whatsminer,
    AvalonMiner,
    Innosilicon,
    Goldshell,
    BraiinsOs,
    Vnish,
    Epic,
    Hiveon,
    LuxOs,
    Auradine,
    Marathon,
    Bitaxe,
    IceRiver,
    Hammer,
    VolcMiner,
    ElphaPex,
}

impl MinerType {
    /// The hardware make and firmware family behind this classification.
    /// Firmware forks all run on AntMiner hardware in practice.
    pub fn identity(&self) -> (MinerMake, MinerFirmware) {
        match self {
            MinerType::Antminer => (MinerMake::AntMiner, MinerFirmware::Stock),
            MinerType::Whatsminer => (MinerMake::WhatsMiner, MinerFirmware::Stock),
            MinerType::AvalonMiner => (MinerMake::AvalonMiner, MinerFirmware::Stock),
            MinerType::Innosilicon => (MinerMake::Innosilicon, MinerFirmware::Stock),
            MinerType::Goldshell => (MinerMake::Goldshell, MinerFirmware::Stock),
            MinerType::BraiinsOs => (MinerMake::AntMiner, MinerFirmware::BraiinsOS),
            MinerType::Vnish => (MinerMake::AntMiner, MinerFirmware::VNish),
            MinerType::Epic => (MinerMake::AntMiner, MinerFirmware::EPic),
            MinerType::Hiveon => (MinerMake::AntMiner, MinerFirmware::HiveOS),
            MinerType::LuxOs => (MinerMake::AntMiner, MinerFirmware::LuxOS),
            MinerType::Auradine => (MinerMake::Auradine, MinerFirmware::Stock),
            MinerType::Marathon => (MinerMake::AntMiner, MinerFirmware::Marathon),
            MinerType::Bitaxe => (MinerMake::BitAxe, MinerFirmware::Stock),
            MinerType::IceRiver => (MinerMake::IceRiver, MinerFirmware::Stock),
            MinerType::Hammer => (MinerMake::Hammer, MinerFirmware::Stock),
            MinerType::VolcMiner => (MinerMake::VolcMiner, MinerFirmware::Stock),
            MinerType::ElphaPex => (MinerMake::ElphaPex, MinerFirmware::Stock),
        }
    }

    /// What the family's machines hash.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            MinerType::Goldshell | MinerType::VolcMiner | MinerType::ElphaPex => {
                HashAlgorithm::Scrypt
            }
            MinerType::IceRiver => HashAlgorithm::KHeavyHash,
            _ => HashAlgorithm::SHA256,
        }
    }
}

impl fmt::Display for MinerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MinerType::Antminer => "Antminer",
            MinerType::Whatsminer => "Whatsminer",
            MinerType::AvalonMiner => "AvalonMiner",
            MinerType::Innosilicon => "Innosilicon",
            MinerType::Goldshell => "Goldshell",
            MinerType::BraiinsOs => "Braiins OS",
            MinerType::Vnish => "Vnish",
            MinerType::Epic => "ePIC",
            MinerType::Hiveon => "Hiveon",
            MinerType::LuxOs => "LuxOS",
            MinerType::Auradine => "Auradine",
            MinerType::Marathon => "Marathon",
            MinerType::Bitaxe => "Bitaxe",
            MinerType::IceRiver => "IceRiver",
            MinerType::Hammer => "Hammer",
            MinerType::VolcMiner => "VolcMiner",
            MinerType::ElphaPex => "ElphaPex",
        };
        write!(f, "{name}")
    }
}

/// One probe's verdict. A hit with no type means the channel answered but
/// matched no fingerprint, which still proves a device is there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProbeHit {
    pub miner_type: Option<MinerType>,
}

/// Builds drivers for devices found on the network.
#[derive(Debug, Clone, Copy)]
pub struct MinerFactory {
    timeout: Duration,
    retries: u32,
}

impl Default for MinerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MinerFactory {
    pub fn new() -> Self {
        MinerFactory {
            timeout: DEFAULT_PROBE_TIMEOUT,
            retries: DEFAULT_PROBE_RETRIES,
        }
    }

    /// Per-attempt probe timeout; retries each get a fresh one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Classify one address and build its driver. `None` means nothing
    /// answered on either channel across the whole retry budget.
    pub async fn get_miner(&self, ip: IpAddr) -> Option<Box<dyn Miner>> {
        let mut alive = false;
        let mut miner_type = None;

        for attempt in 0..=self.retries {
            let probes: Vec<BoxFuture<'static, Option<ProbeHit>>> = vec![
                Box::pin(rpc::probe(ip, self.timeout)),
                Box::pin(web::probe(ip, self.timeout)),
            ];
            if let Some(hit) = race_first(probes, |hit: &ProbeHit| hit.miner_type.is_some()).await
            {
                alive = true;
                if hit.miner_type.is_some() {
                    miner_type = hit.miner_type;
                    break;
                }
            }
            debug!(%ip, attempt, "classification attempt found no family");
        }

        if !alive {
            return None;
        }

        let model = match miner_type {
            Some(miner_type) => {
                retry_lookup(self.retries, || model::get_model(miner_type, ip, self.timeout)).await
            }
            None => None,
        };
        Some(registry::make_miner(miner_type, model, ip))
    }

    /// Probe many addresses at once, yielding drivers as devices turn up.
    /// At most `concurrency_limit` probes run at a time; addresses beyond
    /// that wait their turn.
    pub fn discover_miners(
        &self,
        ips: Vec<IpAddr>,
        concurrency_limit: usize,
    ) -> impl Stream<Item = Box<dyn Miner>> {
        let factory = *self;
        stream::iter(ips)
            .map(move |ip| async move { factory.get_miner(ip).await })
            .buffer_unordered(concurrency_limit.max(1))
            .filter_map(|miner| async move { miner })
    }
}

/// Re-run a best-effort lookup until it answers or the retry budget is
/// spent. Every attempt gets a fresh deadline from the lookup itself.
async fn retry_lookup<T, F, Fut>(retries: u32, mut lookup: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..=retries {
        if let Some(found) = lookup().await {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use tokio::time::sleep;

    #[test]
    fn firmware_forks_identify_as_antminer_hardware() {
        for fork in [
            MinerType::BraiinsOs,
            MinerType::Vnish,
            MinerType::Epic,
            MinerType::Hiveon,
            MinerType::LuxOs,
            MinerType::Marathon,
        ] {
            let (make, firmware) = fork.identity();
            assert_eq!(make, MinerMake::AntMiner);
            assert_ne!(firmware, MinerFirmware::Stock);
        }
    }

    #[test]
    fn stock_families_report_stock_firmware() {
        for miner_type in MinerType::iter() {
            let (make, firmware) = miner_type.identity();
            if firmware == MinerFirmware::Stock {
                assert_ne!(make, MinerMake::Unknown);
            }
        }
    }

    #[test]
    fn scrypt_and_kheavyhash_families_are_flagged() {
        assert_eq!(MinerType::Goldshell.algorithm(), HashAlgorithm::Scrypt);
        assert_eq!(MinerType::ElphaPex.algorithm(), HashAlgorithm::Scrypt);
        assert_eq!(MinerType::VolcMiner.algorithm(), HashAlgorithm::Scrypt);
        assert_eq!(MinerType::IceRiver.algorithm(), HashAlgorithm::KHeavyHash);
        assert_eq!(MinerType::Antminer.algorithm(), HashAlgorithm::SHA256);
    }

    #[tokio::test(start_paused = true)]
    async fn family_verdict_wins_in_either_channel_order() {
        for (family_delay, generic_delay) in [(5u64, 40u64), (40, 5)] {
            let channels: Vec<BoxFuture<'static, Option<ProbeHit>>> = vec![
                Box::pin(async move {
                    sleep(Duration::from_millis(family_delay)).await;
                    Some(ProbeHit {
                        miner_type: Some(MinerType::Whatsminer),
                    })
                }),
                Box::pin(async move {
                    sleep(Duration::from_millis(generic_delay)).await;
                    Some(ProbeHit { miner_type: None })
                }),
            ];

            let hit = race_first(channels, |hit: &ProbeHit| hit.miner_type.is_some()).await;
            assert_eq!(
                hit.and_then(|hit| hit.miner_type),
                Some(MinerType::Whatsminer)
            );
        }
    }

    #[tokio::test]
    async fn model_lookup_retries_after_an_empty_answer() {
        let mut attempts = 0;
        let model = retry_lookup(1, || {
            attempts += 1;
            let answer = (attempts > 1).then(|| "M30S++".to_string());
            async move { answer }
        })
        .await;

        assert_eq!(model.as_deref(), Some("M30S++"));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn model_lookup_gives_up_when_the_budget_runs_out() {
        let mut attempts = 0;
        let model: Option<String> = retry_lookup(1, || {
            attempts += 1;
            async { None }
        })
        .await;

        assert!(model.is_none());
        assert_eq!(attempts, 2);
    }
}
