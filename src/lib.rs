//! Fleet-facing client library for ASIC miners.
//!
//! Point it at an address and it figures out what is there: which vendor,
//! which firmware, which model, and which driver can talk to it. Drivers
//! expose a uniform data plane over wildly different device APIs, tolerant
//! of the malformed JSON many stock firmwares emit, plus the control
//! operations each firmware actually supports. On top of that sits a power
//! load balancer that holds a whole group of machines to a wattage target.
//!
//! ```no_run
//! use minerfleet::DataField;
//! use std::net::IpAddr;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ip = IpAddr::from([192, 168, 1, 199]);
//!     if let Some(miner) = minerfleet::get_miner(ip).await {
//!         let data = miner.get_fields(&[DataField::Hashrate, DataField::Wattage]).await;
//!         println!("{:?} at {:?}", data.hashrate, data.wattage);
//!     }
//! }
//! ```

use std::net::IpAddr;

use futures::stream::Stream;

pub mod balancer;
pub mod data;
pub mod error;
pub mod miners;
mod util;

pub use balancer::{LoadBalancerEntry, PowerAction, balance, balance_and_apply};
pub use error::{Error, Result};
pub use miners::backends::{GetMinerData, Miner, PowerControl};
pub use miners::data::DataField;
pub use miners::factory::{DEFAULT_DISCOVERY_CONCURRENCY, MinerFactory, MinerType};

/// Classify the device at `ip` and build a driver for it, with default
/// probe settings. `None` means nothing answered there.
pub async fn get_miner(ip: IpAddr) -> Option<Box<dyn Miner>> {
    MinerFactory::new().get_miner(ip).await
}

/// Probe every address in `ips` with default settings, yielding drivers as
/// devices are found.
pub fn discover_miners(ips: Vec<IpAddr>) -> impl Stream<Item = Box<dyn Miner>> {
    MinerFactory::new().discover_miners(ips, DEFAULT_DISCOVERY_CONCURRENCY)
}
