#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolData {
    /// The index of the pool in the device's configuration, 0 being highest priority
    pub position: Option<u16>,
    /// The stratum URL of the pool as configured on the device
    pub url: Option<String>,
    /// The worker or account name used to authenticate with the pool
    pub user: Option<String>,
    /// Whether the device currently has a live connection to this pool
    pub alive: Option<bool>,
    /// Whether this pool is the one currently being mined to
    pub active: Option<bool>,
    /// Shares this pool has accepted since the device started mining
    pub accepted_shares: Option<u64>,
    /// Shares this pool has rejected since the device started mining
    pub rejected_shares: Option<u64>,
}
