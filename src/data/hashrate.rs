/// Magnitude prefix a device reports its hashrate in.
///
/// Firmwares disagree here: the cgminer socket surface speaks megahashes,
/// ESPMiner gigahashes, scrypt machines report raw hashes. Values are kept
/// in their native unit and converted only at the point of use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashRateUnit {
    Hash,
    KiloHash,
    MegaHash,
    GigaHash,
    TeraHash,
    PetaHash,
    ExaHash,
    ZettaHash,
    YottaHash,
}

impl HashRateUnit {
    /// Hashes per second represented by one unit.
    pub fn as_hashes(&self) -> f64 {
        match self {
            HashRateUnit::Hash => 1.0,
            HashRateUnit::KiloHash => 1e3,
            HashRateUnit::MegaHash => 1e6,
            HashRateUnit::GigaHash => 1e9,
            HashRateUnit::TeraHash => 1e12,
            HashRateUnit::PetaHash => 1e15,
            HashRateUnit::ExaHash => 1e18,
            HashRateUnit::ZettaHash => 1e21,
            HashRateUnit::YottaHash => 1e24,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashRate {
    /// Magnitude in the native unit.
    pub value: f64,
    /// Native unit `value` was reported in.
    pub unit: HashRateUnit,
    /// Algorithm the hashes were computed for.
    pub algo: String,
}

impl HashRate {
    /// The rate in terahashes per second, regardless of native unit.
    pub fn as_terahashes(&self) -> f64 {
        self.value * self.unit.as_hashes() / 1e12
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_units_convert_to_terahashes() {
        let mhs = HashRate {
            value: 100_000_000.0,
            unit: HashRateUnit::MegaHash,
            algo: String::from("SHA256"),
        };
        assert_eq!(mhs.as_terahashes(), 100.0);

        let ghs = HashRate {
            value: 1200.0,
            unit: HashRateUnit::GigaHash,
            algo: String::from("SHA256"),
        };
        assert_eq!(ghs.as_terahashes(), 1.2);
    }
}
