//! The driver registry.
//!
//! A static two-level table: family first, then the uppercased model string
//! the device reported. A model miss falls back to the family's default
//! driver with no hardware expectations, a family miss falls back to the
//! generic driver. Model strings carrying a rebrand marker are rewritten to
//! the rebranding firmware's family before lookup.

use std::collections::HashMap;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::data::device::{DeviceInfo, HashAlgorithm, MinerFirmware, MinerHardware, MinerMake};
use crate::miners::backends::Miner;
use crate::miners::backends::antminer::AntMinerStock;
use crate::miners::backends::braiins::BraiinsOS;
use crate::miners::backends::btminer::BTMiner;
use crate::miners::backends::espminer::EspMiner;
use crate::miners::backends::luxos::LuxOS;
use crate::miners::backends::unknown::UnknownMiner;
use crate::miners::factory::MinerType;

type Constructor = fn(IpAddr, DeviceInfo, MinerHardware) -> Box<dyn Miner>;

struct ModelTable {
    default: Constructor,
    models: HashMap<&'static str, (MinerHardware, Constructor)>,
}

impl ModelTable {
    fn new(default: Constructor) -> Self {
        ModelTable {
            default,
            models: HashMap::new(),
        }
    }

    fn model(mut self, name: &'static str, hardware: MinerHardware) -> Self {
        self.models.insert(name, (hardware, self.default));
        self
    }
}

fn antminer_stock(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(AntMinerStock::new(ip, device_info, hardware))
}

fn btminer(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(BTMiner::new(ip, device_info, hardware))
}

fn luxos(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(LuxOS::new(ip, device_info, hardware))
}

fn braiins_os(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(BraiinsOS::new(ip, device_info, hardware))
}

fn esp_miner(ip: IpAddr, device_info: DeviceInfo, hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(EspMiner::new(ip, device_info, hardware))
}

fn generic(ip: IpAddr, device_info: DeviceInfo, _hardware: MinerHardware) -> Box<dyn Miner> {
    Box::new(UnknownMiner::new(ip, device_info))
}

const fn fixed(model: &'static str, boards: u8, fans: u8, chips: u16) -> MinerHardware {
    MinerHardware {
        model: Some(model),
        expected_hashboards: Some(boards),
        expected_fans: Some(fans),
        expected_chips: Some(chips),
        min_wattage: None,
        max_wattage: None,
    }
}

const fn tunable(
    model: &'static str,
    boards: u8,
    fans: u8,
    chips: u16,
    min_wattage: f64,
    max_wattage: f64,
) -> MinerHardware {
    MinerHardware {
        model: Some(model),
        expected_hashboards: Some(boards),
        expected_fans: Some(fans),
        expected_chips: Some(chips),
        min_wattage: Some(min_wattage),
        max_wattage: Some(max_wattage),
    }
}

static REGISTRY: Lazy<HashMap<MinerType, ModelTable>> = Lazy::new(|| {
    let mut registry = HashMap::new();

    registry.insert(
        MinerType::Antminer,
        ModelTable::new(antminer_stock)
            .model("ANTMINER S9", fixed("Antminer S9", 3, 2, 189))
            .model("ANTMINER S17", fixed("Antminer S17", 3, 4, 144))
            .model("ANTMINER S19", fixed("Antminer S19", 3, 4, 228))
            .model("ANTMINER S19 PRO", fixed("Antminer S19 Pro", 3, 4, 342))
            .model("ANTMINER S19J PRO", fixed("Antminer S19j Pro", 3, 4, 378))
            .model("ANTMINER S21", fixed("Antminer S21", 3, 4, 531))
            .model("ANTMINER T21", fixed("Antminer T21", 3, 4, 450)),
    );
    registry.insert(
        MinerType::Hammer,
        ModelTable::new(antminer_stock).model("HAMMER D10", fixed("Hammer D10", 3, 2, 180)),
    );
    registry.insert(
        MinerType::Hiveon,
        ModelTable::new(antminer_stock)
            .model("ANTMINER S9", fixed("Antminer S9", 3, 2, 189))
            .model("ANTMINER T9", fixed("Antminer T9", 3, 2, 162)),
    );
    registry.insert(
        MinerType::Whatsminer,
        ModelTable::new(btminer)
            .model("M20S", tunable("WhatsMiner M20S", 3, 2, 210, 1800.0, 3600.0))
            .model("M30S", tunable("WhatsMiner M30S", 3, 2, 444, 2000.0, 3600.0))
            .model("M30S+", tunable("WhatsMiner M30S+", 3, 2, 465, 2200.0, 3800.0))
            .model("M30S++", tunable("WhatsMiner M30S++", 3, 2, 510, 2400.0, 4000.0))
            .model("M31S", tunable("WhatsMiner M31S", 3, 2, 351, 2000.0, 3600.0))
            .model("M50", tunable("WhatsMiner M50", 3, 2, 297, 2200.0, 3900.0)),
    );
    registry.insert(
        MinerType::LuxOs,
        ModelTable::new(luxos)
            .model("ANTMINER S9", fixed("Antminer S9", 3, 2, 189))
            .model("ANTMINER S19", fixed("Antminer S19", 3, 4, 228))
            .model("ANTMINER S19 PRO", fixed("Antminer S19 Pro", 3, 4, 342)),
    );
    registry.insert(
        MinerType::BraiinsOs,
        ModelTable::new(braiins_os)
            .model("ANTMINER S9", tunable("Antminer S9", 3, 2, 189, 600.0, 1600.0))
            .model("ANTMINER S19", tunable("Antminer S19", 3, 4, 228, 1000.0, 3400.0))
            .model(
                "ANTMINER S19J PRO",
                tunable("Antminer S19j Pro", 3, 4, 378, 1200.0, 3200.0),
            ),
    );
    registry.insert(
        MinerType::Bitaxe,
        ModelTable::new(esp_miner)
            .model("BM1366", fixed("Bitaxe Ultra", 1, 1, 1))
            .model("BM1368", fixed("Bitaxe Supra", 1, 1, 1))
            .model("BM1370", fixed("Bitaxe Gamma", 1, 1, 1))
            .model("BM1397", fixed("Bitaxe Max", 1, 1, 1)),
    );

    // Families identified but without a dedicated backend run over the
    // generic driver; most of them keep a cgminer-compatible socket API.
    registry.insert(MinerType::AvalonMiner, ModelTable::new(generic));
    registry.insert(MinerType::Innosilicon, ModelTable::new(generic));
    registry.insert(MinerType::Goldshell, ModelTable::new(generic));
    registry.insert(MinerType::Vnish, ModelTable::new(generic));
    registry.insert(MinerType::Epic, ModelTable::new(generic));
    registry.insert(MinerType::Auradine, ModelTable::new(generic));
    registry.insert(MinerType::Marathon, ModelTable::new(generic));
    registry.insert(MinerType::IceRiver, ModelTable::new(generic));
    registry.insert(MinerType::VolcMiner, ModelTable::new(generic));
    registry.insert(MinerType::ElphaPex, ModelTable::new(generic));

    registry
});

/// Select and build a driver for a classified device.
///
/// `miner_type` of `None` means classification exhausted its retry budget;
/// the device still gets the generic driver rather than an error.
pub(crate) fn make_miner(
    miner_type: Option<MinerType>,
    model: Option<String>,
    ip: IpAddr,
) -> Box<dyn Miner> {
    let model = model.map(|m| m.trim().to_uppercase());

    let Some(miner_type) = miner_type else {
        let device_info = DeviceInfo::new(
            MinerMake::Unknown,
            model,
            MinerFirmware::Stock,
            HashAlgorithm::SHA256,
        );
        return Box::new(UnknownMiner::new(ip, device_info));
    };

    let (miner_type, model) = rebrand_rewrite(miner_type, model);
    let (make, firmware) = miner_type.identity();
    let device_info = DeviceInfo::new(make, model.clone(), firmware, miner_type.algorithm());

    let Some(table) = REGISTRY.get(&miner_type) else {
        return Box::new(UnknownMiner::new(ip, device_info));
    };

    match model.as_deref().and_then(|m| table.models.get(m)) {
        Some((hardware, constructor)) => constructor(ip, device_info, *hardware),
        None => {
            if let Some(model) = &model {
                warn!(
                    %ip,
                    %miner_type,
                    model,
                    "no dedicated driver for this model, using the family default"
                );
            }
            (table.default)(ip, device_info, MinerHardware::unknown())
        }
    }
}

/// Rewrites applied before the table lookup. Hiveon machines report a stock
/// Antminer model string with the firmware's name spliced in; Hammer
/// machines answer the stock Antminer fingerprint but name themselves in
/// the model.
fn rebrand_rewrite(miner_type: MinerType, model: Option<String>) -> (MinerType, Option<String>) {
    let Some(model) = model else {
        return (miner_type, None);
    };
    if model.contains("HIVEON") {
        let stripped = model.replace("HIVEON", " ");
        let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        return (MinerType::Hiveon, Some(stripped));
    }
    if miner_type == MinerType::Antminer && model.contains("HAMMER") {
        return (MinerType::Hammer, Some(model));
    }
    (miner_type, Some(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use strum::IntoEnumIterator;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    #[test]
    fn recognized_model_gets_its_hardware_table() {
        let miner = make_miner(Some(MinerType::Antminer), Some("Antminer S19 Pro".into()), ip());
        assert_eq!(miner.hardware().model, Some("Antminer S19 Pro"));
        assert_eq!(miner.hardware().expected_hashboards, Some(3));
        assert_eq!(miner.name(), "AntMiner (Stock)");
    }

    #[test]
    fn unrecognized_model_falls_back_to_the_family_default() {
        let miner = make_miner(Some(MinerType::Antminer), Some("Antminer S99 Hydro".into()), ip());
        assert_eq!(miner.hardware(), MinerHardware::unknown());
        assert_eq!(miner.name(), "AntMiner (Stock)");
        assert_eq!(miner.device_info().model.as_deref(), Some("ANTMINER S99 HYDRO"));
    }

    #[test]
    fn unknown_type_gets_the_generic_driver() {
        let miner = make_miner(None, None, ip());
        assert_eq!(miner.name(), "Generic (Unknown)");
        assert_eq!(miner.device_info().make, MinerMake::Unknown);
    }

    #[test]
    fn hiveon_marker_rewrites_the_family_and_the_model() {
        let miner = make_miner(Some(MinerType::Antminer), Some("Antminer S9 Hiveon".into()), ip());
        assert_eq!(miner.device_info().firmware, MinerFirmware::HiveOS);
        assert_eq!(miner.device_info().model.as_deref(), Some("ANTMINER S9"));
        assert_eq!(miner.hardware().model, Some("Antminer S9"));
    }

    #[test]
    fn hammer_model_reclassifies_an_antminer_fingerprint() {
        let miner = make_miner(Some(MinerType::Antminer), Some("Hammer D10".into()), ip());
        assert_eq!(miner.device_info().make, MinerMake::Hammer);
        assert_eq!(miner.name(), "Hammer (Stock)");
        assert_eq!(miner.hardware().model, Some("Hammer D10"));
    }

    #[test]
    fn tunable_models_carry_a_power_range() {
        let miner = make_miner(Some(MinerType::Whatsminer), Some("M30S".into()), ip());
        let (min, max) = miner.power_limit_range().unwrap();
        assert_eq!(min.as_watts(), 2000.0);
        assert_eq!(max.as_watts(), 3600.0);
    }

    #[test]
    fn every_family_has_a_table() {
        for miner_type in MinerType::iter() {
            assert!(
                REGISTRY.contains_key(&miner_type),
                "missing table for {miner_type}"
            );
        }
    }
}
