//! Fleet power load balancing.
//!
//! Given a group of devices and a wattage target for the whole group,
//! decide what each device should do: an explicit power limit, stay on at
//! full rate, or shut down. The decision phase is pure computation over
//! already-fetched telemetry; [`balance_and_apply`] wraps it with the
//! telemetry reads and the command dispatch.

use std::collections::HashMap;
use std::net::IpAddr;

use futures::future::join_all;
use measurements::Power;
use tracing::warn;

use crate::error::{Error, Result};
use crate::miners::backends::{Miner, PowerControl};
use crate::miners::data::DataField;

/// What one device should be told to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerAction {
    /// Command an explicit power limit.
    SetPower(Power),
    /// Resume mining at full or last-known rate.
    On,
    /// Enter the lowest-power state.
    Off,
}

/// One device's power envelope as the balancer sees it.
///
/// Conventions per tier: tunable devices carry their settable `min..max`
/// range; shutdown-only devices carry their full-rate draw as `max` and
/// zero as `min`; fixed devices carry their constant draw as both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadBalancerEntry {
    pub addr: IpAddr,
    pub control: PowerControl,
    pub min: Power,
    pub max: Power,
}

fn tier(
    entries: &[LoadBalancerEntry],
    control: PowerControl,
) -> impl Iterator<Item = &LoadBalancerEntry> {
    entries.iter().filter(move |entry| entry.control == control)
}

/// Decide a power action for every controllable device in the group.
///
/// The target must lie within the group's feasible envelope: at least every
/// tunable device at its minimum plus the fixed draw, at most everything on
/// at full rate. Outside that range no safe silent action exists, so the
/// violation is a hard error and nothing is commanded.
///
/// The strategy is an ordered ladder. With a comfortable target everything
/// stays on and the tunable tier splits the remainder evenly. As the target
/// drops below what half the tunable capacity can absorb, shutdown-only
/// devices are shed largest-first to give the tunable tier room. Below
/// that, every shutdown-only device goes dark and the tunable tier rides
/// toward its minimums, with members pinned at their floor as the even
/// share falls under it.
///
/// Fixed-tier devices take no action; they contribute a constant draw to
/// the arithmetic and are absent from the returned map.
pub fn balance(
    entries: &[LoadBalancerEntry],
    target: Power,
) -> Result<HashMap<IpAddr, PowerAction>> {
    let target_watts = target.as_watts();

    let fixed_total: f64 = tier(entries, PowerControl::Fixed)
        .map(|entry| entry.max.as_watts())
        .sum();
    let shutdown_on: f64 = tier(entries, PowerControl::ShutdownOnly)
        .map(|entry| entry.max.as_watts())
        .sum();
    let tunable_min: f64 = tier(entries, PowerControl::Tunable)
        .map(|entry| entry.min.as_watts())
        .sum();
    let tunable_max: f64 = tier(entries, PowerControl::Tunable)
        .map(|entry| entry.max.as_watts())
        .sum();

    let minimum = tunable_min + fixed_total;
    let maximum = tunable_max + shutdown_on + fixed_total;
    if target_watts < minimum {
        return Err(Error::PowerTargetTooLow {
            target: target_watts,
            minimum,
        });
    }
    if target_watts > maximum {
        return Err(Error::PowerTargetTooHigh {
            target: target_watts,
            maximum,
        });
    }

    let mut shutdown: Vec<&LoadBalancerEntry> =
        tier(entries, PowerControl::ShutdownOnly).collect();
    shutdown.sort_by(|a, b| b.max.as_watts().total_cmp(&a.max.as_watts()));

    let half_tunable = tunable_max / 2.0;
    let mut actions = HashMap::new();

    let tunable_budget = if target_watts >= half_tunable + shutdown_on + fixed_total {
        // Comfortable target: everything stays on.
        for entry in &shutdown {
            actions.insert(entry.addr, PowerAction::On);
        }
        target_watts - fixed_total - shutdown_on
    } else if target_watts >= half_tunable + fixed_total {
        // Shed shutdown-only devices, largest first, until the tunable tier
        // has at least half its capacity to work with. Skip a device whose
        // removal would hand the tunable tier more budget than it can take.
        let mut budget = target_watts - fixed_total - shutdown_on;
        for entry in &shutdown {
            let watts = entry.max.as_watts();
            if budget < half_tunable && budget + watts <= tunable_max {
                actions.insert(entry.addr, PowerAction::Off);
                budget += watts;
            } else {
                actions.insert(entry.addr, PowerAction::On);
            }
        }
        budget
    } else {
        // Low target: nothing shutdown-only stays up.
        for entry in &shutdown {
            actions.insert(entry.addr, PowerAction::Off);
        }
        target_watts - fixed_total
    };

    for (addr, watts) in share_evenly(tier(entries, PowerControl::Tunable), tunable_budget) {
        actions.insert(addr, PowerAction::SetPower(Power::from_watts(watts)));
    }
    Ok(actions)
}

/// Split a budget across the tunable tier, clamping each member into its
/// own range. Members whose bounds force them off the even share are pinned
/// first and the remainder is re-split over the rest, largest capacity
/// considered first for determinism.
fn share_evenly<'a>(
    tunables: impl Iterator<Item = &'a LoadBalancerEntry>,
    budget: f64,
) -> Vec<(IpAddr, f64)> {
    let mut pool: Vec<&LoadBalancerEntry> = tunables.collect();
    pool.sort_by(|a, b| b.max.as_watts().total_cmp(&a.max.as_watts()));

    let mut assigned = Vec::new();
    let mut budget = budget;
    while !pool.is_empty() {
        let share = budget / pool.len() as f64;
        if let Some(position) = pool.iter().position(|entry| entry.min.as_watts() > share) {
            let entry = pool.remove(position);
            assigned.push((entry.addr, entry.min.as_watts()));
            budget -= entry.min.as_watts();
            continue;
        }
        if let Some(position) = pool.iter().position(|entry| entry.max.as_watts() < share) {
            let entry = pool.remove(position);
            assigned.push((entry.addr, entry.max.as_watts()));
            budget -= entry.max.as_watts();
            continue;
        }
        for entry in pool.drain(..) {
            assigned.push((entry.addr, share));
        }
    }
    assigned
}

/// Read each device's power envelope, run [`balance`] and dispatch the
/// resulting commands, concurrently and independently per device. A device
/// that refuses or fails its command is logged and skipped; the rest of the
/// group is still commanded. Returns the aggregate wattage the group should
/// settle at once the commands take effect.
pub async fn balance_and_apply(miners: &[Box<dyn Miner>], target: Power) -> Result<Power> {
    let entries = join_all(miners.iter().map(|miner| entry_for(miner.as_ref()))).await;
    let actions = balance(&entries, target)?;

    let dispatches = miners.iter().filter_map(|miner| {
        actions
            .get(&miner.ip())
            .copied()
            .map(|action| apply_action(miner.as_ref(), action))
    });
    join_all(dispatches).await;

    let realized = entries
        .iter()
        .map(|entry| match actions.get(&entry.addr) {
            Some(PowerAction::SetPower(power)) => power.as_watts(),
            Some(PowerAction::On) => entry.max.as_watts(),
            Some(PowerAction::Off) => 0.0,
            // Fixed tier: keeps drawing what it draws.
            None => entry.max.as_watts(),
        })
        .sum();
    Ok(Power::from_watts(realized))
}

/// Build a balancer entry from a driver's static metadata plus one
/// telemetry read. A tunable driver with no published range cannot be
/// commanded safely, so it degrades to the fixed tier at its observed draw.
async fn entry_for(miner: &dyn Miner) -> LoadBalancerEntry {
    let data = miner
        .get_fields(&[DataField::Wattage, DataField::WattageLimit])
        .await;
    let draw = data
        .wattage
        .or(data.wattage_limit)
        .unwrap_or(Power::from_watts(0.0));
    let addr = miner.ip();

    match miner.power_control() {
        PowerControl::Tunable => match miner.power_limit_range() {
            Some((min, max)) => LoadBalancerEntry {
                addr,
                control: PowerControl::Tunable,
                min,
                max,
            },
            None => LoadBalancerEntry {
                addr,
                control: PowerControl::Fixed,
                min: draw,
                max: draw,
            },
        },
        PowerControl::ShutdownOnly => LoadBalancerEntry {
            addr,
            control: PowerControl::ShutdownOnly,
            min: Power::from_watts(0.0),
            max: draw,
        },
        PowerControl::Fixed => LoadBalancerEntry {
            addr,
            control: PowerControl::Fixed,
            min: draw,
            max: draw,
        },
    }
}

async fn apply_action(miner: &dyn Miner, action: PowerAction) {
    let result = match action {
        PowerAction::SetPower(power) => miner.set_power_limit(power).await,
        PowerAction::On => miner.resume_mining().await,
        PowerAction::Off => miner.stop_mining().await,
    };
    if let Err(error) = result {
        warn!(ip = %miner.ip(), %error, "power balancing command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn tunable_entry(last: u8, min: f64, max: f64) -> LoadBalancerEntry {
        LoadBalancerEntry {
            addr: addr(last),
            control: PowerControl::Tunable,
            min: Power::from_watts(min),
            max: Power::from_watts(max),
        }
    }

    fn shutdown_entry(last: u8, max: f64) -> LoadBalancerEntry {
        LoadBalancerEntry {
            addr: addr(last),
            control: PowerControl::ShutdownOnly,
            min: Power::from_watts(0.0),
            max: Power::from_watts(max),
        }
    }

    fn fixed_entry(last: u8, draw: f64) -> LoadBalancerEntry {
        LoadBalancerEntry {
            addr: addr(last),
            control: PowerControl::Fixed,
            min: Power::from_watts(draw),
            max: Power::from_watts(draw),
        }
    }

    fn watts(action: &PowerAction) -> f64 {
        match action {
            PowerAction::SetPower(power) => power.as_watts(),
            other => panic!("expected a wattage, got {other:?}"),
        }
    }

    #[test]
    fn target_below_group_minimum_is_rejected() {
        let entries = [tunable_entry(1, 100.0, 1000.0), fixed_entry(2, 500.0)];
        let error = balance(&entries, Power::from_watts(300.0)).unwrap_err();
        match error {
            Error::PowerTargetTooLow { target, minimum } => {
                assert_eq!(target, 300.0);
                assert_eq!(minimum, 600.0);
            }
            other => panic!("expected a below-minimum error, got {other:?}"),
        }
    }

    #[test]
    fn target_above_group_maximum_is_rejected() {
        let entries = [tunable_entry(1, 100.0, 1000.0), fixed_entry(2, 500.0)];
        let error = balance(&entries, Power::from_watts(1600.0)).unwrap_err();
        match error {
            Error::PowerTargetTooHigh { target, maximum } => {
                assert_eq!(target, 1600.0);
                assert_eq!(maximum, 1500.0);
            }
            other => panic!("expected an above-maximum error, got {other:?}"),
        }
    }

    #[test]
    fn feasible_target_splits_around_the_fixed_draw() {
        let entries = [tunable_entry(1, 100.0, 1000.0), fixed_entry(2, 500.0)];
        let actions = balance(&entries, Power::from_watts(800.0)).unwrap();

        assert_eq!(watts(&actions[&addr(1)]), 300.0);
        // The fixed device cannot be commanded and gets no action.
        assert!(!actions.contains_key(&addr(2)));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn shedding_prefers_the_largest_capacity_device() {
        let entries = [shutdown_entry(1, 400.0), shutdown_entry(2, 800.0)];
        let actions = balance(&entries, Power::from_watts(400.0)).unwrap();

        assert_eq!(actions[&addr(2)], PowerAction::Off);
        assert_eq!(actions[&addr(1)], PowerAction::On);
    }

    #[test]
    fn comfortable_target_keeps_everything_on_and_splits_evenly() {
        let entries = [
            tunable_entry(1, 500.0, 2000.0),
            tunable_entry(2, 500.0, 2000.0),
            shutdown_entry(3, 1000.0),
        ];
        let actions = balance(&entries, Power::from_watts(3400.0)).unwrap();

        assert_eq!(actions[&addr(3)], PowerAction::On);
        assert_eq!(watts(&actions[&addr(1)]), 1200.0);
        assert_eq!(watts(&actions[&addr(2)]), 1200.0);
    }

    #[test]
    fn members_below_the_even_share_are_pinned_at_their_floor() {
        let entries = [tunable_entry(1, 500.0, 1000.0), tunable_entry(2, 100.0, 1000.0)];
        let actions = balance(&entries, Power::from_watts(700.0)).unwrap();

        assert_eq!(watts(&actions[&addr(1)]), 500.0);
        assert_eq!(watts(&actions[&addr(2)]), 200.0);
    }

    #[test]
    fn mid_ladder_sheds_shutdown_devices_to_free_tunable_room() {
        let entries = [
            tunable_entry(1, 100.0, 1000.0),
            shutdown_entry(2, 1000.0),
            shutdown_entry(3, 400.0),
        ];
        let actions = balance(&entries, Power::from_watts(1200.0)).unwrap();

        assert_eq!(actions[&addr(2)], PowerAction::Off);
        assert_eq!(actions[&addr(3)], PowerAction::On);
        assert_eq!(watts(&actions[&addr(1)]), 800.0);
    }

    mod apply {
        use super::*;
        use std::sync::{Arc, Mutex};
        use std::time::{SystemTime, UNIX_EPOCH};

        use async_trait::async_trait;

        use crate::data::device::{DeviceInfo, HashAlgorithm, MinerFirmware, MinerMake};
        use crate::data::miner::MinerData;
        use crate::miners::backends::GetMinerData;
        use crate::miners::data::DataLocation;

        struct ScriptedMiner {
            ip: IpAddr,
            control: PowerControl,
            range: Option<(Power, Power)>,
            wattage: f64,
            commands: Arc<Mutex<Vec<String>>>,
        }

        impl ScriptedMiner {
            fn new(last: u8, control: PowerControl, range: Option<(f64, f64)>, wattage: f64) -> Self {
                ScriptedMiner {
                    ip: addr(last),
                    control,
                    range: range
                        .map(|(min, max)| (Power::from_watts(min), Power::from_watts(max))),
                    wattage,
                    commands: Arc::new(Mutex::new(Vec::new())),
                }
            }

            fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
                Arc::clone(&self.commands)
            }

            fn blank_data(&self) -> MinerData {
                MinerData {
                    schema_version: String::from("v1.0"),
                    timestamp: SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("Failed to get system time")
                        .as_secs(),
                    ip: self.ip,
                    mac: None,
                    device_info: DeviceInfo::new(
                        MinerMake::Unknown,
                        None,
                        MinerFirmware::Stock,
                        HashAlgorithm::SHA256,
                    ),
                    serial_number: None,
                    hostname: None,
                    api_version: None,
                    firmware_version: None,
                    control_board_version: None,
                    expected_hashboards: None,
                    hashboards: Vec::new(),
                    hashrate: None,
                    expected_chips: None,
                    total_chips: None,
                    expected_fans: None,
                    fans: Vec::new(),
                    psu_fans: Vec::new(),
                    average_temperature: None,
                    fluid_temperature: None,
                    wattage: Some(Power::from_watts(self.wattage)),
                    wattage_limit: None,
                    efficiency: None,
                    light_flashing: None,
                    messages: Vec::new(),
                    uptime: None,
                    is_mining: true,
                    pools: Vec::new(),
                }
            }
        }

        #[async_trait]
        impl GetMinerData for ScriptedMiner {
            async fn get_data(&self) -> MinerData {
                self.blank_data()
            }

            fn get_locations(&self, _data_field: DataField) -> &'static [DataLocation] {
                &[]
            }
        }

        #[async_trait]
        impl Miner for ScriptedMiner {
            fn ip(&self) -> IpAddr {
                self.ip
            }

            fn device_info(&self) -> DeviceInfo {
                DeviceInfo::new(
                    MinerMake::Unknown,
                    None,
                    MinerFirmware::Stock,
                    HashAlgorithm::SHA256,
                )
            }

            fn name(&self) -> &'static str {
                "Scripted"
            }

            async fn get_fields(&self, _fields: &[DataField]) -> MinerData {
                self.blank_data()
            }

            fn power_control(&self) -> PowerControl {
                self.control
            }

            fn power_limit_range(&self) -> Option<(Power, Power)> {
                self.range
            }

            async fn stop_mining(&self) -> crate::error::Result<()> {
                self.commands.lock().unwrap().push(String::from("stop"));
                Ok(())
            }

            async fn resume_mining(&self) -> crate::error::Result<()> {
                self.commands.lock().unwrap().push(String::from("resume"));
                Ok(())
            }

            async fn set_power_limit(&self, limit: Power) -> crate::error::Result<()> {
                self.commands
                    .lock()
                    .unwrap()
                    .push(format!("set {}", limit.as_watts()));
                Ok(())
            }
        }

        #[tokio::test]
        async fn actions_are_dispatched_and_the_realized_draw_reported() {
            let tunable =
                ScriptedMiner::new(1, PowerControl::Tunable, Some((100.0, 1000.0)), 900.0);
            let fixed = ScriptedMiner::new(2, PowerControl::Fixed, None, 500.0);
            let tunable_log = tunable.command_log();
            let fixed_log = fixed.command_log();
            let miners: Vec<Box<dyn Miner>> = vec![Box::new(tunable), Box::new(fixed)];

            let realized = balance_and_apply(&miners, Power::from_watts(800.0))
                .await
                .unwrap();

            assert_eq!(realized.as_watts(), 800.0);
            assert_eq!(tunable_log.lock().unwrap().as_slice(), ["set 300"]);
            assert!(fixed_log.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn shutdown_devices_receive_stop_and_resume_commands() {
            let large = ScriptedMiner::new(2, PowerControl::ShutdownOnly, None, 800.0);
            let small = ScriptedMiner::new(1, PowerControl::ShutdownOnly, None, 400.0);
            let large_log = large.command_log();
            let small_log = small.command_log();
            let miners: Vec<Box<dyn Miner>> = vec![Box::new(large), Box::new(small)];

            let realized = balance_and_apply(&miners, Power::from_watts(400.0))
                .await
                .unwrap();

            assert_eq!(realized.as_watts(), 400.0);
            assert_eq!(large_log.lock().unwrap().as_slice(), ["stop"]);
            assert_eq!(small_log.lock().unwrap().as_slice(), ["resume"]);
        }
    }
}
