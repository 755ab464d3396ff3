//! Resource manager — deck layout, pipette selection, and consumable tracking.
//!
//! Owns which labware sits in which slot, which pipette is on which mount,
//! per-well usage counters and per-tip-rack cursors. A fresh manager starts
//! every counter at zero; counters only survive across compilations through
//! a persisted [`ResourceManagerState`].

use super::error::RecipeError;
use super::location::LocationRef;
use super::state::{PipetteSpec, ResourceManagerState};
use super::types::{Mount, RecipeConfig, Slot, MAX_SLOT};
use tracing::warn;

/// Tips per rack when the model name does not say.
const DEFAULT_RACK_CAPACITY: u32 = 96;

/// Deck and consumable bookkeeping for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceManager {
    state: ResourceManagerState,
}

impl ResourceManager {
    /// Build the deck model from a recipe's equipment section.
    pub fn from_config(config: &RecipeConfig) -> Result<Self, RecipeError> {
        let mut state = ResourceManagerState::default();

        for labware in config.labware() {
            if labware.slot == 0 || labware.slot > MAX_SLOT {
                return Err(invalid(format!(
                    "slot {} for '{}' is outside 1..={}",
                    labware.slot, labware.model, MAX_SLOT
                )));
            }
            if let Some(existing) = state
                .slot_to_labware
                .insert(labware.slot, labware.model.clone())
            {
                return Err(invalid(format!(
                    "slot {} holds both '{}' and '{}'",
                    labware.slot, existing, labware.model
                )));
            }
            state
                .alias_to_slot
                .insert(labware.slot.to_string(), labware.slot);
        }

        // Named aliases go in after slot numbers so a collision is detectable.
        for labware in config.labware() {
            if let Some(alias) = &labware.alias {
                if let Some(other) = state.alias_to_slot.insert(alias.clone(), labware.slot) {
                    if other != labware.slot {
                        return Err(invalid(format!(
                            "alias '{}' refers to slots {} and {}",
                            alias, other, labware.slot
                        )));
                    }
                }
            }
        }

        for pipette in config.pipettes() {
            let defaults = default_volume_range(&pipette.model);
            let min_volume = pipette.min_volume.or(defaults.map(|d| d.0));
            let max_volume = pipette.max_volume.or(defaults.map(|d| d.1));
            let (Some(min_volume), Some(max_volume)) = (min_volume, max_volume) else {
                return Err(invalid(format!(
                    "pipette '{}' needs min_volume and max_volume",
                    pipette.model
                )));
            };
            if min_volume > max_volume {
                return Err(invalid(format!(
                    "pipette '{}' has min_volume {} > max_volume {}",
                    pipette.model, min_volume, max_volume
                )));
            }
            let spec = PipetteSpec {
                model: pipette.model.clone(),
                min_volume,
                max_volume,
            };
            if let Some(existing) = state.mount_to_pipette.insert(pipette.mount, spec) {
                return Err(invalid(format!(
                    "mount {} holds both '{}' and '{}'",
                    pipette.mount, existing.model, pipette.model
                )));
            }
        }

        Ok(Self { state })
    }

    /// Restore a manager exactly as persisted.
    pub fn load_state(snapshot: ResourceManagerState) -> Self {
        Self { state: snapshot }
    }

    /// Full copy of the current state.
    pub fn dump_state(&self) -> ResourceManagerState {
        self.state.clone()
    }

    pub fn into_state(self) -> ResourceManagerState {
        self.state
    }

    /// Carry consumable counters over from a prior run.
    ///
    /// Counters for a slot are kept only when the prior snapshot had the same
    /// labware model there, or recorded no model at all.
    pub fn restore_usage(&mut self, prior: &ResourceManagerState) {
        for (slot, cursor) in &prior.tip_cursor {
            if self.same_labware(prior, *slot) && self.is_tip_rack(*slot) {
                self.state.tip_cursor.insert(*slot, *cursor);
            } else {
                warn!(slot, "dropping tip cursor: labware in slot changed");
            }
        }
        for (slot, wells) in &prior.well_usage {
            if self.same_labware(prior, *slot) && self.state.slot_to_labware.contains_key(slot) {
                self.state.well_usage.insert(*slot, wells.clone());
            } else {
                warn!(slot, "dropping well usage: labware in slot changed");
            }
        }
    }

    fn same_labware(&self, prior: &ResourceManagerState, slot: Slot) -> bool {
        match prior.slot_to_labware.get(&slot) {
            Some(model) => self.state.slot_to_labware.get(&slot) == Some(model),
            None => true,
        }
    }

    fn is_tip_rack(&self, slot: Slot) -> bool {
        self.state
            .slot_to_labware
            .get(&slot)
            .is_some_and(|m| tip_rack_volume(m).is_some())
    }

    /// Labware by slot, in slot order.
    pub fn labware(&self) -> impl Iterator<Item = (Slot, &str)> {
        self.state
            .slot_to_labware
            .iter()
            .map(|(slot, model)| (*slot, model.as_str()))
    }

    /// Pipettes by mount, left first.
    pub fn pipettes(&self) -> impl Iterator<Item = (Mount, &PipetteSpec)> {
        self.state.mount_to_pipette.iter().map(|(m, p)| (*m, p))
    }

    pub fn pipette_model(&self, mount: Mount) -> Option<&str> {
        self.state
            .mount_to_pipette
            .get(&mount)
            .map(|p| p.model.as_str())
    }

    /// Slot bound to an alias (slot numbers are aliases too).
    pub fn resolve_alias(&self, alias: &str) -> Result<Slot, RecipeError> {
        self.state
            .alias_to_slot
            .get(alias)
            .copied()
            .ok_or_else(|| RecipeError::UnknownAlias {
                alias: alias.to_string(),
            })
    }

    /// Slot a location refers to. Bare wells go to the deck's well plate.
    ///
    /// With several plates the lowest slot wins, independent of the order the
    /// recipe lists its equipment in. A recipe that relied on the last-listed
    /// plate being picked must alias its wells instead.
    pub fn resolve_slot(&self, location: &LocationRef) -> Result<Slot, RecipeError> {
        if let Some(alias) = &location.alias {
            return self.resolve_alias(alias);
        }

        let plates: Vec<Slot> = self
            .labware()
            .filter(|(_, model)| model.to_ascii_lowercase().contains("well"))
            .map(|(slot, _)| slot)
            .collect();
        match plates.as_slice() {
            [] => Err(RecipeError::MalformedLocation {
                token: location.to_string(),
                reason: "no alias given and no well plate on the deck".to_string(),
            }),
            [only] => Ok(*only),
            [first, ..] => {
                warn!(
                    location = %location,
                    slots = ?plates,
                    "several well plates on the deck, using slot {}",
                    first
                );
                Ok(*first)
            }
        }
    }

    /// Tip-rack slots whose tips fit the pipette, in slot order.
    pub fn find_valid_tip_racks(&self, pipette_model: &str) -> Vec<Slot> {
        let Some(class) = pipette_class(pipette_model) else {
            return Vec::new();
        };
        let compatible = compatible_tip_volumes(class);
        self.labware()
            .filter(|(_, model)| tip_rack_volume(model).is_some_and(|v| compatible.contains(&v)))
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Allocate the next unused tip: first compatible rack with tips left.
    pub fn get_next_tip(&mut self, pipette_model: &str) -> Result<(Slot, u32), RecipeError> {
        for slot in self.find_valid_tip_racks(pipette_model) {
            let capacity = self
                .state
                .slot_to_labware
                .get(&slot)
                .map_or(DEFAULT_RACK_CAPACITY, |m| rack_capacity(m));
            let cursor = self.state.tip_cursor.entry(slot).or_insert(0);
            if *cursor < capacity {
                let well_index = *cursor;
                *cursor += 1;
                return Ok((slot, well_index));
            }
        }
        Err(RecipeError::NoTipAvailable {
            pipette: pipette_model.to_string(),
        })
    }

    /// Mount whose pipette covers `volume` with the smallest maximum.
    pub fn determine_pipette(&self, volume: u32) -> Option<Mount> {
        self.pipettes()
            .filter(|(_, p)| p.covers(volume))
            .min_by_key(|(_, p)| p.max_volume)
            .map(|(mount, _)| mount)
    }

    /// Count one use of a well. No capacity is enforced.
    pub fn update_well_usage(&mut self, slot: Slot, well: &str) {
        *self
            .state
            .well_usage
            .entry(slot)
            .or_default()
            .entry(well.to_string())
            .or_insert(0) += 1;
    }

    pub fn well_usage(&self, slot: Slot, well: &str) -> u32 {
        self.state
            .well_usage
            .get(&slot)
            .and_then(|w| w.get(well))
            .copied()
            .unwrap_or(0)
    }

    /// Tips already taken from a rack.
    pub fn tips_used(&self, slot: Slot) -> u32 {
        self.state.tip_cursor.get(&slot).copied().unwrap_or(0)
    }
}

fn invalid(reason: String) -> RecipeError {
    RecipeError::InvalidEquipment { reason }
}

/// Split a model name into lowercase `_`-separated segments.
fn segments(model: &str) -> Vec<String> {
    model
        .to_ascii_lowercase()
        .split('_')
        .map(str::to_string)
        .collect()
}

/// Tip volume of a tip rack (`opentrons_96_tiprack_20ul` -> 20); None if the
/// labware is not a tip rack.
pub fn tip_rack_volume(model: &str) -> Option<u32> {
    if !model.to_ascii_lowercase().contains("tiprack") {
        return None;
    }
    segments(model)
        .iter()
        .find_map(|s| s.strip_suffix("ul").and_then(|n| n.parse::<u32>().ok()))
}

/// Number of tips in a rack (`opentrons_96_tiprack_20ul` -> 96).
pub fn rack_capacity(model: &str) -> u32 {
    segments(model)
        .iter()
        .find_map(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_RACK_CAPACITY)
}

/// Volume class of a pipette (`p300_single_gen2` -> 300).
pub fn pipette_class(model: &str) -> Option<u32> {
    let rest = model.to_ascii_lowercase();
    let rest = rest.strip_prefix('p')?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Tip sizes a pipette class can pick up.
pub fn compatible_tip_volumes(class: u32) -> &'static [u32] {
    if class <= 20 {
        &[10, 20]
    } else if class <= 300 {
        &[200, 300]
    } else {
        &[1000]
    }
}

/// Working range for known pipette classes.
pub fn default_volume_range(model: &str) -> Option<(u32, u32)> {
    match pipette_class(model)? {
        10 => Some((1, 10)),
        20 => Some((1, 20)),
        50 => Some((5, 50)),
        300 => Some((20, 300)),
        1000 => Some((100, 1000)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Equipment, Labware, Pipette};

    fn labware(model: &str, slot: Slot, alias: Option<&str>) -> Equipment {
        Equipment::Labware(Labware {
            model: model.to_string(),
            slot,
            alias: alias.map(str::to_string),
        })
    }

    fn pipette(model: &str, mount: Mount, min: u32, max: u32) -> Equipment {
        Equipment::Pipette(Pipette {
            model: model.to_string(),
            mount,
            min_volume: Some(min),
            max_volume: Some(max),
        })
    }

    fn make_manager() -> ResourceManager {
        let config = RecipeConfig {
            equipment: vec![
                labware("corning_96_wellplate_360ul_flat", 1, Some("plate")),
                labware("opentrons_96_tiprack_20ul", 8, None),
                labware("opentrons_96_tiprack_300ul", 9, Some("big_tips")),
                labware("opentrons_96_tiprack_20ul", 10, None),
                pipette("p20_single_gen2", Mount::Left, 1, 20),
                pipette("p300_single_gen2", Mount::Right, 20, 300),
            ],
            ..Default::default()
        };
        ResourceManager::from_config(&config).unwrap()
    }

    #[test]
    fn test_manager_resolve_alias() {
        let m = make_manager();
        assert_eq!(m.resolve_alias("plate").unwrap(), 1);
        assert_eq!(m.resolve_alias("9").unwrap(), 9);
        assert_eq!(
            m.resolve_alias("ghost").unwrap_err(),
            RecipeError::UnknownAlias {
                alias: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_manager_resolve_bare_well() {
        let m = make_manager();
        let loc = LocationRef::parse("A1").unwrap();
        assert_eq!(m.resolve_slot(&loc).unwrap(), 1);
    }

    #[test]
    fn test_manager_bare_well_without_plate() {
        let config = RecipeConfig {
            equipment: vec![labware("opentrons_96_tiprack_20ul", 8, None)],
            ..Default::default()
        };
        let m = ResourceManager::from_config(&config).unwrap();
        let err = m.resolve_slot(&LocationRef::parse("A1").unwrap()).unwrap_err();
        assert!(matches!(err, RecipeError::MalformedLocation { .. }));
    }

    #[test]
    fn test_manager_bare_well_lowest_plate() {
        let config = RecipeConfig {
            equipment: vec![
                labware("corning_96_wellplate_360ul_flat", 7, None),
                labware("opentrons_96_tiprack_20ul", 8, None),
                labware("nest_96_wellplate_100ul_pcr_full_skirt", 3, None),
            ],
            ..Default::default()
        };
        let m = ResourceManager::from_config(&config).unwrap();
        let loc = LocationRef::parse("B2").unwrap();
        assert_eq!(m.resolve_slot(&loc).unwrap(), 3);
    }

    #[test]
    fn test_manager_valid_tip_racks() {
        let m = make_manager();
        assert_eq!(m.find_valid_tip_racks("p20_single_gen2"), vec![8, 10]);
        assert_eq!(m.find_valid_tip_racks("p300_single_gen2"), vec![9]);
        assert!(m.find_valid_tip_racks("p1000_single_gen2").is_empty());
        assert!(m.find_valid_tip_racks("mystery").is_empty());
    }

    #[test]
    fn test_manager_next_tip_advances_and_rolls_over() {
        let mut m = make_manager();
        assert_eq!(m.get_next_tip("p20_single_gen2").unwrap(), (8, 0));
        assert_eq!(m.get_next_tip("p20_single_gen2").unwrap(), (8, 1));
        for _ in 2..96 {
            m.get_next_tip("p20_single_gen2").unwrap();
        }
        assert_eq!(m.tips_used(8), 96);
        assert_eq!(m.get_next_tip("p20_single_gen2").unwrap(), (10, 0));
    }

    #[test]
    fn test_manager_tips_exhausted() {
        let mut m = make_manager();
        for _ in 0..96 {
            m.get_next_tip("p300_single_gen2").unwrap();
        }
        let err = m.get_next_tip("p300_single_gen2").unwrap_err();
        assert_eq!(
            err,
            RecipeError::NoTipAvailable {
                pipette: "p300_single_gen2".to_string()
            }
        );
    }

    #[test]
    fn test_manager_pipette_tightest_fit() {
        let m = make_manager();
        assert_eq!(m.determine_pipette(15), Some(Mount::Left));
        assert_eq!(m.determine_pipette(20), Some(Mount::Left));
        assert_eq!(m.determine_pipette(250), Some(Mount::Right));
        assert_eq!(m.determine_pipette(500), None);
        assert_eq!(m.determine_pipette(0), None);
    }

    #[test]
    fn test_manager_well_usage_uncapped() {
        let mut m = make_manager();
        for _ in 0..5 {
            m.update_well_usage(1, "A1");
        }
        assert_eq!(m.well_usage(1, "A1"), 5);
        assert_eq!(m.well_usage(1, "B1"), 0);
    }

    #[test]
    fn test_manager_state_roundtrip() {
        let mut m = make_manager();
        m.get_next_tip("p20_single_gen2").unwrap();
        m.update_well_usage(1, "C3");
        let restored = ResourceManager::load_state(m.dump_state());
        assert_eq!(restored, m);
    }

    #[test]
    fn test_manager_restore_usage_same_layout() {
        let mut first = make_manager();
        for _ in 0..8 {
            first.get_next_tip("p20_single_gen2").unwrap();
        }
        first.update_well_usage(1, "A1");
        let snapshot = first.dump_state();

        let mut second = make_manager();
        second.restore_usage(&snapshot);
        assert_eq!(second.get_next_tip("p20_single_gen2").unwrap(), (8, 8));
        assert_eq!(second.well_usage(1, "A1"), 1);
    }

    #[test]
    fn test_manager_restore_usage_drops_changed_slot() {
        let mut prior = ResourceManagerState::default();
        prior
            .slot_to_labware
            .insert(8, "opentrons_96_tiprack_300ul".to_string());
        prior.tip_cursor.insert(8, 40);
        let mut m = make_manager();
        m.restore_usage(&prior);
        assert_eq!(m.tips_used(8), 0);
    }

    #[test]
    fn test_manager_restore_usage_without_layout() {
        let mut prior = ResourceManagerState::default();
        prior.tip_cursor.insert(10, 5);
        let mut m = make_manager();
        m.restore_usage(&prior);
        assert_eq!(m.tips_used(10), 5);
    }

    #[test]
    fn test_manager_rejects_double_slot() {
        let config = RecipeConfig {
            equipment: vec![
                labware("opentrons_96_tiprack_20ul", 8, None),
                labware("nest_12_reservoir_15ml", 8, None),
            ],
            ..Default::default()
        };
        let err = ResourceManager::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("slot 8"));
    }

    #[test]
    fn test_manager_rejects_double_mount() {
        let config = RecipeConfig {
            equipment: vec![
                pipette("p20_single_gen2", Mount::Left, 1, 20),
                pipette("p300_single_gen2", Mount::Left, 20, 300),
            ],
            ..Default::default()
        };
        assert!(ResourceManager::from_config(&config).is_err());
    }

    #[test]
    fn test_manager_alias_collides_with_slot() {
        let config = RecipeConfig {
            equipment: vec![
                labware("corning_96_wellplate_360ul_flat", 1, Some("2")),
                labware("corning_96_wellplate_360ul_flat", 2, None),
            ],
            ..Default::default()
        };
        assert!(ResourceManager::from_config(&config).is_err());
    }

    #[test]
    fn test_manager_inferred_volume_range() {
        let config = RecipeConfig {
            equipment: vec![Equipment::Pipette(Pipette {
                model: "p1000_single_gen2".to_string(),
                mount: Mount::Right,
                min_volume: None,
                max_volume: None,
            })],
            ..Default::default()
        };
        let m = ResourceManager::from_config(&config).unwrap();
        assert_eq!(m.determine_pipette(500), Some(Mount::Right));
        assert_eq!(m.determine_pipette(50), None);
    }

    #[test]
    fn test_manager_unknown_pipette_needs_range() {
        let config = RecipeConfig {
            equipment: vec![Equipment::Pipette(Pipette {
                model: "custom_head".to_string(),
                mount: Mount::Left,
                min_volume: None,
                max_volume: None,
            })],
            ..Default::default()
        };
        let err = ResourceManager::from_config(&config).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidEquipment { .. }));
    }

    #[test]
    fn test_manager_model_helpers() {
        assert_eq!(tip_rack_volume("opentrons_96_tiprack_20ul"), Some(20));
        assert_eq!(tip_rack_volume("opentrons_96_filtertiprack_200ul"), Some(200));
        assert_eq!(tip_rack_volume("corning_96_wellplate_360ul_flat"), None);
        assert_eq!(rack_capacity("opentrons_96_tiprack_20ul"), 96);
        assert_eq!(rack_capacity("custom_tiprack_20ul"), 96);
        assert_eq!(pipette_class("p300_multi_gen2"), Some(300));
        assert_eq!(pipette_class("magdeck"), None);
        assert_eq!(compatible_tip_volumes(20), &[10, 20]);
        assert_eq!(default_volume_range("p20_single_gen2"), Some((1, 20)));
    }
}
