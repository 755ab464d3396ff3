//! Recipe and robot inventory parsing, plus structural validation.
//!
//! Validation collects every problem it finds instead of stopping at the first:
//! - one labware per slot, slots within the deck
//! - one pipette per mount, with a known or explicit volume range
//! - aliases unique and not shadowing another slot's number
//! - resource names unique; command `table` keys name a declared resource
//! - location tokens well-formed

use super::manager::default_volume_range;
use super::resolver;
use super::types::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a recipe file from disk.
pub fn parse_recipe_file(path: &Path) -> Result<RecipeConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_recipe(&content)
}

/// Parse a recipe from a string.
pub fn parse_recipe(yaml: &str) -> Result<RecipeConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse a robot inventory file.
pub fn parse_robots_file(path: &Path) -> Result<Vec<RobotConfig>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_robots(&content)
}

/// Parse a robot inventory: a YAML list of robots. Must not be empty.
pub fn parse_robots(yaml: &str) -> Result<Vec<RobotConfig>, String> {
    let robots: Vec<RobotConfig> =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
    if robots.is_empty() {
        return Err("robot inventory is empty".to_string());
    }
    Ok(robots)
}

/// Validate a parsed recipe. Returns a list of errors (empty = valid).
pub fn validate_config(config: &RecipeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    // Slots
    let mut slots: BTreeMap<Slot, &str> = BTreeMap::new();
    for labware in config.labware() {
        if labware.slot == 0 || labware.slot > MAX_SLOT {
            push(format!(
                "labware '{}' has slot {} outside 1..={}",
                labware.model, labware.slot, MAX_SLOT
            ));
        }
        if let Some(existing) = slots.insert(labware.slot, &labware.model) {
            push(format!(
                "slot {} holds both '{}' and '{}'",
                labware.slot, existing, labware.model
            ));
        }
    }

    // Aliases
    let mut aliases: BTreeMap<&str, Slot> = BTreeMap::new();
    for labware in config.labware() {
        let Some(alias) = labware.alias.as_deref() else {
            continue;
        };
        if alias.is_empty() || alias.contains([':', '[', ']']) {
            push(format!("alias '{}' is not a valid name", alias));
        }
        if let Ok(n) = alias.parse::<Slot>() {
            if n != labware.slot && slots.contains_key(&n) {
                push(format!(
                    "alias '{}' on slot {} shadows slot {}",
                    alias, labware.slot, n
                ));
            }
        }
        if let Some(other) = aliases.insert(alias, labware.slot) {
            if other != labware.slot {
                push(format!(
                    "alias '{}' refers to slots {} and {}",
                    alias, other, labware.slot
                ));
            }
        }
    }

    // Pipettes
    let mut mounts: BTreeSet<Mount> = BTreeSet::new();
    for pipette in config.pipettes() {
        if !mounts.insert(pipette.mount) {
            push(format!(
                "mount {} has more than one pipette ('{}')",
                pipette.mount, pipette.model
            ));
        }
        let inferred = default_volume_range(&pipette.model);
        let min = pipette.min_volume.or(inferred.map(|r| r.0));
        let max = pipette.max_volume.or(inferred.map(|r| r.1));
        match (min, max) {
            (Some(min), Some(max)) if min > max => push(format!(
                "pipette '{}' has min_volume {} above max_volume {}",
                pipette.model, min, max
            )),
            (Some(_), Some(_)) => {}
            _ => push(format!(
                "pipette '{}' has no volume range and none can be inferred",
                pipette.model
            )),
        }
    }

    // Resources
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for resource in &config.resources {
        if !names.insert(&resource.name) {
            push(format!("resource '{}' is declared twice", resource.name));
        }
    }

    // Commands
    for (index, block) in config.commands.iter().enumerate() {
        let label = block.label(index);
        if let Some(table) = &block.table {
            if !names.contains(table.as_str()) {
                push(format!(
                    "command '{}' references unknown table '{}'",
                    label, table
                ));
            }
        }
        for (field, value) in [("source", &block.source), ("destination", &block.destination)] {
            if value.is_empty() {
                push(format!("command '{}' has an empty {}", label, field));
            }
            if let Err(e) = resolver::parse_locations(value) {
                push(format!("command '{}' {}: {}", label, field, e));
            }
        }
    }

    errors
}
