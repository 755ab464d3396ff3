//! Recipe schema, resolved device actions, and the compiled artifact.
//!
//! Schema types derive Serialize/Deserialize for YAML roundtripping. Action and
//! artifact types also serialize, so a compiled protocol can be emitted as JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deck position. OT-2 decks number slots 1 through 12 (12 is the trash).
pub type Slot = u32;

/// Highest addressable deck slot.
pub const MAX_SLOT: Slot = 12;

// ============================================================================
// Top-level recipe
// ============================================================================

/// Root recipe document: equipment layout plus an ordered command list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// Free-form protocol metadata (protocolName, author, apiLevel, ...)
    #[serde(default)]
    pub metadata: IndexMap<String, serde_yaml_ng::Value>,

    /// Labware and pipettes placed on the robot
    #[serde(default)]
    pub equipment: Vec<Equipment>,

    /// Named external tables (per-well values, volume lists)
    #[serde(default)]
    pub resources: Vec<ResourceRef>,

    /// Instruction blocks, compiled in order
    #[serde(default)]
    pub commands: Vec<InstructionBlock>,
}

impl RecipeConfig {
    /// Iterate over labware entries only.
    pub fn labware(&self) -> impl Iterator<Item = &Labware> {
        self.equipment.iter().filter_map(|e| match e {
            Equipment::Labware(l) => Some(l),
            Equipment::Pipette(_) => None,
        })
    }

    /// Iterate over pipette entries only.
    pub fn pipettes(&self) -> impl Iterator<Item = &Pipette> {
        self.equipment.iter().filter_map(|e| match e {
            Equipment::Pipette(p) => Some(p),
            Equipment::Labware(_) => None,
        })
    }
}

// ============================================================================
// Equipment
// ============================================================================

/// A piece of equipment, distinguished by its `labware:` or `pipette:` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Equipment {
    Labware(Labware),
    Pipette(Pipette),
}

/// Labware placed in a deck slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labware {
    /// Labware model (e.g. `corning_96_wellplate_360ul_flat`)
    #[serde(rename = "labware")]
    pub model: String,

    /// Deck slot
    pub slot: Slot,

    /// Optional name used in location tokens instead of the slot number
    #[serde(default)]
    pub alias: Option<String>,
}

/// Pipette attached to a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipette {
    /// Pipette model (e.g. `p300_single_gen2`)
    #[serde(rename = "pipette")]
    pub model: String,

    /// Mount the pipette is attached to
    pub mount: Mount,

    /// Smallest volume this pipette may move (inferred from the model if absent)
    #[serde(default)]
    pub min_volume: Option<u32>,

    /// Largest volume this pipette may move (inferred from the model if absent)
    #[serde(default)]
    pub max_volume: Option<u32>,
}

/// Pipette mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    pub const ALL: [Mount; 2] = [Mount::Left, Mount::Right];
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

// ============================================================================
// Resources and commands
// ============================================================================

/// A named external table, loaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub location: String,
}

/// One instruction block of the recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionBlock {
    /// Human-readable block name
    #[serde(default)]
    pub name: Option<String>,

    /// Aspirate location(s)
    pub source: Field<String>,

    /// Dispense location(s)
    pub destination: Field<String>,

    /// Volume(s) in microliters, or a table column holding them
    pub volume: VolumeField,

    /// Drop the tip after every transfer of this block
    #[serde(default = "default_true")]
    pub drop_tip: bool,

    /// Resource table used for column references in this block
    #[serde(default)]
    pub table: Option<String>,
}

impl InstructionBlock {
    /// Label used in comments and error messages: the name, or `command {index}`.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("command {}", index),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A field that is either one value or an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field<T> {
    Scalar(T),
    List(Vec<T>),
}

impl<T> Field<T> {
    /// Number of values carried (1 for a scalar).
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into a list, scalar first.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::List(v) => v,
        }
    }

    /// Apply a fallible conversion to every value, keeping the shape.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Field<U>, E> {
        match self {
            Self::Scalar(v) => Ok(Field::Scalar(f(v)?)),
            Self::List(vs) => Ok(Field::List(
                vs.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
            )),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{}", v),
            Self::List(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Volume field: literal(s), or a column of a resource table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeField {
    Scalar(u32),
    List(Vec<u32>),
    ColumnRef(String),
}

// ============================================================================
// Compilation output
// ============================================================================

/// One fully scalar unit of liquid movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryTransfer<L = String> {
    pub volume: u32,
    pub source: L,
    pub destination: L,
}

/// A device-level action with every location resolved to a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolvedAction {
    LoadLabware {
        slot: Slot,
        model: String,
    },
    LoadPipette {
        mount: Mount,
        model: String,
        tip_rack_slots: Vec<Slot>,
    },
    PickTip {
        mount: Mount,
        rack_slot: Slot,
        well_index: u32,
    },
    Aspirate {
        mount: Mount,
        slot: Slot,
        well: String,
        volume: u32,
    },
    Dispense {
        mount: Mount,
        slot: Slot,
        well: String,
        volume: u32,
    },
    DropTip {
        mount: Mount,
    },
}

impl ResolvedAction {
    /// Mount the action runs on (None for labware loads).
    pub fn mount(&self) -> Option<Mount> {
        match self {
            Self::LoadLabware { .. } => None,
            Self::LoadPipette { mount, .. }
            | Self::PickTip { mount, .. }
            | Self::Aspirate { mount, .. }
            | Self::Dispense { mount, .. }
            | Self::DropTip { mount } => Some(*mount),
        }
    }
}

impl fmt::Display for ResolvedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadLabware { slot, model } => write!(f, "LOAD_LABWARE {} @ {}", model, slot),
            Self::LoadPipette { mount, model, .. } => {
                write!(f, "LOAD_PIPETTE {} @ {}", model, mount)
            }
            Self::PickTip {
                mount,
                rack_slot,
                well_index,
            } => write!(f, "PICK_TIP {} {}[{}]", mount, rack_slot, well_index),
            Self::Aspirate {
                mount,
                slot,
                well,
                volume,
            } => write!(f, "ASPIRATE {} {}ul {}:{}", mount, volume, slot, well),
            Self::Dispense {
                mount,
                slot,
                well,
                volume,
            } => write!(f, "DISPENSE {} {}ul {}:{}", mount, volume, slot, well),
            Self::DropTip { mount } => write!(f, "DROP_TIP {}", mount),
        }
    }
}

/// Actions produced for one instruction block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledBlock {
    pub label: String,
    pub actions: Vec<ResolvedAction>,
}

/// A compiled protocol: static setup, per-block actions, and trailing tip drops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub metadata: IndexMap<String, serde_yaml_ng::Value>,
    pub setup: Vec<ResolvedAction>,
    pub blocks: Vec<CompiledBlock>,
    pub teardown: Vec<ResolvedAction>,
}

impl Artifact {
    /// Every action in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &ResolvedAction> {
        self.setup
            .iter()
            .chain(self.blocks.iter().flat_map(|b| b.actions.iter()))
            .chain(self.teardown.iter())
    }
}

// ============================================================================
// Robot inventory
// ============================================================================

/// A liquid-handling robot reachable over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Network address (IP or DNS)
    pub ip: String,

    /// Path to SSH private key
    #[serde(default)]
    pub ssh_key: Option<String>,

    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,

    /// Robot model
    #[serde(default = "default_model")]
    pub model: String,

    /// Robot software version
    #[serde(default)]
    pub version: Option<u32>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_model() -> String {
    "OT2".to_string()
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for rendering.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================
