//! Compilation errors.
//!
//! Every failure is a deterministic logic error in the recipe: nothing is
//! retried, and the whole compilation is abandoned.

use thiserror::Error;

/// A resolution or allocation failure, without block context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecipeError {
    /// Alias token not bound to any labware slot.
    #[error("unknown alias '{alias}'")]
    UnknownAlias { alias: String },

    /// A non-well location segment names a column the table does not have.
    #[error("column '{column}' not found in table '{table}'")]
    MissingColumn { column: String, table: String },

    /// Two or more fields are lists of unequal length > 1.
    #[error(
        "cannot determine broadcast dimension: volume has {volume_len} value(s), \
         source {source_len} and destination {destination_len}"
    )]
    AmbiguousBroadcastDimension {
        volume_len: usize,
        source_len: usize,
        destination_len: usize,
    },

    /// No pipette's volume range covers the requested volume.
    #[error("no pipette available for volume {volume}")]
    NoPipetteAvailable { volume: u32 },

    /// Every tip rack compatible with the pipette is used up.
    #[error("no tips left for pipette '{pipette}'")]
    NoTipAvailable { pipette: String },

    /// A column-resolved volume is not a non-negative integer.
    #[error("volume '{value}' in column '{column}' is not an integer")]
    NonIntegerVolume { column: String, value: String },

    /// A location token does not fit the `alias:well` grammar.
    #[error("malformed location '{token}': {reason}")]
    MalformedLocation { token: String, reason: String },

    /// The equipment section breaks a deck invariant (one labware per slot,
    /// one pipette per mount, unique aliases, usable volume ranges).
    #[error("invalid equipment: {reason}")]
    InvalidEquipment { reason: String },

    /// A block names a resource table the recipe does not declare.
    #[error("unknown resource table '{name}'")]
    UnknownTable { name: String },

    /// A column reference with no explicit table, and the recipe does not
    /// declare exactly one.
    #[error("column '{column}' needs an explicit table ({declared} declared)")]
    TableSelection { column: String, declared: usize },

    /// A resource table could not be read or parsed.
    #[error("cannot load table '{name}': {message}")]
    TableLoad { name: String, message: String },
}

/// A [`RecipeError`] attributed to the instruction block that raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{block}: {source}")]
pub struct CompileError {
    /// Block name, or `command {index}` if unnamed
    pub block: String,
    #[source]
    pub source: RecipeError,
}

impl CompileError {
    pub fn new(block: impl Into<String>, source: RecipeError) -> Self {
        Self {
            block: block.into(),
            source,
        }
    }
}
