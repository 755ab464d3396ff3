//! Protocol compiler: turns a recipe into a resolved action sequence.
//!
//! Blocks are compiled in recipe order. Each block's fields are resolved and
//! broadcast into single transfers. Every transfer picks the tightest-fitting
//! pipette, takes a tip if that mount holds none, then aspirates and
//! dispenses, dropping the tip afterwards when the block asks for it. Any
//! failure aborts the whole compilation and no partial artifact is returned.

use super::broadcast::broadcast;
use super::error::{CompileError, RecipeError};
use super::location::LocationRef;
use super::manager::ResourceManager;
use super::resolver;
use super::state::ResourceManagerState;
use super::tables::{ResourceTable, TableSource};
use super::types::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Label attached to failures raised by the equipment section.
const EQUIPMENT_LABEL: &str = "equipment";

/// Per-mount tip state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TipState {
    NoTip,
    TipLoaded,
}

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub artifact: Artifact,
    /// Resource state after every allocation, ready to persist
    pub state: ResourceManagerState,
}

/// Compile a recipe.
///
/// `prior` carries tip and well counters over from an earlier run; without it
/// all consumables start unused.
pub fn compile(
    config: &RecipeConfig,
    prior: Option<&ResourceManagerState>,
    tables: &mut dyn TableSource,
) -> Result<Compilation, CompileError> {
    let mut manager = ResourceManager::from_config(config)
        .map_err(|e| CompileError::new(EQUIPMENT_LABEL, e))?;
    if let Some(prior) = prior {
        manager.restore_usage(prior);
    }

    let compiler = ProtocolCompiler {
        config,
        manager,
        tables,
        tips: Mount::ALL.iter().map(|m| (*m, TipState::NoTip)).collect(),
    };
    compiler.run()
}

struct ProtocolCompiler<'a> {
    config: &'a RecipeConfig,
    manager: ResourceManager,
    tables: &'a mut dyn TableSource,
    tips: BTreeMap<Mount, TipState>,
}

impl ProtocolCompiler<'_> {
    fn run(mut self) -> Result<Compilation, CompileError> {
        let config = self.config;
        let setup = self.setup_actions();

        let mut blocks = Vec::with_capacity(config.commands.len());
        for (index, block) in config.commands.iter().enumerate() {
            let label = block.label(index);
            let actions = self
                .compile_block(block)
                .map_err(|e| CompileError::new(label.clone(), e))?;
            debug!(block = %label, actions = actions.len(), "compiled block");
            blocks.push(CompiledBlock { label, actions });
        }

        let teardown = self.release_tips();

        let artifact = Artifact {
            metadata: config.metadata.clone(),
            setup,
            blocks,
            teardown,
        };
        info!(
            blocks = artifact.blocks.len(),
            actions = artifact.actions().count(),
            "compiled recipe"
        );

        Ok(Compilation {
            artifact,
            state: self.manager.into_state(),
        })
    }

    /// Labware loads in slot order, then pipette loads with their tip racks.
    fn setup_actions(&self) -> Vec<ResolvedAction> {
        let mut actions: Vec<ResolvedAction> = self
            .manager
            .labware()
            .map(|(slot, model)| ResolvedAction::LoadLabware {
                slot,
                model: model.to_string(),
            })
            .collect();

        for (mount, pipette) in self.manager.pipettes() {
            let tip_rack_slots = self.manager.find_valid_tip_racks(&pipette.model);
            if tip_rack_slots.is_empty() {
                warn!(pipette = %pipette.model, %mount, "no tip racks found for pipette");
            }
            actions.push(ResolvedAction::LoadPipette {
                mount,
                model: pipette.model.clone(),
                tip_rack_slots,
            });
        }
        actions
    }

    fn compile_block(
        &mut self,
        block: &InstructionBlock,
    ) -> Result<Vec<ResolvedAction>, RecipeError> {
        let transfers = resolve_block(block, self.config, &mut *self.tables)?;
        if transfers.is_empty() {
            warn!(block = ?block.name, "block resolved to no transfers");
        }

        let mut actions = Vec::with_capacity(transfers.len() * 4);
        for transfer in transfers {
            let volume = transfer.volume;
            let mount = self
                .manager
                .determine_pipette(volume)
                .ok_or(RecipeError::NoPipetteAvailable { volume })?;

            if self.tip_state(mount) == TipState::NoTip {
                let model = self
                    .manager
                    .pipette_model(mount)
                    .map(str::to_string)
                    .ok_or(RecipeError::NoPipetteAvailable { volume })?;
                let (rack_slot, well_index) = self.manager.get_next_tip(&model)?;
                debug!(%mount, rack_slot, well_index, "picking tip");
                actions.push(ResolvedAction::PickTip {
                    mount,
                    rack_slot,
                    well_index,
                });
                self.tips.insert(mount, TipState::TipLoaded);
            }

            let source_slot = self.manager.resolve_slot(&transfer.source)?;
            let destination_slot = self.manager.resolve_slot(&transfer.destination)?;

            actions.push(ResolvedAction::Aspirate {
                mount,
                slot: source_slot,
                well: transfer.source.target.clone(),
                volume,
            });
            self.manager
                .update_well_usage(source_slot, &transfer.source.target);

            actions.push(ResolvedAction::Dispense {
                mount,
                slot: destination_slot,
                well: transfer.destination.target.clone(),
                volume,
            });
            self.manager
                .update_well_usage(destination_slot, &transfer.destination.target);

            if block.drop_tip {
                actions.push(ResolvedAction::DropTip { mount });
                self.tips.insert(mount, TipState::NoTip);
            }
        }
        Ok(actions)
    }

    fn tip_state(&self, mount: Mount) -> TipState {
        self.tips.get(&mount).copied().unwrap_or(TipState::NoTip)
    }

    /// Drop every tip still loaded at the end of the recipe.
    fn release_tips(&mut self) -> Vec<ResolvedAction> {
        let mut actions = Vec::new();
        for (mount, state) in self.tips.iter_mut() {
            if *state == TipState::TipLoaded {
                actions.push(ResolvedAction::DropTip { mount: *mount });
                *state = TipState::NoTip;
            }
        }
        actions
    }
}

/// Resolve one block's fields and broadcast them into elementary transfers.
pub fn resolve_block(
    block: &InstructionBlock,
    config: &RecipeConfig,
    tables: &mut dyn TableSource,
) -> Result<Vec<ElementaryTransfer<LocationRef>>, RecipeError> {
    let source = resolver::parse_locations(&block.source)?;
    let destination = resolver::parse_locations(&block.destination)?;

    let column = resolver::first_column(&source)
        .or_else(|| resolver::first_column(&destination))
        .map(str::to_string)
        .or_else(|| match &block.volume {
            VolumeField::ColumnRef(c) => Some(c.clone()),
            _ => None,
        });

    let (source, destination, volume) = match column {
        Some(column) => {
            let table = select_table(block, config, tables, &column)?;
            (
                resolver::resolve_column_tokens(source, table)?,
                resolver::resolve_column_tokens(destination, table)?,
                resolver::resolve_volume(&block.volume, Some(table))?,
            )
        }
        None => (
            source,
            destination,
            resolver::resolve_volume(&block.volume, None)?,
        ),
    };

    broadcast(volume, source, destination)
}

/// The block's explicit table, or the recipe's only table.
fn select_table<'t>(
    block: &InstructionBlock,
    config: &RecipeConfig,
    tables: &'t mut dyn TableSource,
    column: &str,
) -> Result<&'t ResourceTable, RecipeError> {
    let name = match (&block.table, config.resources.as_slice()) {
        (Some(name), _) => name.clone(),
        (None, [only]) => only.name.clone(),
        (None, declared) => {
            return Err(RecipeError::TableSelection {
                column: column.to_string(),
                declared: declared.len(),
            })
        }
    };
    tables.get_table(&name)
}
