//! Artifact emission.
//!
//! An [`Emitter`] turns each resolved action into one line of target code.
//! [`OpentronsEmitter`] writes a Python protocol for the Opentrons runtime. The
//! protocol starts with a `metadata` dict. Its `run(protocol)` function keys
//! loaded labware by slot in a `deck` dict and instruments by mount in a
//! `pipettes` dict, then issues the commands.

use super::types::{yaml_value_to_string, Artifact, ResolvedAction};

/// API level used when the recipe metadata does not set one.
pub const DEFAULT_API_LEVEL: &str = "2.12";

/// Renders resolved actions as target code.
pub trait Emitter {
    /// Code preceding the first action.
    fn prologue(&self, artifact: &Artifact) -> Vec<String>;

    /// One action.
    fn emit(&self, action: &ResolvedAction) -> String;

    /// A comment line naming a block.
    fn comment(&self, text: &str) -> String;

    /// Render a whole artifact: prologue, setup, one commented group per
    /// block, then teardown.
    fn render(&self, artifact: &Artifact) -> String {
        let mut lines = self.prologue(artifact);
        lines.extend(artifact.setup.iter().map(|a| self.emit(a)));
        for block in &artifact.blocks {
            lines.push(String::new());
            lines.push(self.comment(&block.label));
            lines.extend(block.actions.iter().map(|a| self.emit(a)));
        }
        if !artifact.teardown.is_empty() {
            lines.push(String::new());
            lines.extend(artifact.teardown.iter().map(|a| self.emit(a)));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Python protocol for the Opentrons protocol API.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpentronsEmitter;

const INDENT: &str = "    ";

impl Emitter for OpentronsEmitter {
    fn prologue(&self, artifact: &Artifact) -> Vec<String> {
        let mut lines = vec![
            "from opentrons import protocol_api".to_string(),
            String::new(),
            "metadata = {".to_string(),
        ];
        let mut has_api_level = false;
        for (key, value) in &artifact.metadata {
            has_api_level |= key == "apiLevel";
            lines.push(format!(
                "{}{}: {},",
                INDENT,
                py_str(key),
                py_str(&yaml_value_to_string(value))
            ));
        }
        if !has_api_level {
            lines.push(format!("{}\"apiLevel\": {},", INDENT, py_str(DEFAULT_API_LEVEL)));
        }
        lines.push("}".to_string());
        lines.push(String::new());
        lines.push(String::new());
        lines.push("def run(protocol: protocol_api.ProtocolContext):".to_string());
        lines.push(format!("{}deck = {{}}", INDENT));
        lines.push(format!("{}pipettes = {{}}", INDENT));
        lines.push(String::new());
        lines
    }

    fn emit(&self, action: &ResolvedAction) -> String {
        let code = match action {
            ResolvedAction::LoadLabware { slot, model } => format!(
                "deck[\"{slot}\"] = protocol.load_labware({}, \"{slot}\")",
                py_str(model)
            ),
            ResolvedAction::LoadPipette {
                mount,
                model,
                tip_rack_slots,
            } => {
                let racks: Vec<String> = tip_rack_slots
                    .iter()
                    .map(|s| format!("deck[\"{}\"]", s))
                    .collect();
                let tip_racks = format!("tip_racks=[{}]", racks.join(", "));
                format!(
                    "pipettes[\"{mount}\"] = protocol.load_instrument({}, \"{mount}\", {})",
                    py_str(model),
                    tip_racks
                )
            }
            ResolvedAction::PickTip {
                mount,
                rack_slot,
                well_index,
            } => format!(
                "pipettes[\"{}\"].pick_up_tip(deck[\"{}\"].wells()[{}])",
                mount, rack_slot, well_index
            ),
            ResolvedAction::Aspirate {
                mount,
                slot,
                well,
                volume,
            } => format!(
                "pipettes[\"{}\"].aspirate({}, deck[\"{}\"][{}])",
                mount,
                volume,
                slot,
                py_str(well)
            ),
            ResolvedAction::Dispense {
                mount,
                slot,
                well,
                volume,
            } => format!(
                "pipettes[\"{}\"].dispense({}, deck[\"{}\"][{}])",
                mount,
                volume,
                slot,
                py_str(well)
            ),
            ResolvedAction::DropTip { mount } => format!("pipettes[\"{}\"].drop_tip()", mount),
        };
        format!("{}{}", INDENT, code)
    }

    fn comment(&self, text: &str) -> String {
        format!("{}# {}", INDENT, text.replace('\n', " "))
    }
}

/// Python string literal. JSON string escapes are valid Python escapes.
fn py_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render an artifact as pretty JSON.
pub fn render_json(artifact: &Artifact) -> Result<String, String> {
    let mut out = serde_json::to_string_pretty(artifact)
        .map_err(|e| format!("JSON serialize error: {}", e))?;
    out.push('\n');
    Ok(out)
}

/// BLAKE3 digest of rendered output, as `blake3:{hex}`.
pub fn artifact_hash(text: &str) -> String {
    format!("blake3:{}", blake3::hash(text.as_bytes()).to_hex())
}
