//! CLI subcommands — compile, validate, run, status.

use crate::core::codegen::{self, Emitter, OpentronsEmitter};
use crate::core::manager::{rack_capacity, tip_rack_volume, ResourceManager};
use crate::core::tables::FileTables;
use crate::core::{compiler, parser, state, types};
use crate::transport;
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a recipe into a robot protocol
    Compile {
        /// Path to the recipe YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Output protocol path (default: <recipe>_protocol.py next to the recipe)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Resource snapshot from an earlier run
        #[arg(long)]
        resource_in: Option<PathBuf>,

        /// Where to write the updated resource snapshot
        #[arg(long)]
        resource_out: Option<PathBuf>,

        /// Do not write a resource snapshot
        #[arg(long)]
        no_resources: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Python)]
        format: OutputFormat,
    },

    /// Validate a recipe without compiling it
    Validate {
        /// Path to the recipe YAML
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compile if needed, then simulate locally or run on the robot
    Run {
        /// Robot inventory YAML (the first robot is used)
        #[arg(long)]
        robot: PathBuf,

        /// Recipe YAML, or an already compiled protocol (.py)
        #[arg(short, long)]
        protocol: PathBuf,

        /// Resource snapshot from an earlier run
        #[arg(long)]
        resource_in: Option<PathBuf>,

        /// Where to write the updated resource snapshot
        #[arg(long)]
        resource_out: Option<PathBuf>,

        /// Run opentrons_simulate locally instead of the robot
        #[arg(long)]
        simulate: bool,

        /// Directory on the robot to copy the protocol into
        #[arg(long, default_value = "/root")]
        remote_dir: String,

        /// Delete the protocol (and any generated snapshot when simulating) afterwards
        #[arg(long)]
        delete: bool,
    },

    /// Show tip and well usage from a resource snapshot
    Status {
        /// Resource snapshot JSON
        #[arg(long)]
        state: PathBuf,
    },
}

/// Rendering of a compiled protocol.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Python protocol for the Opentrons runtime
    Python,
    /// Resolved actions as JSON
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Json => "json",
        }
    }
}

/// Options shared by `compile` and `run`.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub config: PathBuf,
    pub out: Option<PathBuf>,
    pub resource_in: Option<PathBuf>,
    pub resource_out: Option<PathBuf>,
    pub write_resources: bool,
    pub format: OutputFormat,
}

/// Files produced by a compilation.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub protocol: PathBuf,
    pub resources: Option<PathBuf>,
    pub hash: String,
}

/// Install the tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    // A subscriber may already be set (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Compile {
            config,
            out,
            resource_in,
            resource_out,
            no_resources,
            format,
        } => {
            let outcome = compile_recipe(&CompileOptions {
                config,
                out,
                resource_in,
                resource_out,
                write_resources: !no_resources,
                format,
            })?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Run {
            robot,
            protocol,
            resource_in,
            resource_out,
            simulate,
            remote_dir,
            delete,
        } => cmd_run(
            &robot,
            &protocol,
            resource_in,
            resource_out,
            simulate,
            &remote_dir,
            delete,
        ),
        Commands::Status { state } => cmd_status(&state),
    }
}

fn parse_and_validate(file: &Path) -> Result<types::RecipeConfig, String> {
    let config = parser::parse_recipe_file(file)?;
    let errors = parser::validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    Ok(config)
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    println!(
        "OK: {} ({} labware, {} pipettes, {} commands)",
        file.display(),
        config.labware().count(),
        config.pipettes().count(),
        config.commands.len()
    );
    Ok(())
}

/// `<dir>/<stem>_protocol.<ext>` next to the recipe.
fn default_protocol_path(recipe: &Path, format: OutputFormat) -> PathBuf {
    let stem = recipe
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recipe");
    recipe.with_file_name(format!("{}_protocol.{}", stem, format.extension()))
}

/// Snapshot destination: explicit output, else the input snapshot, else a
/// file named after the recipe.
fn resource_out_path(opts: &CompileOptions) -> PathBuf {
    opts.resource_out
        .clone()
        .or_else(|| opts.resource_in.clone())
        .unwrap_or_else(|| state::default_snapshot_path(&opts.config))
}

/// Compile a recipe file, writing the protocol and (optionally) the snapshot.
pub fn compile_recipe(opts: &CompileOptions) -> Result<CompileOutcome, String> {
    let config = parse_and_validate(&opts.config)?;

    let prior = match &opts.resource_in {
        Some(path) => {
            let snapshot = state::load_snapshot(path)?;
            if snapshot.is_none() {
                info!(path = %path.display(), "no resource snapshot yet, starting fresh");
            }
            snapshot
        }
        None => None,
    };

    let base_dir = opts.config.parent().unwrap_or_else(|| Path::new("."));
    let mut tables = FileTables::new(&config.resources, base_dir);
    let compilation =
        compiler::compile(&config, prior.as_ref(), &mut tables).map_err(|e| e.to_string())?;

    let text = match opts.format {
        OutputFormat::Python => OpentronsEmitter.render(&compilation.artifact),
        OutputFormat::Json => codegen::render_json(&compilation.artifact)?,
    };

    let protocol = opts
        .out
        .clone()
        .unwrap_or_else(|| default_protocol_path(&opts.config, opts.format));
    if let Some(parent) = protocol.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    std::fs::write(&protocol, &text)
        .map_err(|e| format!("cannot write {}: {}", protocol.display(), e))?;
    debug!(path = %protocol.display(), "wrote protocol");

    let resources = if opts.write_resources {
        let path = resource_out_path(opts);
        state::save_snapshot(&path, &compilation.state)?;
        debug!(path = %path.display(), "wrote resource snapshot");
        Some(path)
    } else {
        None
    };

    Ok(CompileOutcome {
        protocol,
        resources,
        hash: codegen::artifact_hash(&text),
    })
}

fn print_outcome(outcome: &CompileOutcome) {
    println!("Compiled: {}", outcome.protocol.display());
    println!("  hash: {}", outcome.hash);
    if let Some(resources) = &outcome.resources {
        println!("  resources: {}", resources.display());
    }
}

fn is_protocol_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("py")
}

fn cmd_run(
    robot_file: &Path,
    protocol: &Path,
    resource_in: Option<PathBuf>,
    resource_out: Option<PathBuf>,
    simulate: bool,
    remote_dir: &str,
    delete: bool,
) -> Result<(), String> {
    let robots = parser::parse_robots_file(robot_file)?;
    let robot = robots
        .first()
        .ok_or_else(|| format!("{} lists no robots", robot_file.display()))?;

    let (protocol_file, generated_resources) = if is_protocol_file(protocol) {
        println!("Existing protocol: {}", protocol.display());
        (protocol.to_path_buf(), None)
    } else {
        let had_resource_in = resource_in.is_some();
        let outcome = compile_recipe(&CompileOptions {
            config: protocol.to_path_buf(),
            out: None,
            resource_in,
            resource_out,
            write_resources: true,
            format: OutputFormat::Python,
        })?;
        print_outcome(&outcome);
        let generated = outcome.resources.filter(|_| !had_resource_in);
        (outcome.protocol, generated)
    };

    if simulate {
        info!(protocol = %protocol_file.display(), "simulating");
        let out = transport::simulate(&protocol_file)?;
        print!("{}", out.stdout);
        if delete {
            remove_local(&protocol_file)?;
            if let Some(resources) = &generated_resources {
                remove_local(resources)?;
            }
        }
        if !out.success() {
            return Err(format!(
                "opentrons_simulate failed (exit {}): {}",
                out.exit_code,
                out.stderr.trim()
            ));
        }
        return Ok(());
    }

    info!(robot = %robot.ip, "transferring protocol");
    let remote = transport::transfer(robot, &protocol_file, remote_dir)?;
    println!("Transferred to {}:{}", robot.ip, remote);

    let out = transport::execute(robot, &remote)?;
    print!("{}", out.stdout);
    if delete {
        let rm = transport::remove(robot, &remote)?;
        if !rm.success() {
            eprintln!("  WARN: could not remove {}: {}", remote, rm.stderr.trim());
        }
    }
    if !out.success() {
        return Err(format!(
            "opentrons_execute on {} failed (exit {}): {}",
            robot.ip,
            out.exit_code,
            out.stderr.trim()
        ));
    }
    Ok(())
}

fn remove_local(path: &Path) -> Result<(), String> {
    std::fs::remove_file(path).map_err(|e| format!("cannot remove {}: {}", path.display(), e))
}

fn cmd_status(path: &Path) -> Result<(), String> {
    let snapshot = state::load_snapshot(path)?
        .ok_or_else(|| format!("no resource snapshot at {}", path.display()))?;
    let manager = ResourceManager::load_state(snapshot);

    println!("Resources: {}", path.display());
    for (slot, model) in manager.labware() {
        if tip_rack_volume(model).is_some() {
            println!(
                "  slot {:>2}: {} ({}/{} tips used)",
                slot,
                model,
                manager.tips_used(slot),
                rack_capacity(model)
            );
        } else {
            println!("  slot {:>2}: {}", slot, model);
        }
    }
    for (mount, pipette) in manager.pipettes() {
        println!(
            "  {:<5}: {} [{}-{} ul]",
            mount, pipette.model, pipette.min_volume, pipette.max_volume
        );
    }

    let dump = manager.dump_state();
    for (slot, wells) in &dump.well_usage {
        let used: Vec<String> = wells.iter().map(|(w, n)| format!("{}x{}", w, n)).collect();
        println!("  wells @ {}: {}", slot, used.join(", "));
    }
    Ok(())
}
