//! Tile Store - command line access to a file blob store.
//!
//! Each invocation opens the store, runs one command and closes the store,
//! waiting for any background deletions it started.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;
use std::time::UNIX_EPOCH;

use clap::Parser;
use serde_json::json;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_store::{
    config::{Cli, Command, MetadataCommand, TileArgs},
    FileBlobStore, ParameterSet, StorageError, TileBlob, TileKey, TileRange,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match FileBlobStore::open(cli.store_config()) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&store, cli.command);
    store.close();

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(store: &FileBlobStore, command: Command) -> Result<ExitCode, StorageError> {
    match command {
        Command::Put { tile, file, params } => run_put(store, &tile, file, params),
        Command::Get { tile, output } => run_get(store, &tile, output),
        Command::Delete { tile } => {
            let deleted = store.delete(&tile_key(&tile))?;
            print_json(json!({ "deleted": deleted }));
            Ok(ExitCode::SUCCESS)
        }
        Command::Truncate {
            layer,
            gridset,
            format,
            zoom_start,
            zoom_stop,
            bounds,
            params_id,
        } => {
            let mut range = TileRange::new(layer, gridset, zoom_start, zoom_stop, format)?;
            for (z, rect) in bounds {
                range = range.with_bounds(z, rect);
            }
            if let Some(id) = params_id {
                range = range.with_parameters_id(id);
            }
            store.delete_range(&range)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteLayer { layer } => {
            let deleted = store.delete_layer(&layer)?;
            print_json(json!({ "layer": layer, "deleted": deleted }));
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteGridset { layer, gridset } => {
            let deleted = store.delete_by_gridset_id(&layer, &gridset)?;
            print_json(json!({ "layer": layer, "gridset": gridset, "deleted": deleted }));
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteParams { layer, params_id } => {
            let deleted = store.delete_by_parameters_id(&layer, &params_id)?;
            print_json(json!({ "layer": layer, "params_id": params_id, "deleted": deleted }));
            Ok(ExitCode::SUCCESS)
        }
        Command::Rename { old_name, new_name } => {
            store.rename(&old_name, &new_name)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Exists { layer } => {
            let exists = store.layer_exists(&layer);
            print_json(json!({ "layer": layer, "exists": exists }));
            Ok(if exists { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }
        Command::Size { layer } => {
            let usage = store.layer_cache_size(&layer)?;
            print_json(json!({ "layer": layer, "tiles": usage.tiles, "bytes": usage.bytes }));
            Ok(ExitCode::SUCCESS)
        }
        Command::Params { layer } => {
            let mapping = store.get_parameters_mapping(&layer)?;
            print_json(json!(mapping));
            Ok(ExitCode::SUCCESS)
        }
        Command::Metadata { command } => run_metadata(store, command),
    }
}

// =============================================================================
// Tile Commands
// =============================================================================

fn tile_key(args: &TileArgs) -> TileKey {
    let key = TileKey::new(
        args.layer.as_str(),
        args.gridset.as_str(),
        (args.x, args.y, args.z),
        args.format.as_str(),
    );
    match args.params_id {
        Some(ref id) => key.with_parameters_id(id.as_str()),
        None => key,
    }
}

fn run_put(
    store: &FileBlobStore,
    tile: &TileArgs,
    file: Option<std::path::PathBuf>,
    params: Vec<(String, String)>,
) -> Result<ExitCode, StorageError> {
    let data = match file {
        Some(path) => fs::read(&path).map_err(|e| StorageError::Io { path, source: e })?,
        None => {
            let mut data = Vec::new();
            io::stdin()
                .read_to_end(&mut data)
                .map_err(|e| StorageError::Io {
                    path: "<stdin>".into(),
                    source: e,
                })?;
            data
        }
    };
    debug!(bytes = data.len(), "Read tile payload");

    let mut blob = TileBlob::new(tile_key(tile), data);
    if !params.is_empty() {
        blob = blob.with_parameters(params.into_iter().collect::<ParameterSet>());
    }
    store.put(blob)?;
    Ok(ExitCode::SUCCESS)
}

fn run_get(
    store: &FileBlobStore,
    tile: &TileArgs,
    output: Option<std::path::PathBuf>,
) -> Result<ExitCode, StorageError> {
    let Some(blob) = store.get(&tile_key(tile))? else {
        print_json(json!({ "exists": false }));
        return Ok(ExitCode::from(2));
    };

    if let Some(path) = output {
        fs::write(&path, blob.data()).map_err(|e| StorageError::Io { path, source: e })?;
    }

    let created = blob
        .created()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64);
    print_json(json!({
        "exists": true,
        "size": blob.size(),
        "created_ms": created,
    }));
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// Metadata Commands
// =============================================================================

fn run_metadata(store: &FileBlobStore, command: MetadataCommand) -> Result<ExitCode, StorageError> {
    match command {
        MetadataCommand::Get { layer, key } => match store.get_layer_metadata(&layer, &key)? {
            Some(value) => {
                println!("{}", value);
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::from(2)),
        },
        MetadataCommand::Put { layer, key, value } => {
            let outcome = store.put_layer_metadata(&layer, &key, value.as_deref())?;
            print_json(json!({ "outcome": format!("{:?}", outcome).to_lowercase() }));
            Ok(ExitCode::SUCCESS)
        }
        MetadataCommand::List { layer } => {
            print_json(json!(store.layer_metadata(&layer)?));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json(value: serde_json::Value) {
    println!("{:#}", value);
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so command output on stdout stays machine readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_store=debug"
    } else {
        "tile_store=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}
