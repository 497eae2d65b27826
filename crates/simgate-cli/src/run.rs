//! # simgate-cli::run
//!
//! Assembles the property tree and wires all the components: channel
//! mappings, predictor, dispatcher, network manager, and the optional CSV
//! data logger, then hands control to the dispatcher loop.

use crate::args::Cli;
use crate::error::AppError;
use simgate_engine::prelude::*;
use simgate_model::factory::make_predictor;
use simgate_net::manager::NetworkManager;
use std::collections::HashSet;
use tracing::{debug, info};

pub fn exec(args: Cli) -> Result<(), AppError> {
    let mut config = load_properties(&args)?;

    let mut drawer = PortIdDrawer::new();
    let in_map = ChannelMapping::from_config(&mut drawer, &config, "in").map_err(AppError::Config)?;
    let out_map =
        ChannelMapping::from_config(&mut drawer, &config, "out").map_err(AppError::Config)?;
    debug!(%in_map, "settled input variable to channel mapping");
    debug!(%out_map, "settled output variable to channel mapping");

    let predictor = make_predictor(&mut config, &in_map, &out_map)?;
    let mut dispatcher = EventDispatcher::new(&config, predictor)?;
    let data_logger = CsvDataLogger::from_config(&config, &in_map, &out_map)?;
    // Starting the subscribers is the last fallible step before the
    // queue's epoch is anchored in run().
    let mut manager = NetworkManager::new(&config, &in_map, &out_map, &mut dispatcher)?;
    if let Some(data_logger) = data_logger {
        dispatcher.add_listener(Box::new(data_logger));
    }

    info!("starting the event dispatch cycle");
    let result = dispatcher.run();
    manager.shutdown();
    result?;
    info!("simulation finished");
    Ok(())
}

/// Builds the property tree from the optional file and the `key=value`
/// arguments. Command line properties override file entries; a key given
/// twice on the command line is an argument error.
fn load_properties(args: &Cli) -> Result<ConfigTree, AppError> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
            ConfigTree::from_toml_str(&text)?
        }
        None => ConfigTree::new(),
    };

    let mut seen = HashSet::new();
    for property in &args.properties {
        let Some((key, value)) = property.split_once('=') else {
            return Err(AppError::InvalidArgument(format!(
                "expected key=value, got \"{property}\""
            )));
        };
        if key.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "property \"{property}\" has no key"
            )));
        }
        if !seen.insert(key.to_string()) {
            return Err(AppError::InvalidArgument(format!(
                "property `{key}` is given twice"
            )));
        }
        config.put(key, value);
    }
    Ok(config)
}
