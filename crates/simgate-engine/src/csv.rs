//! # simgate-engine::csv
//!
//! An optional side channel that appends every delivered event to a CSV
//! file. The file starts with a quoted name header and a type-tag line;
//! data rows carry the event time followed by one cell per known port,
//! left empty when the event does not assign that port.
//!
//! Reading `variables()` here intentionally commits lazy events, so a run
//! with data logging settles every prediction it delivers.

use crate::event::{Event, EventListener};
use simgate_types::channel::ChannelMapping;
use simgate_types::config::ConfigTree;
use simgate_types::errors::{ConfigError, DispatchError};
use simgate_types::port::{PortId, VarType};
use simgate_types::variable::{Value, Variable};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::debug;

/// The key of the CSV file name property.
pub const PROP_DATA_FILE: &str = "app.dataFile";

const SEPARATOR: char = ';';

/// Writes delivered events as semicolon separated records.
pub struct CsvDataLogger {
    header: Vec<PortId>,
    out: Box<dyn Write + Send>,
}

impl CsvDataLogger {
    /// Creates the logger when `app.dataFile` is configured; returns
    /// `None` otherwise.
    pub fn from_config(
        config: &ConfigTree,
        in_map: &ChannelMapping,
        out_map: &ChannelMapping,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(path) = config.get_str(PROP_DATA_FILE) else {
            return Ok(None);
        };
        let file = File::create(path).map_err(|err| {
            ConfigError::entry(
                PROP_DATA_FILE,
                path,
                format!("cannot open the CSV file for writing: {err}"),
            )
        })?;
        debug!(path, "logging event data to CSV");
        let logger = Self::new(Box::new(BufWriter::new(file)), in_map, out_map)?;
        Ok(Some(logger))
    }

    /// Creates a logger writing to the given destination and immediately
    /// emits the two header lines.
    pub fn new(
        out: Box<dyn Write + Send>,
        in_map: &ChannelMapping,
        out_map: &ChannelMapping,
    ) -> Result<Self, ConfigError> {
        let mut header = in_map.all_variable_ids();
        header.extend(out_map.all_variable_ids());
        let mut names = in_map.all_variable_names();
        names.extend(out_map.all_variable_names());

        let mut logger = Self { header, out };
        logger.write_header(&names)?;
        Ok(logger)
    }

    fn write_header(&mut self, names: &[String]) -> Result<(), ConfigError> {
        let mut line = quoted("time");
        for name in names {
            line.push(SEPARATOR);
            line.push_str(&quoted(name));
        }
        line.push('\n');
        // The time column is a real value like any model variable.
        line.push_str(&quoted(VarType::Real.name()));
        for id in &self.header {
            line.push(SEPARATOR);
            line.push_str(&quoted(id.ty.name()));
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn write_record(&mut self, time: f64, vars: &[Variable]) -> std::io::Result<()> {
        let mut line = time.to_string();
        for id in &self.header {
            line.push(SEPARATOR);
            if let Some(var) = vars.iter().find(|v| v.id == *id) {
                line.push_str(&cell(&var.value));
            }
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.out.flush()
    }
}

impl EventListener for CsvDataLogger {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError> {
        let vars = ev.variables()?;
        self.write_record(ev.time(), &vars)
            .map_err(DispatchError::DataLog)
    }
}

/// Quotes a header field, escaping embedded quotes by doubling them.
fn quoted(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for ch in field.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn cell(value: &Value) -> String {
    match value {
        Value::Real(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Boolean(v) => u8::from(*v).to_string(),
        Value::Text(v) => quoted(v),
        Value::Empty => String::new(),
    }
}
