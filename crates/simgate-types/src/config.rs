//! # simgate-types::config
//!
//! The configuration surface of the process is a property tree: every node
//! may carry a data string and an ordered set of named children, addressed
//! by dotted paths such as `in.0.packetTimeout`. The tree is populated
//! from `key=value` properties and from flattened TOML files; consumers
//! read it through typed getters which report the failing key on error.

use crate::errors::ConfigError;
use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// In TOML property files a table cannot both name children and carry its
/// own data string, so the child with this key sets the node value.
const VALUE_KEY: &str = "value";

/// A node of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    value: Option<String>,
    children: IndexMap<String, ConfigTree>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The data string stored directly at this node.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns the node at the dotted `path`, if present. An empty path
    /// addresses this node itself.
    pub fn node(&self, path: &str) -> Option<&ConfigTree> {
        let mut node = self;
        if path.is_empty() {
            return Some(node);
        }
        for part in path.split('.') {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    pub fn has(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    /// Iterates over the direct children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &ConfigTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn node_mut(&mut self, path: &str) -> &mut ConfigTree {
        let mut node = self;
        if path.is_empty() {
            return node;
        }
        for part in path.split('.') {
            node = node.children.entry(part.to_string()).or_default();
        }
        node
    }

    /// Stores a value, failing if the node already carries one.
    pub fn set(&mut self, path: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        let node = self.node_mut(path);
        if node.value.is_some() {
            return Err(ConfigError::Message(format!(
                "configuration property `{path}` is set twice"
            )));
        }
        node.value = Some(value.into());
        Ok(())
    }

    /// Stores a value, replacing any previous one.
    pub fn put(&mut self, path: &str, value: impl Into<String>) {
        self.node_mut(path).value = Some(value.into());
    }

    /// Stores a value only if the node does not carry one yet.
    pub fn set_default(&mut self, path: &str, value: impl Into<String>) {
        let node = self.node_mut(path);
        if node.value.is_none() {
            node.value = Some(value.into());
        }
    }

    /// The data string at the dotted `path`, if present.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.node(path).and_then(|n| n.value())
    }

    /// Parses the value at `path`, returning `None` when absent.
    pub fn parse<T>(&self, path: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get_str(path) {
            Some(raw) => parse_value(raw, path).map(Some),
            None => Ok(None),
        }
    }

    /// Parses the value at `path`, falling back to `default` when absent.
    pub fn parse_or<T>(&self, path: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse(path)?.unwrap_or(default))
    }

    /// Parses the value at `path`, failing when absent.
    pub fn require<T>(&self, path: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.parse(path)?.ok_or_else(|| ConfigError::missing(path))
    }

    pub fn require_str(&self, path: &str) -> Result<&str, ConfigError> {
        self.get_str(path).ok_or_else(|| ConfigError::missing(path))
    }

    /// Parses a boolean flag. Accepts `true`/`false` and `1`/`0`.
    pub fn bool_or(&self, path: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_str(path) {
            None => Ok(default),
            Some(raw) => parse_bool(raw, path),
        }
    }

    /// Builds a tree from the TOML text of a property file.
    ///
    /// Scalars become data strings; tables become children, except for the
    /// reserved child key `value` which sets the table node's own data.
    pub fn from_toml_str(text: &str) -> Result<ConfigTree, ConfigError> {
        let parsed: toml::Value = toml::from_str(text)?;
        let mut root = ConfigTree::new();
        merge_toml(&mut root, "", &parsed)?;
        Ok(root)
    }
}

/// A view of a subtree which reports errors under absolute keys.
///
/// Components that read their own configuration section (a channel, a
/// connection) use this so that error messages name the full dotted path
/// instead of a path relative to the section.
#[derive(Debug, Clone)]
pub struct ScopedTree<'a> {
    tree: &'a ConfigTree,
    scope: String,
}

impl<'a> ScopedTree<'a> {
    pub fn new(tree: &'a ConfigTree, scope: impl Into<String>) -> Self {
        Self {
            tree,
            scope: scope.into(),
        }
    }

    /// The absolute key of a path relative to this scope.
    pub fn key(&self, rel: &str) -> String {
        if self.scope.is_empty() {
            rel.to_string()
        } else {
            format!("{}.{}", self.scope, rel)
        }
    }

    pub fn tree(&self) -> &'a ConfigTree {
        self.tree
    }

    pub fn get_str(&self, rel: &str) -> Option<&'a str> {
        self.tree.get_str(rel)
    }

    pub fn parse<T>(&self, rel: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.tree.get_str(rel) {
            Some(raw) => parse_value(raw, &self.key(rel)).map(Some),
            None => Ok(None),
        }
    }

    pub fn parse_or<T>(&self, rel: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse(rel)?.unwrap_or(default))
    }

    pub fn require_str(&self, rel: &str) -> Result<&'a str, ConfigError> {
        self.tree
            .get_str(rel)
            .ok_or_else(|| ConfigError::missing(self.key(rel)))
    }
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|err: T::Err| ConfigError::entry(key, raw, err.to_string()))
}

fn parse_bool(raw: &str, key: &str) -> Result<bool, ConfigError> {
    match raw {
        "1" => Ok(true),
        "0" => Ok(false),
        other => other
            .parse()
            .map_err(|_| ConfigError::entry(key, raw, "expected a boolean")),
    }
}

fn merge_toml(node: &mut ConfigTree, path: &str, value: &toml::Value) -> Result<(), ConfigError> {
    match value {
        toml::Value::Table(table) => {
            for (key, entry) in table {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if key == VALUE_KEY && !entry.is_table() {
                    node.value = Some(scalar_to_string(entry, &child_path)?);
                } else {
                    let child = node.children.entry(key.clone()).or_default();
                    merge_toml(child, &child_path, entry)?;
                }
            }
            Ok(())
        }
        scalar => {
            node.value = Some(scalar_to_string(scalar, path)?);
            Ok(())
        }
    }
}

fn scalar_to_string(value: &toml::Value, path: &str) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(v) => Ok(v.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::entry(
            path,
            "<array>",
            "arrays are not supported in property files",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_set_and_get() {
        let mut tree = ConfigTree::new();
        tree.set("app.startTime", "0.0").unwrap();
        tree.set("in.0.0", "omega").unwrap();
        tree.set("in.0.0.type", "0").unwrap();

        assert_eq!(tree.get_str("app.startTime"), Some("0.0"));
        assert_eq!(tree.get_str("in.0.0"), Some("omega"));
        assert_eq!(tree.get_str("in.0.0.type"), Some("0"));
        assert_eq!(tree.get_str("in.0.1"), None);
    }

    #[test]
    fn duplicate_assignment_is_rejected() {
        let mut tree = ConfigTree::new();
        tree.set("app.stopTime", "1.0").unwrap();
        assert!(tree.set("app.stopTime", "2.0").is_err());
        tree.put("app.stopTime", "2.0");
        assert_eq!(tree.get_str("app.stopTime"), Some("2.0"));
    }

    #[test]
    fn set_default_does_not_overwrite() {
        let mut tree = ConfigTree::new();
        tree.set_default("app.startTime", "0");
        tree.set_default("app.startTime", "5");
        assert_eq!(tree.get_str("app.startTime"), Some("0"));
    }

    #[test]
    fn typed_getters_report_the_failing_key() {
        let mut tree = ConfigTree::new();
        tree.set("app.stopTime", "soon").unwrap();
        let err = tree.parse::<f64>("app.stopTime").unwrap_err();
        match err {
            ConfigError::Entry { key, value, .. } => {
                assert_eq!(key, "app.stopTime");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            tree.require::<f64>("app.lookAheadTime"),
            Err(ConfigError::Missing { .. })
        ));
        assert_eq!(tree.parse_or::<f64>("app.missing", 1.5).unwrap(), 1.5);
    }

    #[test]
    fn bool_flags_accept_numeric_shorthand() {
        let mut tree = ConfigTree::new();
        tree.set("app.variableStepSize", "1").unwrap();
        assert!(tree.bool_or("app.variableStepSize", false).unwrap());
        tree.set("other", "false").unwrap();
        assert!(!tree.bool_or("other", true).unwrap());
        assert!(tree.bool_or("absent", true).unwrap());
    }

    #[test]
    fn toml_files_flatten_into_the_tree() {
        let text = r#"
            [app]
            startTime = 0.0
            stopTime = 12.5

            [in.0]
            addr = "localhost:4242"
            protocol = "CompactASN.1-TCP"

            [in.0.0]
            value = "omega"
            type = 0
        "#;
        let tree = ConfigTree::from_toml_str(text).unwrap();
        assert_eq!(tree.get_str("app.startTime"), Some("0"));
        assert_eq!(tree.get_str("app.stopTime"), Some("12.5"));
        assert_eq!(tree.get_str("in.0.addr"), Some("localhost:4242"));
        assert_eq!(tree.get_str("in.0.0"), Some("omega"));
        assert_eq!(tree.get_str("in.0.0.type"), Some("0"));
    }

    #[test]
    fn toml_arrays_are_rejected() {
        let err = ConfigTree::from_toml_str("ports = [1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Entry { .. }));
    }

    #[test]
    fn scoped_tree_prefixes_error_keys() {
        let mut tree = ConfigTree::new();
        tree.set("connection.plc.addr", "nowhere").unwrap();
        tree.set("connection.plc.reconnectionRetryCount", "many")
            .unwrap();
        let scoped = ScopedTree::new(tree.node("connection.plc").unwrap(), "connection.plc");
        assert_eq!(scoped.get_str("addr"), Some("nowhere"));
        let err = scoped.parse::<u32>("reconnectionRetryCount").unwrap_err();
        match err {
            ConfigError::Entry { key, .. } => {
                assert_eq!(key, "connection.plc.reconnectionRetryCount");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            scoped.require_str("protocol"),
            Err(ConfigError::Missing { key }) if key == "connection.plc.protocol"
        ));
    }
}
