//! Patch files: an authored scene of nodes and connections.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spatia_core::nodes::{Constant, DistanceGain, Gain, Orbit, Sine};
use spatia_core::{
    AudioEngine, AudioNode, Configuration, Connection, ConnectionTable, MAX_NODE_CHANNELS, NodeId,
    NodeKind, NodeTree,
};

use crate::error::ConfigError;

/// Node kinds a patch may instantiate.
pub const NODE_KINDS: &[&str] = &[
    "constant",
    "sine",
    "gain",
    "orbit",
    "distance_gain",
    "input",
    "output",
];

/// A parameter value: a plain number or a string with a unit suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// `gain = 0.5`
    Number(f64),
    /// `gain = "-6dB"`, `freq = "1.2kHz"`
    Text(String),
}

impl ParamValue {
    /// Numeric value, with units converted. `None` if the text is not a
    /// recognized quantity.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Number(v) => Some(*v as f32),
            Self::Text(text) => parse_quantity(text),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Unit suffixes, matched case-insensitively. `ms` precedes `s` and `kHz`
/// precedes `Hz` so the longer suffix wins.
const UNITS: &[(&str, fn(f32) -> f32)] = &[
    ("kHz", |v| v * 1000.0),
    ("Hz", |v| v),
    ("dB", |db| libm::powf(10.0, db / 20.0)),
    ("ms", |v| v / 1000.0),
    ("s", |v| v),
    ("%", |v| v / 100.0),
];

/// Reads a parameter quantity such as `"0.5"`, `"20%"`, `"-6dB"` (linear
/// gain), `"250ms"` (seconds) or `"1.2kHz"` (Hz). Non-finite results are
/// rejected.
pub fn parse_quantity(text: &str) -> Option<f32> {
    let text = text.trim();
    let unit = UNITS.iter().find_map(|&(suffix, convert)| {
        let split = text.len().checked_sub(suffix.len())?;
        let tail = text.get(split..)?;
        tail.eq_ignore_ascii_case(suffix)
            .then(|| (&text[..split], convert))
    });
    let value = match unit {
        Some((number, convert)) => convert(number.trim().parse::<f32>().ok()?),
        None => text.parse::<f32>().ok()?,
    };
    value.is_finite().then_some(value)
}

/// One `[[node]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    /// Unique name, referenced by connections and children.
    pub name: String,
    /// One of [`NODE_KINDS`].
    pub kind: String,
    /// Name of the parent node. Parents must be declared first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Kind-specific parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
}

impl NodeSpec {
    /// Create a node entry without parameters.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            parent: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the parent node.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn param(&self, key: &str, default: f32) -> Result<f32, ConfigError> {
        match self.params.get(key) {
            None => Ok(default),
            Some(value) => value.as_f32().ok_or_else(|| {
                ConfigError::Validation(format!(
                    "invalid value {value:?} for '{key}' on node '{}'",
                    self.name
                ))
            }),
        }
    }

    fn channels(&self) -> Result<usize, ConfigError> {
        let channels = self.param("channels", 1.0)?;
        if channels < 1.0 || channels > MAX_NODE_CHANNELS as f32 || channels.fract() != 0.0 {
            return Err(ConfigError::Validation(format!(
                "channels on node '{}' must be a whole number in [1, {MAX_NODE_CHANNELS}]",
                self.name
            )));
        }
        Ok(channels as usize)
    }

    fn check_params(&self, allowed: &[&str]) -> Result<(), ConfigError> {
        match self.params.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => Err(ConfigError::Validation(format!(
                "unknown parameter '{key}' for {} node '{}'",
                self.kind, self.name
            ))),
            None => Ok(()),
        }
    }

    /// Builds the node this entry describes.
    pub fn node_kind(&self) -> Result<NodeKind, ConfigError> {
        let processor: Box<dyn AudioNode> = match self.kind.as_str() {
            "input" | "output" => {
                self.check_params(&[])?;
                return Ok(if self.kind == "input" {
                    NodeKind::SystemInput
                } else {
                    NodeKind::SystemOutput
                });
            }
            "constant" => {
                self.check_params(&["value", "channels"])?;
                Box::new(Constant::new(self.param("value", 0.0)?).with_channels(self.channels()?))
            }
            "sine" => {
                self.check_params(&["freq", "amp"])?;
                Box::new(Sine::new(self.param("freq", 440.0)?, self.param("amp", 1.0)?))
            }
            "gain" => {
                self.check_params(&["gain"])?;
                Box::new(Gain::new(self.param("gain", 1.0)?))
            }
            "orbit" => {
                self.check_params(&["radius", "speed"])?;
                Box::new(Orbit::new(self.param("radius", 1.0)?, self.param("speed", 0.25)?))
            }
            "distance_gain" => {
                self.check_params(&["reference"])?;
                let reference = self.param("reference", 1.0)?;
                if reference <= 0.0 {
                    return Err(ConfigError::Validation(format!(
                        "reference on node '{}' must be positive",
                        self.name
                    )));
                }
                Box::new(DistanceGain::new(reference))
            }
            other => return Err(ConfigError::UnknownNodeKind(other.to_owned())),
        };
        Ok(NodeKind::Processor(processor))
    }
}

fn one() -> usize {
    1
}

fn is_one(n: &usize) -> bool {
    *n == 1
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// One `[[connection]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    /// Upstream node name.
    pub from: String,
    /// Downstream node name.
    pub to: String,
    /// First output channel of `from`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub output: usize,
    /// First input channel of `to`.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub input: usize,
    /// Consecutive channels routed.
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub channels: usize,
}

impl ConnectionSpec {
    /// Single-channel connection between channel 0 of both nodes.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            output: 0,
            input: 0,
            channels: 1,
        }
    }

    /// Set the channel range.
    pub fn with_channels(mut self, output: usize, input: usize, channels: usize) -> Self {
        self.output = output;
        self.input = input;
        self.channels = channels;
        self
    }

    /// Checks that the routed channels exist on nodes of at most
    /// [`MAX_NODE_CHANNELS`] channels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fits = |first: usize| {
            first
                .checked_add(self.channels)
                .is_some_and(|end| end <= MAX_NODE_CHANNELS)
        };
        if self.channels == 0 || !fits(self.output) || !fits(self.input) {
            return Err(ConfigError::Validation(format!(
                "connection {} -> {} routes channels {}..+{} into {}..+{}, \
                 outside [0, {MAX_NODE_CHANNELS})",
                self.from, self.to, self.output, self.channels, self.input, self.channels
            )));
        }
        Ok(())
    }
}

/// An authored scene.
///
/// # TOML Format
///
/// ```toml
/// name = "orbiting tone"
///
/// [[node]]
/// name = "osc"
/// kind = "sine"
/// params = { freq = "220Hz", amp = 0.5 }
///
/// [[node]]
/// name = "out"
/// kind = "output"
///
/// [[connection]]
/// from = "osc"
/// to = "out"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patch {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nodes, in declaration order.
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeSpec>,
    /// Connections, applied in order.
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionSpec>,
}

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a connection.
    pub fn with_connection(mut self, connection: ConnectionSpec) -> Self {
        self.connections.push(connection);
        self
    }

    /// Load a patch from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let patch = Self::from_toml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            nodes = patch.nodes.len(),
            connections = patch.connections.len(),
            "loaded patch"
        );
        Ok(patch)
    }

    /// Parse a patch from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the patch to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Adds the patch's nodes to `tree` and its connections to
    /// `connections`. Returns the id assigned to each node name.
    ///
    /// Connection channel ranges must lie within [`MAX_NODE_CHANNELS`].
    /// Every connection goes through the table's loop check; the first
    /// rejected one aborts with [`ConfigError::Graph`]. Nodes and connections
    /// added before an error stay in place.
    pub fn instantiate(
        &self,
        tree: &mut NodeTree,
        connections: &mut ConnectionTable,
    ) -> Result<BTreeMap<String, NodeId>, ConfigError> {
        let mut ids = BTreeMap::new();
        for node in &self.nodes {
            if ids.contains_key(&node.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
            let parent = node
                .parent
                .as_ref()
                .map(|parent| lookup(&ids, parent))
                .transpose()?;
            let id = tree.add(parent, node.name.as_str(), node.node_kind()?)?;
            ids.insert(node.name.clone(), id);
        }

        for spec in &self.connections {
            spec.validate()?;
            let connection = Connection::new(
                lookup(&ids, &spec.from)?,
                spec.output,
                lookup(&ids, &spec.to)?,
                spec.input,
            )
            .with_channels(spec.channels);
            if !connections.connect(connection)? {
                tracing::debug!(from = %spec.from, to = %spec.to, "duplicate connection ignored");
            }
        }
        Ok(ids)
    }

    /// Builds an engine running this patch.
    pub fn engine(&self, config: Configuration) -> Result<AudioEngine, ConfigError> {
        let mut tree = NodeTree::new();
        let mut connections = ConnectionTable::new();
        self.instantiate(&mut tree, &mut connections)?;
        Ok(AudioEngine::with_scene(config, tree, connections))
    }
}

fn lookup(ids: &BTreeMap<String, NodeId>, name: &str) -> Result<NodeId, ConfigError> {
    ids.get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownNode(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatia_core::GraphError;

    const ORBIT: &str = r#"
        name = "orbit"

        [[node]]
        name = "mover"
        kind = "orbit"
        params = { radius = 2, speed = "500ms" }

        [[node]]
        name = "osc"
        kind = "sine"
        parent = "mover"
        params = { freq = "1kHz", amp = "-6dB" }

        [[node]]
        name = "out"
        kind = "output"

        [[connection]]
        from = "osc"
        to = "out"
    "#;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_quantity("0.5"), Some(0.5));
        assert_eq!(parse_quantity(" 50 % "), Some(0.5));
        assert_eq!(parse_quantity("100ms"), Some(0.1));
        assert_eq!(parse_quantity("1.5s"), Some(1.5));
        assert_eq!(parse_quantity("440hz"), Some(440.0));
        assert_eq!(parse_quantity("1.5kHz"), Some(1500.0));
        assert!((parse_quantity("-6dB").unwrap() - 0.501).abs() < 0.001);
        assert_eq!(parse_quantity("loud"), None);
        assert_eq!(parse_quantity("inf"), None);
        assert_eq!(parse_quantity("1000dB"), None);
        assert_eq!(parse_quantity("5µs"), None);
    }

    #[test]
    fn test_instantiate_builds_tree_and_connections() {
        let patch = Patch::from_toml_str(ORBIT).unwrap();
        assert_eq!(patch.name.as_deref(), Some("orbit"));
        assert_eq!(patch.connections[0].channels, 1);

        let mut tree = NodeTree::new();
        let mut table = ConnectionTable::new();
        let ids = patch.instantiate(&mut tree, &mut table).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.parent(ids["osc"]), Some(ids["mover"]));
        assert!(tree.get(ids["mover"]).unwrap().has_transform());
        assert!(table.is_connected(ids["osc"], ids["out"]));
    }

    #[test]
    fn test_unknown_kind_and_node() {
        let patch = Patch::new().with_node(NodeSpec::new("x", "reverb"));
        let err = patch
            .instantiate(&mut NodeTree::new(), &mut ConnectionTable::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNodeKind(kind) if kind == "reverb"));

        let patch = Patch::new()
            .with_node(NodeSpec::new("out", "output"))
            .with_connection(ConnectionSpec::new("ghost", "out"));
        let err = patch
            .instantiate(&mut NodeTree::new(), &mut ConnectionTable::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode(name) if name == "ghost"));
    }

    #[test]
    fn test_parent_must_be_declared_first() {
        let patch = Patch::new()
            .with_node(NodeSpec::new("child", "gain").with_parent("later"))
            .with_node(NodeSpec::new("later", "orbit"));
        let err = patch
            .instantiate(&mut NodeTree::new(), &mut ConnectionTable::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNode(_)));
    }

    #[test]
    fn test_cycle_in_patch_is_rejected() {
        let patch = Patch::new()
            .with_node(NodeSpec::new("a", "gain"))
            .with_node(NodeSpec::new("b", "gain"))
            .with_connection(ConnectionSpec::new("a", "b"))
            .with_connection(ConnectionSpec::new("b", "a"));
        let mut table = ConnectionTable::new();
        let err = patch.instantiate(&mut NodeTree::new(), &mut table).unwrap_err();
        assert!(matches!(err, ConfigError::Graph(GraphError::CycleDetected { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bad_params() {
        for node in [
            NodeSpec::new("g", "gain").with_param("drive", 1.0),
            NodeSpec::new("g", "gain").with_param("gain", "loud"),
            NodeSpec::new("c", "constant").with_param("channels", 1.5),
            NodeSpec::new("d", "distance_gain").with_param("reference", 0.0),
            NodeSpec::new("o", "output").with_param("gain", 1.0),
        ] {
            let err = node.node_kind().unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "{err}");
        }
    }

    #[test]
    fn test_connection_channel_range_bounded() {
        for spec in [
            ConnectionSpec::new("a", "b").with_channels(0, 100_000_000, 1),
            ConnectionSpec::new("a", "b").with_channels(usize::MAX, 0, 1),
            ConnectionSpec::new("a", "b").with_channels(0, 0, 0),
            ConnectionSpec::new("a", "b").with_channels(60, 0, 8),
        ] {
            assert!(matches!(spec.validate(), Err(ConfigError::Validation(_))), "{spec:?}");
        }
        assert!(ConnectionSpec::new("a", "b").with_channels(56, 0, 8).validate().is_ok());

        let patch = Patch::from_toml_str(
            r#"
            [[node]]
            name = "dc"
            kind = "constant"

            [[node]]
            name = "g"
            kind = "gain"

            [[connection]]
            from = "dc"
            to = "g"
            input = 100000000
            "#,
        )
        .unwrap();
        let mut table = ConnectionTable::new();
        let err = patch.instantiate(&mut NodeTree::new(), &mut table).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)), "{err}");
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let patch = Patch::new()
            .with_node(NodeSpec::new("a", "gain"))
            .with_node(NodeSpec::new("a", "sine"));
        let err = patch
            .instantiate(&mut NodeTree::new(), &mut ConnectionTable::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_toml_string_parses_back() {
        let patch = Patch::new()
            .with_node(NodeSpec::new("dc", "constant").with_param("channels", 2.0))
            .with_node(NodeSpec::new("out", "output"))
            .with_connection(ConnectionSpec::new("dc", "out").with_channels(0, 0, 2));
        let text = patch.to_toml_string().unwrap();
        assert!(text.contains("[[node]]"));
        assert!(text.contains("channels = 2"));
        assert_eq!(Patch::from_toml_str(&text).unwrap(), patch);
    }

    #[test]
    fn test_unknown_patch_fields_rejected() {
        let err = Patch::from_toml_str("[[node]]\nname = \"a\"\nkind = \"gain\"\ncolour = 1\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }
}
