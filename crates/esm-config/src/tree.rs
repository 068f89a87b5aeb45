//! Config trees and dotted path expressions.
//!
//! A [`ConfigNode`] is a scalar, a sequence of nodes, or a string-keyed
//! mapping of nodes, the shape of any YAML document without anchors or tags.
//! [`ConfigPath`] addresses a node with dot-separated segments:
//!
//! - a literal key selects a mapping entry,
//! - a base-10 non-negative integer selects a sequence element,
//! - `x` appends to a sequence (writes only).
//!
//! Reads never create nodes. Writes create missing intermediate containers,
//! choosing a sequence when the next segment is `x` and a mapping otherwise.
//!
//! Mappings keep the order their keys were read or inserted in, so saving
//! keeps the file's key order. Scalar mapping keys (`8080: web`,
//! `true: yes`) are read as their text.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Entries of a mapping node, in document order.
pub type Mapping = IndexMap<String, ConfigNode>;

/// Label used for the root node in error messages.
const ROOT_LABEL: &str = "[root]";

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Unsigned(u) => write!(f, "{u}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// A node of a config tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigNode {
    Sequence(Vec<ConfigNode>),
    Mapping(Mapping),
    Scalar(Scalar),
}

impl<'de> Deserialize<'de> for ConfigNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = ConfigNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, a sequence or a mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<ConfigNode, E> {
        Ok(ConfigNode::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<ConfigNode, E> {
        Ok(ConfigNode::default())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ConfigNode, D::Error> {
        ConfigNode::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Bool(b)))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Integer(i)))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(match i64::try_from(u) {
            Ok(i) => Scalar::Integer(i),
            Err(_) => Scalar::Unsigned(u),
        }))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Scalar(Scalar::Float(x)))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<ConfigNode, E> {
        Ok(ConfigNode::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<ConfigNode, E> {
        Ok(ConfigNode::from(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ConfigNode, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConfigNode::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ConfigNode, A::Error> {
        let mut entries = Mapping::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((MapKey(key), value)) = map.next_entry()? {
            entries.insert(key, value);
        }
        Ok(ConfigNode::Mapping(entries))
    }
}

/// A mapping key, read from any scalar.
struct MapKey(String);

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapKeyVisitor)
    }
}

struct MapKeyVisitor;

impl<'de> Visitor<'de> for MapKeyVisitor {
    type Value = MapKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar mapping key")
    }

    fn visit_unit<E: de::Error>(self) -> Result<MapKey, E> {
        Ok(MapKey(Scalar::Null.to_string()))
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<MapKey, E> {
        Ok(MapKey(b.to_string()))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<MapKey, E> {
        Ok(MapKey(i.to_string()))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<MapKey, E> {
        Ok(MapKey(u.to_string()))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<MapKey, E> {
        Ok(MapKey(x.to_string()))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<MapKey, E> {
        Ok(MapKey(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<MapKey, E> {
        Ok(MapKey(s))
    }
}

impl Default for ConfigNode {
    fn default() -> Self {
        ConfigNode::Scalar(Scalar::Null)
    }
}

/// Structural errors raised while walking a tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error(
        "cannot resolve '{path}': '{segment}' is not a valid index for the sequence '{parent}', \
         use a numeric index ('x' appends when writing)"
    )]
    NotAnIndex {
        path: String,
        segment: String,
        parent: String,
    },

    #[error(
        "cannot resolve '{path}': index '{segment}' is out of bounds for the sequence '{parent}' \
         with a length of {len}"
    )]
    IndexOutOfBounds {
        path: String,
        segment: String,
        parent: String,
        len: usize,
    },

    #[error("cannot resolve '{path}': the mapping '{parent}' has no key '{key}'")]
    MissingKey {
        path: String,
        key: String,
        parent: String,
    },

    #[error(
        "cannot resolve '{path}': '{parent}' is a scalar and cannot be accessed using the key '{segment}'"
    )]
    ScalarDescent {
        path: String,
        segment: String,
        parent: String,
    },
}

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    raw: String,
    segments: Vec<String>,
}

impl ConfigPath {
    /// Segment that appends to a sequence.
    pub const APPEND: &'static str = "x";

    /// Split a path on `.`. Every string is a valid path.
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw.split('.').map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ConfigPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ConfigPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// How a segment addresses a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Index(usize),
    Append,
    Invalid,
}

fn position(segment: &str) -> Position {
    if segment == ConfigPath::APPEND {
        return Position::Append;
    }
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Position::Invalid;
    }
    // Digit strings too large for usize can never be in bounds.
    Position::Index(segment.parse().unwrap_or(usize::MAX))
}

/// Container to create in place of a missing node followed by `next`.
fn container_for(next: &str) -> ConfigNode {
    if next == ConfigPath::APPEND {
        ConfigNode::Sequence(Vec::new())
    } else {
        ConfigNode::Mapping(Mapping::new())
    }
}

impl ConfigNode {
    /// An empty mapping.
    pub fn mapping() -> Self {
        ConfigNode::Mapping(Mapping::new())
    }

    /// An empty sequence.
    pub fn sequence() -> Self {
        ConfigNode::Sequence(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigNode::Scalar(Scalar::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Text of a non-null scalar, e.g. a version written as `1.2` or `"1.2.0"`.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            ConfigNode::Scalar(Scalar::Null) => None,
            ConfigNode::Scalar(scalar) => Some(scalar.to_string()),
            _ => None,
        }
    }

    /// Resolve `path` below this node.
    pub fn get(&self, path: &ConfigPath) -> Result<&ConfigNode, TreeError> {
        let mut node = self;
        let mut parent = ROOT_LABEL;

        for segment in path.segments() {
            node = match node {
                ConfigNode::Sequence(items) => match position(segment) {
                    Position::Index(index) => {
                        items
                            .get(index)
                            .ok_or_else(|| TreeError::IndexOutOfBounds {
                                path: path.to_string(),
                                segment: segment.to_string(),
                                parent: parent.to_string(),
                                len: items.len(),
                            })?
                    }
                    Position::Append | Position::Invalid => {
                        return Err(TreeError::NotAnIndex {
                            path: path.to_string(),
                            segment: segment.to_string(),
                            parent: parent.to_string(),
                        });
                    }
                },
                ConfigNode::Mapping(map) => {
                    map.get(segment).ok_or_else(|| TreeError::MissingKey {
                        path: path.to_string(),
                        key: segment.to_string(),
                        parent: parent.to_string(),
                    })?
                }
                ConfigNode::Scalar(_) => {
                    return Err(TreeError::ScalarDescent {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        parent: parent.to_string(),
                    });
                }
            };
            parent = segment;
        }

        Ok(node)
    }

    /// Write `value` at `path`, creating missing intermediate containers.
    ///
    /// A null node counts as missing. Sequences only grow through `x`.
    pub fn set(&mut self, path: &ConfigPath, value: ConfigNode) -> Result<(), TreeError> {
        let segments: Vec<&str> = path.segments().collect();
        let Some((last, intermediate)) = segments.split_last() else {
            *self = value;
            return Ok(());
        };

        if self.is_null() {
            *self = container_for(segments[0]);
        }

        let mut node = self;
        let mut parent = ROOT_LABEL;
        for (i, segment) in intermediate.iter().enumerate() {
            node = node.child_for_write(path, parent, segment, segments[i + 1])?;
            parent = segment;
        }

        node.assign(path, parent, last, value)
    }

    fn child_for_write(
        &mut self,
        path: &ConfigPath,
        parent: &str,
        segment: &str,
        next: &str,
    ) -> Result<&mut ConfigNode, TreeError> {
        let child = match self {
            ConfigNode::Sequence(items) => match position(segment) {
                Position::Append => {
                    items.push(container_for(next));
                    let last = items.len() - 1;
                    &mut items[last]
                }
                Position::Index(index) => {
                    let len = items.len();
                    items
                        .get_mut(index)
                        .ok_or_else(|| TreeError::IndexOutOfBounds {
                            path: path.to_string(),
                            segment: segment.to_string(),
                            parent: parent.to_string(),
                            len,
                        })?
                }
                Position::Invalid => {
                    return Err(TreeError::NotAnIndex {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        parent: parent.to_string(),
                    });
                }
            },
            ConfigNode::Mapping(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| container_for(next)),
            ConfigNode::Scalar(_) => {
                return Err(TreeError::ScalarDescent {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    parent: parent.to_string(),
                });
            }
        };

        if child.is_null() {
            *child = container_for(next);
        }
        Ok(child)
    }

    fn assign(
        &mut self,
        path: &ConfigPath,
        parent: &str,
        segment: &str,
        value: ConfigNode,
    ) -> Result<(), TreeError> {
        match self {
            ConfigNode::Sequence(items) => match position(segment) {
                Position::Append => {
                    items.push(value);
                    Ok(())
                }
                Position::Index(index) => {
                    let len = items.len();
                    let slot = items
                        .get_mut(index)
                        .ok_or_else(|| TreeError::IndexOutOfBounds {
                            path: path.to_string(),
                            segment: segment.to_string(),
                            parent: parent.to_string(),
                            len,
                        })?;
                    *slot = value;
                    Ok(())
                }
                Position::Invalid => Err(TreeError::NotAnIndex {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    parent: parent.to_string(),
                }),
            },
            ConfigNode::Mapping(map) => {
                map.insert(segment.to_string(), value);
                Ok(())
            }
            ConfigNode::Scalar(_) => Err(TreeError::ScalarDescent {
                path: path.to_string(),
                segment: segment.to_string(),
                parent: parent.to_string(),
            }),
        }
    }
}

impl From<Scalar> for ConfigNode {
    fn from(scalar: Scalar) -> Self {
        ConfigNode::Scalar(scalar)
    }
}

impl From<&str> for ConfigNode {
    fn from(s: &str) -> Self {
        ConfigNode::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for ConfigNode {
    fn from(s: String) -> Self {
        ConfigNode::Scalar(Scalar::String(s))
    }
}

impl From<bool> for ConfigNode {
    fn from(b: bool) -> Self {
        ConfigNode::Scalar(Scalar::Bool(b))
    }
}

impl From<i64> for ConfigNode {
    fn from(i: i64) -> Self {
        ConfigNode::Scalar(Scalar::Integer(i))
    }
}

impl From<i32> for ConfigNode {
    fn from(i: i32) -> Self {
        ConfigNode::Scalar(Scalar::Integer(i64::from(i)))
    }
}

impl From<f64> for ConfigNode {
    fn from(x: f64) -> Self {
        ConfigNode::Scalar(Scalar::Float(x))
    }
}

impl From<Vec<ConfigNode>> for ConfigNode {
    fn from(items: Vec<ConfigNode>) -> Self {
        ConfigNode::Sequence(items)
    }
}

impl From<u64> for ConfigNode {
    fn from(u: u64) -> Self {
        ConfigNode::Scalar(match i64::try_from(u) {
            Ok(i) => Scalar::Integer(i),
            Err(_) => Scalar::Unsigned(u),
        })
    }
}

impl From<Mapping> for ConfigNode {
    fn from(map: Mapping) -> Self {
        ConfigNode::Mapping(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> ConfigNode {
        serde_json::from_value(value).unwrap()
    }

    fn path(s: &str) -> ConfigPath {
        ConfigPath::parse(s)
    }

    #[test]
    fn test_get_walks_mappings_and_sequences() {
        let root = tree(json!({"a": {"b": [1, 2, 3]}}));
        assert_eq!(root.get(&path("a.b.1")).unwrap(), &ConfigNode::from(2));
        assert_eq!(
            root.get(&path("a.b")).unwrap(),
            &tree(json!([1, 2, 3]))
        );
    }

    #[test]
    fn test_get_out_of_bounds() {
        let root = tree(json!({"a": {"b": [1, 2, 3]}}));
        let err = root.get(&path("a.b.3")).unwrap_err();
        assert_eq!(
            err,
            TreeError::IndexOutOfBounds {
                path: "a.b.3".to_string(),
                segment: "3".to_string(),
                parent: "b".to_string(),
                len: 3,
            }
        );
    }

    #[test]
    fn test_get_missing_key() {
        let root = tree(json!({"a": {"b": [1, 2, 3]}}));
        let err = root.get(&path("a.c")).unwrap_err();
        assert!(matches!(err, TreeError::MissingKey { ref key, .. } if key == "c"));
        assert!(err.to_string().contains("a.c"));
    }

    #[test]
    fn test_get_non_numeric_sequence_segment() {
        let root = tree(json!({"list": ["a"]}));
        for segment in ["first", "x", "-1", "+0", ""] {
            let err = root.get(&path(&format!("list.{segment}"))).unwrap_err();
            assert!(
                matches!(err, TreeError::NotAnIndex { .. }),
                "segment {segment:?} should not be an index"
            );
        }
    }

    #[test]
    fn test_get_cannot_descend_into_scalar() {
        let root = tree(json!({"name": "lodash"}));
        let err = root.get(&path("name.first")).unwrap_err();
        assert_eq!(
            err,
            TreeError::ScalarDescent {
                path: "name.first".to_string(),
                segment: "first".to_string(),
                parent: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_get_huge_index_is_out_of_bounds() {
        let root = tree(json!([1]));
        let err = root
            .get(&path("99999999999999999999999999"))
            .unwrap_err();
        assert!(matches!(err, TreeError::IndexOutOfBounds { len: 1, .. }));
    }

    #[test]
    fn test_set_appends_with_sentinel() {
        let mut root = tree(json!({"a": {"b": [1, 2]}}));
        root.set(&path("a.b.x"), ConfigNode::from(9)).unwrap();
        assert_eq!(root, tree(json!({"a": {"b": [1, 2, 9]}})));
    }

    #[test]
    fn test_set_creates_mappings() {
        let mut root = ConfigNode::mapping();
        root.set(&path("x.y"), ConfigNode::from(1)).unwrap();
        assert_eq!(root, tree(json!({"x": {"y": 1}})));
    }

    #[test]
    fn test_set_creates_sequence_when_next_segment_appends() {
        let mut root = ConfigNode::mapping();
        root.set(&path("npm.x"), ConfigNode::from("lodash")).unwrap();
        root.set(&path("npm.x"), ConfigNode::from("chalk")).unwrap();
        assert_eq!(root, tree(json!({"npm": ["lodash", "chalk"]})));
    }

    #[test]
    fn test_set_append_intermediate_container() {
        let mut root = tree(json!({"deps": []}));
        root.set(&path("deps.x.name"), ConfigNode::from("a")).unwrap();
        root.set(&path("deps.x.x"), ConfigNode::from(1)).unwrap();
        assert_eq!(root, tree(json!({"deps": [{"name": "a"}, [1]]})));
    }

    #[test]
    fn test_set_keeps_existing_siblings() {
        let mut root = tree(json!({"commands": {"test": "mocha"}}));
        root.set(&path("commands.build"), ConfigNode::from("tsc"))
            .unwrap();
        assert_eq!(
            root,
            tree(json!({"commands": {"test": "mocha", "build": "tsc"}}))
        );
    }

    #[test]
    fn test_set_replaces_indexed_element() {
        let mut root = tree(json!([1, 2, 3]));
        root.set(&path("1"), ConfigNode::from("two")).unwrap();
        assert_eq!(root, tree(json!([1, "two", 3])));
    }

    #[test]
    fn test_set_rejects_sparse_growth() {
        let mut root = tree(json!({"a": [1, 2]}));
        let err = root.set(&path("a.2"), ConfigNode::from(3)).unwrap_err();
        assert!(matches!(err, TreeError::IndexOutOfBounds { len: 2, .. }));

        let err = root.set(&path("a.5.b"), ConfigNode::from(3)).unwrap_err();
        assert!(matches!(err, TreeError::IndexOutOfBounds { .. }));
        assert_eq!(root, tree(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_set_rejects_descending_into_scalar() {
        let mut root = tree(json!({"version": "1.0.0"}));
        let err = root
            .set(&path("version.major"), ConfigNode::from(1))
            .unwrap_err();
        assert!(matches!(err, TreeError::ScalarDescent { .. }));
    }

    #[test]
    fn test_set_fills_null_nodes() {
        let mut root = ConfigNode::default();
        root.set(&path("commands.test"), ConfigNode::from("mocha"))
            .unwrap();
        assert_eq!(root, tree(json!({"commands": {"test": "mocha"}})));

        let mut root = tree(json!({"npm": null}));
        root.set(&path("npm.x"), ConfigNode::from("lodash")).unwrap();
        assert_eq!(root, tree(json!({"npm": ["lodash"]})));
    }

    #[test]
    fn test_set_then_get() {
        let mut root = ConfigNode::mapping();
        root.set(&path("a.b.x"), ConfigNode::from(true)).unwrap();
        assert_eq!(root.get(&path("a.b.0")).unwrap(), &ConfigNode::from(true));
    }

    #[test]
    fn test_yaml_round_trip() {
        let original = tree(json!({
            "name": "resolver",
            "organization": "distributed-systems",
            "version": "1.0.0",
            "private": false,
            "weight": 0.5,
            "revision": 12,
            "license": null,
            "npm": ["lodash", "chalk"],
            "commands": {"test": "node --experimental-modules test.mjs"},
            "matrix": [[1, 2], [], {"nested": {"deeper": ["x"]}}],
        }));

        let text = serde_yaml::to_string(&original).unwrap();
        let parsed: ConfigNode = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_yaml_keeps_mapping_order() {
        let text = "version: 1.0.0\nname: resolver\norganization: tools\n";
        let mut root: ConfigNode = serde_yaml::from_str(text).unwrap();
        root.set(&path("version"), ConfigNode::from("1.0.1")).unwrap();
        root.set(&path("commands.build"), ConfigNode::from("tsc")).unwrap();

        let keys: Vec<&str> = root.as_mapping().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["version", "name", "organization", "commands"]);
        assert_eq!(
            serde_yaml::to_string(&root).unwrap(),
            "version: 1.0.1\nname: resolver\norganization: tools\ncommands:\n  build: tsc\n"
        );
    }

    #[test]
    fn test_yaml_scalar_keys_become_text() {
        let root: ConfigNode =
            serde_yaml::from_str("ports:\n  8080: web\n  443: tls\ntrue: yes\n1.5: half\n").unwrap();
        assert_eq!(root.get(&path("ports.8080")).unwrap(), &ConfigNode::from("web"));
        assert_eq!(root.get(&path("ports.443")).unwrap(), &ConfigNode::from("tls"));
        assert_eq!(root.get(&path("true")).unwrap(), &ConfigNode::from("yes"));
        assert!(root.as_mapping().unwrap().contains_key("1.5"));
    }

    #[test]
    fn test_large_unsigned_integers_survive() {
        let root: ConfigNode = serde_yaml::from_str("id: 18446744073709551615\n").unwrap();
        assert_eq!(
            root.get(&path("id")).unwrap(),
            &ConfigNode::Scalar(Scalar::Unsigned(u64::MAX))
        );
        assert_eq!(
            serde_yaml::to_string(&root).unwrap(),
            "id: 18446744073709551615\n"
        );
        assert_eq!(ConfigNode::from(12_u64), ConfigNode::from(12));
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(ConfigNode::from("1.0.0").scalar_text().as_deref(), Some("1.0.0"));
        assert_eq!(ConfigNode::from(2).scalar_text().as_deref(), Some("2"));
        assert_eq!(ConfigNode::default().scalar_text(), None);
        assert_eq!(ConfigNode::mapping().scalar_text(), None);
    }
}
