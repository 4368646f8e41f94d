//! Input adapters building description trees.
//!
//! YAML and JSON documents go through `serde_yaml` / `serde_json` value
//! types and are then turned into [`Value`] nodes tagged with the file,
//! line and column they came from. The command line grammar is
//! `-a.b.c value`, which yields `{a: {b: {c: value}}}`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use log::debug;

use super::positions::{json_positions, yaml_positions, NodePath, Positions};
use super::{Origin, ScalarHint, Value};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error in {origin}: {source}")]
    Yaml {
        origin: Origin,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON parsing error in {origin}: {source}")]
    Json {
        origin: Origin,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported mapping key in {origin}")]
    UnsupportedKey { origin: Origin },

    #[error("Invalid command line argument: {0}")]
    InvalidArgument(String),

    #[error("Missing value for command line argument: {0}")]
    MissingValue(String),

    #[error("Failed to serialize description: {0}")]
    Serialize(String),
}

/// Parse a YAML document.
pub fn from_yaml_str(text: &str, origin: Origin) -> Result<Value, LoadError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(|source| LoadError::Yaml {
        origin: origin.clone(),
        source,
    })?;
    let positions = if is_file(&origin) { yaml_positions(text) } else { Positions::default() };
    from_yaml_value(doc, &mut Marks::new(&origin, positions), &origin)
}

/// Load a YAML file. Nodes are tagged with their position in the file.
pub fn from_yaml_file(path: &Path) -> Result<Value, LoadError> {
    let text = read(path)?;
    from_yaml_str(&text, Origin::file(&path.display().to_string()))
}

/// Parse a JSON document.
pub fn from_json_str(text: &str, origin: Origin) -> Result<Value, LoadError> {
    let doc: serde_json::Value = serde_json::from_str(text).map_err(|source| LoadError::Json {
        origin: origin.clone(),
        source,
    })?;
    let positions = if is_file(&origin) { json_positions(text) } else { Positions::default() };
    Ok(from_json_value(doc, &mut Marks::new(&origin, positions), &origin))
}

/// Load a JSON file. Nodes are tagged with their position in the file.
pub fn from_json_file(path: &Path) -> Result<Value, LoadError> {
    let text = read(path)?;
    from_json_str(&text, Origin::file(&path.display().to_string()))
}

/// Render a description as YAML.
pub fn to_yaml_string(value: &Value) -> Result<String, LoadError> {
    serde_yaml::to_string(value).map_err(|e| LoadError::Serialize(e.to_string()))
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn is_file(origin: &Origin) -> bool {
    matches!(origin, Origin::File { .. })
}

/// Tags nodes with their position while a document is walked.
struct Marks<'a> {
    file: &'a Origin,
    positions: Positions,
    path: NodePath,
}

impl<'a> Marks<'a> {
    fn new(file: &'a Origin, positions: Positions) -> Self {
        Marks {
            file,
            positions,
            path: Vec::new(),
        }
    }

    /// Origin of the current node, or of its parent when it was not indexed.
    fn origin(&self, parent: &Origin) -> Origin {
        match self.positions.get(&self.path) {
            Some((line, column)) => self.file.at(line, column),
            None => parent.clone(),
        }
    }
}

fn from_yaml_value(doc: serde_yaml::Value, marks: &mut Marks<'_>, parent: &Origin) -> Result<Value, LoadError> {
    use serde_yaml::Value as Yaml;

    let origin = marks.origin(parent);
    Ok(match doc {
        Yaml::Null => Value::Nil(origin),
        Yaml::Bool(b) => Value::scalar(b.to_string(), ScalarHint::Bool, origin),
        Yaml::Number(n) => {
            let hint = if n.is_f64() { ScalarHint::Float } else { ScalarHint::Int };
            Value::scalar(n.to_string(), hint, origin)
        }
        Yaml::String(s) => Value::scalar(s, ScalarHint::Str, origin),
        Yaml::Sequence(items) => {
            let mut children = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                marks.path.push(index.to_string());
                children.push(from_yaml_value(item, marks, &origin)?);
                marks.path.pop();
            }
            Value::vector(origin, children)
        }
        Yaml::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    _ => return Err(LoadError::UnsupportedKey { origin }),
                };
                marks.path.push(key.clone());
                let child = from_yaml_value(value, marks, &origin)?;
                marks.path.pop();
                entries.push((key, child));
            }
            Value::map(origin, entries)
        }
        Yaml::Tagged(tagged) => from_yaml_value(tagged.value, marks, parent)?,
    })
}

fn from_json_value(doc: serde_json::Value, marks: &mut Marks<'_>, parent: &Origin) -> Value {
    use serde_json::Value as Json;

    let origin = marks.origin(parent);
    match doc {
        Json::Null => Value::Nil(origin),
        Json::Bool(b) => Value::scalar(b.to_string(), ScalarHint::Bool, origin),
        Json::Number(n) => {
            let hint = if n.is_f64() { ScalarHint::Float } else { ScalarHint::Int };
            Value::scalar(n.to_string(), hint, origin)
        }
        Json::String(s) => Value::scalar(s, ScalarHint::Str, origin),
        Json::Array(items) => {
            let mut children = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                marks.path.push(index.to_string());
                children.push(from_json_value(item, marks, &origin));
                marks.path.pop();
            }
            Value::vector(origin, children)
        }
        Json::Object(object) => {
            let mut entries = Vec::with_capacity(object.len());
            for (key, value) in object {
                marks.path.push(key.clone());
                let child = from_json_value(value, marks, &origin);
                marks.path.pop();
                entries.push((key, child));
            }
            Value::map(origin, entries)
        }
    }
}

/// Command line tree under construction.
enum Draft {
    Map(BTreeMap<String, Draft>),
    Scalar(String),
}

impl Draft {
    fn into_value(self) -> Value {
        match self {
            Draft::Map(children) => Value::map(
                Origin::Cmdline,
                children.into_iter().map(|(k, v)| (k, v.into_value())),
            ),
            Draft::Scalar(raw) => Value::scalar(raw, ScalarHint::Str, Origin::Cmdline),
        }
    }
}

/// Walk `path` from `root`, creating intermediate maps, and return the
/// terminal scalar slot.
fn slot<'a>(root: &'a mut Draft, path: &[&str], arg: &str) -> Result<&'a mut String, LoadError> {
    let conflict = || LoadError::InvalidArgument(arg.to_string());

    let mut node = root;
    for key in path {
        node = match node {
            Draft::Map(children) => children
                .entry(key.to_string())
                .or_insert_with(|| Draft::Map(BTreeMap::new())),
            Draft::Scalar(_) => return Err(conflict()),
        };
    }

    let fresh = matches!(node, Draft::Map(children) if children.is_empty());
    if fresh {
        *node = Draft::Scalar(String::new());
    }
    match node {
        Draft::Scalar(raw) => Ok(raw),
        Draft::Map(_) => Err(conflict()),
    }
}

/// Build a description from command line arguments.
///
/// Each `-a.b.c` argument is followed by its value, except for the paths
/// listed in `unary` which take the value `true`. When a path repeats, the
/// last value wins. An empty argument list yields `Nil`.
///
/// # Examples
/// ```
/// use std::collections::BTreeSet;
/// use vplatform::description::loader::from_cmdline;
///
/// let descr = from_cmdline(["-global.selected-platform", "foo"], &BTreeSet::new()).unwrap();
/// assert_eq!(descr.get_path("global.selected-platform").raw(), Some("foo"));
/// ```
pub fn from_cmdline<I, S>(args: I, unary: &BTreeSet<String>) -> Result<Value, LoadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut root = Draft::Map(BTreeMap::new());
    let mut pending: Option<String> = None;
    let mut empty = true;

    for arg in args {
        let arg = arg.as_ref();

        if let Some(flag) = pending.take() {
            let path: Vec<&str> = flag.split('.').collect();
            *slot(&mut root, &path, &flag)? = arg.to_string();
            continue;
        }

        let flag = arg
            .strip_prefix('-')
            .filter(|f| !f.is_empty())
            .ok_or_else(|| LoadError::InvalidArgument(arg.to_string()))?;
        let path: Vec<&str> = flag.split('.').collect();
        if path.iter().any(|key| key.is_empty()) {
            return Err(LoadError::InvalidArgument(arg.to_string()));
        }

        let raw = slot(&mut root, &path, arg)?;
        empty = false;
        if unary.contains(flag) {
            *raw = "true".to_string();
        } else {
            pending = Some(flag.to_string());
        }
    }

    if let Some(flag) = pending {
        return Err(LoadError::MissingValue(flag));
    }
    if empty {
        debug!("Empty command line description");
        return Ok(Value::Nil(Origin::Cmdline));
    }
    Ok(root.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_unary() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
platforms:
  foo:
    description: "Foo"
    components:
      mem:
        type: memory
        size: 4K
list: [1, 2.5, true, ~]
"#;
        let descr = from_yaml_str(yaml, Origin::Unknown).unwrap();

        assert_eq!(descr.get_path("platforms.foo.description").raw(), Some("Foo"));
        assert_eq!(
            descr.get_path("platforms.foo.components.mem.size").parse::<u32>(),
            Ok(4096)
        );
        let list = descr.get("list");
        assert_eq!(list.size(), 4);
        assert_eq!(list.get_index(1).parse::<f64>(), Ok(2.5));
        assert_eq!(list.get_index(2).parse::<bool>(), Ok(true));
        assert!(list.get_index(3).is_nil());
    }

    #[test]
    fn test_yaml_numeric_keys() {
        let descr = from_yaml_str("0x1000: 256\n", Origin::Unknown).unwrap();
        let range = descr.parse::<crate::description::AddressRange>().unwrap();
        assert_eq!(range.begin(), 0x1000);
        assert_eq!(range.end(), 0x10ff);
    }

    #[test]
    fn test_yaml_syntax_error() {
        let err = from_yaml_str("a: [1, 2", Origin::Unknown).unwrap_err();
        assert!(matches!(err, LoadError::Yaml { .. }));
    }

    #[test]
    fn test_yaml_file_origin() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a:\n  b: 1\n  c: [x, y]").unwrap();
        let path = file.path().display().to_string();

        let descr = from_yaml_file(file.path()).unwrap();
        assert_eq!(descr.get_path("a.b").origin().to_string(), format!("{}:2:6", path));
        assert_eq!(descr.get("a").origin(), Origin::file_at(&path, 2, 3));
        // Flow items share the position of their collection.
        assert_eq!(descr.get_path("a.c").get_index(1).origin(), Origin::file_at(&path, 3, 6));
    }

    #[test]
    fn test_json_file_origin() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{\n  \"a\": {{\"b\": 1}}\n}}").unwrap();
        let path = file.path().display().to_string();

        let descr = from_json_file(file.path()).unwrap();
        assert_eq!(descr.get_path("a.b").origin(), Origin::file_at(&path, 2, 14));
    }

    #[test]
    fn test_string_documents_have_no_position() {
        let descr = from_yaml_str("a:\n  b: 1\n", Origin::Unknown).unwrap();
        assert_eq!(descr.get_path("a.b").origin(), Origin::Unknown);
    }

    #[test]
    fn test_missing_file() {
        let err = from_yaml_file(Path::new("/nonexistent/platform.yml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_json_document() {
        let descr = from_json_str(
            r#"{"a": {"b": 1, "c": [true, "x"]}, "n": null}"#,
            Origin::Unknown,
        )
        .unwrap();

        assert_eq!(descr.get_path("a.b").parse::<u8>(), Ok(1));
        assert_eq!(descr.get_path("a.c").get_index(1).raw(), Some("x"));
        assert!(descr.get("n").is_nil());
    }

    #[test]
    fn test_cmdline_nested_paths() {
        let descr = from_cmdline(["-a.b.c", "1", "-a.d", "2"], &no_unary()).unwrap();

        assert_eq!(descr.get_path("a.b.c").raw(), Some("1"));
        assert_eq!(descr.get_path("a.d").raw(), Some("2"));
        assert_eq!(descr.get_path("a.d").origin(), Origin::Cmdline);
    }

    #[test]
    fn test_cmdline_unary_and_repeat() {
        let unary: BTreeSet<String> = ["debug".to_string()].into_iter().collect();
        let descr = from_cmdline(["-debug", "-x", "1", "-x", "2"], &unary).unwrap();

        assert_eq!(descr.get("debug").parse::<bool>(), Ok(true));
        assert_eq!(descr.get("x").raw(), Some("2"));
    }

    #[test]
    fn test_cmdline_errors() {
        assert!(matches!(
            from_cmdline(["value"], &no_unary()),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            from_cmdline(["-a"], &no_unary()),
            Err(LoadError::MissingValue(_))
        ));
        assert!(matches!(
            from_cmdline(["-a", "1", "-a.b", "2"], &no_unary()),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            from_cmdline(["-a.b", "1", "-a", "2"], &no_unary()),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            from_cmdline(["-a..b", "1"], &no_unary()),
            Err(LoadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_cmdline_empty() {
        let descr = from_cmdline(Vec::<String>::new(), &no_unary()).unwrap();
        assert!(descr.is_nil());
    }

    #[test]
    fn test_dump_round_trip() {
        let descr = from_yaml_str("a: 1\nb: [x, true]\nc: 2.5\n", Origin::Unknown).unwrap();
        let text = to_yaml_string(&descr).unwrap();
        let again = from_yaml_str(&text, Origin::Unknown).unwrap();
        assert_eq!(again, descr);
    }
}
