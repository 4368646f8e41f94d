//! Layered configuration.
//!
//! The [`ConfigManager`] gathers the description trees coming from the
//! command line and from configuration files, and computes the
//! description of a platform out of them. The layers are merged with the
//! left side winning:
//!
//! ```text
//! cmdline.merge(files).merge(platform)
//! ```
//!
//! Among files, a file added later overrides the files added before it.
//! A root `config:` key names further files to load, relative to the file
//! declaring it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::description::{loader, LoadError, Origin, Value};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to read directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid type for `{field}`. Expected `{expected}` at {origin}")]
    InvalidField {
        field: String,
        expected: &'static str,
        origin: Origin,
    },

    #[error("Platform `{0}` not found")]
    UnknownPlatform(String),

    #[error("Platform `{0}` is generic and cannot be selected")]
    GenericPlatform(String),

    #[error("Platform `{name}` inherits unknown platform `{parent}` at {origin}")]
    UnknownParentPlatform {
        name: String,
        parent: String,
        origin: Origin,
    },

    #[error("Platform `{0}` inherits from itself")]
    InheritanceCycle(String),

    #[error("No platform selected; available platforms: {0}")]
    NoPlatformSelected(String),
}

/// Parameters of the root `global:` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalParams {
    pub selected_platform: Option<String>,
    pub config_dir: Option<String>,
}

/// What a listing shows of a platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformSummary {
    pub name: String,
    pub description: String,
    pub generic: bool,
}

/// Owner of the layered description.
#[derive(Debug)]
pub struct ConfigManager {
    cmdline: Value,
    files: Value,
    loaded: BTreeSet<PathBuf>,
    unary: BTreeSet<String>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self {
            cmdline: Value::Nil(Origin::Cmdline),
            files: Value::nil(),
            loaded: BTreeSet::new(),
            unary: BTreeSet::new(),
        }
    }
}

fn string_field(node: &Value, field: &str) -> Result<Option<String>, ConfigError> {
    if node.is_nil() || node.is_invalid() {
        return Ok(None);
    }
    node.parse::<String>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidField {
            field: field.to_string(),
            expected: "string",
            origin: node.origin(),
        })
}

fn bool_field(node: &Value, field: &str) -> Result<bool, ConfigError> {
    if node.is_nil() || node.is_invalid() {
        return Ok(false);
    }
    node.parse::<bool>().map_err(|_| ConfigError::InvalidField {
        field: field.to_string(),
        expected: "bool",
        origin: node.origin(),
    })
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `key` on the command line without a value.
    pub fn add_unary_key(&mut self, key: &str) {
        self.unary.insert(key.to_string());
    }

    /// Add description overrides in the `-a.b.c value` grammar. Later
    /// arguments override earlier ones.
    pub fn add_cmdline<I, S>(&mut self, args: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tree = loader::from_cmdline(args, &self.unary)?;
        self.load_included(&tree, None)?;
        self.cmdline = tree.merge(&self.cmdline);
        Ok(())
    }

    pub fn add_yaml(&mut self, text: &str) -> Result<(), ConfigError> {
        let tree = loader::from_yaml_str(text, Origin::Unknown)?;
        self.add_tree(tree, None)
    }

    pub fn add_json(&mut self, text: &str) -> Result<(), ConfigError> {
        let tree = loader::from_json_str(text, Origin::Unknown)?;
        self.add_tree(tree, None)
    }

    /// Load a configuration file.
    ///
    /// # Arguments
    /// * `path` - A `.yml`, `.yaml` or `.json` file
    ///
    /// # Returns
    /// * `Ok(true)` - The file was loaded
    /// * `Ok(false)` - The file was already loaded or has another extension
    /// * `Err(ConfigError)` - The file could not be read or parsed
    pub fn add_config_file(&mut self, path: &Path) -> Result<bool, ConfigError> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.loaded.contains(&key) {
            debug!("Configuration file {} already loaded", path.display());
            return Ok(false);
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let tree = match extension {
            "yml" | "yaml" => loader::from_yaml_file(path)?,
            "json" => loader::from_json_file(path)?,
            _ => {
                debug!("Ignoring {}: not a configuration file", path.display());
                return Ok(false);
            }
        };

        info!("Loading configuration from {}", path.display());
        self.loaded.insert(key);
        self.add_tree(tree, path.parent())?;
        Ok(true)
    }

    /// Load every configuration file under `dir`, recursively, in path
    /// order. Returns the number of files loaded.
    pub fn add_config_dir(&mut self, dir: &Path) -> Result<usize, ConfigError> {
        let read_error = |source| ConfigError::Directory {
            path: dir.display().to_string(),
            source,
        };
        let mut paths = fs::read_dir(dir)
            .map_err(read_error)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        paths.sort();

        let mut count = 0;
        for path in paths {
            if path.is_dir() {
                count += self.add_config_dir(&path)?;
            } else if self.add_config_file(&path)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Files named by the `config:` key of `tree` are loaded before the
    /// tree itself is merged, so the tree overrides them.
    fn add_tree(&mut self, tree: Value, base: Option<&Path>) -> Result<(), ConfigError> {
        self.load_included(&tree, base)?;
        self.files = tree.merge(&self.files);
        Ok(())
    }

    fn load_included(&mut self, tree: &Value, base: Option<&Path>) -> Result<(), ConfigError> {
        let node = tree.get("config");
        let names = match &node {
            Value::Nil(_) | Value::Invalid => return Ok(()),
            Value::Scalar(_) => vec![node.clone()],
            Value::Map(_) => node.keys().map(|k| node.get(k)).collect(),
            Value::Vector(_) => (0..node.size()).map(|i| node.get_index(i)).collect(),
        };

        for name in names {
            let file = string_field(&name, "config")?.unwrap_or_default();
            let path = match base {
                Some(base) if Path::new(&file).is_relative() => base.join(&file),
                _ => PathBuf::from(&file),
            };
            debug!("{} includes {}", name.origin(), path.display());
            self.add_config_file(&path)?;
        }
        Ok(())
    }

    /// Files loaded so far.
    pub fn loaded_files(&self) -> impl Iterator<Item = &Path> {
        self.loaded.iter().map(PathBuf::as_path)
    }

    /// The command line merged over the files.
    pub fn root(&self) -> Value {
        self.cmdline.merge(&self.files)
    }

    pub fn global_params(&self) -> Result<GlobalParams, ConfigError> {
        let global = self.root().get("global");
        Ok(GlobalParams {
            selected_platform: string_field(&global.get("selected-platform"), "selected-platform")?,
            config_dir: string_field(&global.get("config-dir"), "config-dir")?,
        })
    }

    /// Every platform, with inheritance applied.
    pub fn platforms(&self) -> Result<BTreeMap<String, Value>, ConfigError> {
        let platforms = self.root().get("platforms");
        let mut resolved = BTreeMap::new();
        for name in platforms.keys() {
            let descr = resolve(name, &platforms, &mut Vec::new())?;
            resolved.insert(name.to_string(), descr);
        }
        Ok(resolved)
    }

    pub fn list_platforms(&self) -> Result<Vec<PlatformSummary>, ConfigError> {
        self.platforms()?
            .into_iter()
            .map(|(name, descr)| {
                Ok(PlatformSummary {
                    description: string_field(&descr.get("description"), "description")?
                        .unwrap_or_default(),
                    generic: bool_field(&descr.get("generic"), "generic")?,
                    name,
                })
            })
            .collect()
    }

    /// Pick the platform to build: `requested` if any, then the
    /// `global.selected-platform` parameter, then the only selectable
    /// platform.
    pub fn select_platform(&self, requested: Option<&str>) -> Result<String, ConfigError> {
        if let Some(name) = requested {
            return Ok(name.to_string());
        }
        if let Some(name) = self.global_params()?.selected_platform {
            return Ok(name);
        }

        let selectable: Vec<String> = self
            .list_platforms()?
            .into_iter()
            .filter(|p| !p.generic)
            .map(|p| p.name)
            .collect();
        match selectable.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(ConfigError::NoPlatformSelected(selectable.join(", "))),
        }
    }

    /// The full description of platform `name`: the command line over the
    /// files over the platform.
    pub fn apply_platform(&self, name: &str) -> Result<Value, ConfigError> {
        let platforms = self.root().get("platforms");
        if !platforms.exists(name) {
            return Err(ConfigError::UnknownPlatform(name.to_string()));
        }
        let platform = resolve(name, &platforms, &mut Vec::new())?;
        if bool_field(&platform.get("generic"), "generic")? {
            return Err(ConfigError::GenericPlatform(name.to_string()));
        }
        debug!("Applying platform `{}`", name);
        Ok(self.root().merge(&platform))
    }
}

/// Description of platform `name` merged over the platforms it inherits.
fn resolve(name: &str, platforms: &Value, chain: &mut Vec<String>) -> Result<Value, ConfigError> {
    let descr = platforms.get(name);
    let inherit = descr.get("inherit");
    let parent = match string_field(&inherit, "inherit")? {
        Some(parent) if !parent.is_empty() => parent,
        _ => return Ok(descr),
    };

    chain.push(name.to_string());
    if chain.contains(&parent) {
        return Err(ConfigError::InheritanceCycle(parent));
    }
    if !platforms.exists(&parent) {
        return Err(ConfigError::UnknownParentPlatform {
            name: name.to_string(),
            parent,
            origin: inherit.origin(),
        });
    }

    let base = resolve(&parent, platforms, chain)?;
    debug!("Platform `{}` inherits `{}`", name, parent);
    Ok(descr.merge(&base.without("generic")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, Builder, NamedTempFile};

    const PLATFORMS: &str = r#"
platforms:
  base:
    description: Base board
    generic: true
    components:
      ram:
        type: memory
        size: 4K
  board:
    description: Board
    inherit: base
    components:
      cpu:
        type: cpu
  other:
    description: Other
"#;

    fn from_yaml(yaml: &str) -> ConfigManager {
        let mut manager = ConfigManager::new();
        manager.add_yaml(yaml).unwrap();
        manager
    }

    #[test]
    fn test_inheritance() {
        let manager = from_yaml(PLATFORMS);
        let platforms = manager.platforms().unwrap();

        let board = &platforms["board"];
        assert_eq!(board.get_path("components.ram.size").raw(), Some("4K"));
        assert_eq!(board.get_path("components.cpu.type").raw(), Some("cpu"));
        assert_eq!(board.get("description").raw(), Some("Board"));
        assert!(!board.exists("generic"));
        assert!(platforms["base"].exists("generic"));
    }

    #[test]
    fn test_list_platforms() {
        let listing = from_yaml(PLATFORMS).list_platforms().unwrap();
        let names: Vec<_> = listing.iter().map(|p| (p.name.as_str(), p.generic)).collect();
        assert_eq!(names, [("base", true), ("board", false), ("other", false)]);
        assert_eq!(listing[1].description, "Board");
    }

    #[test]
    fn test_generic_platform_not_selectable() {
        let manager = from_yaml(PLATFORMS);
        assert!(matches!(
            manager.apply_platform("base"),
            Err(ConfigError::GenericPlatform(name)) if name == "base"
        ));
        assert!(matches!(
            manager.apply_platform("nope"),
            Err(ConfigError::UnknownPlatform(_))
        ));
    }

    #[test]
    fn test_unknown_parent() {
        let manager = from_yaml("platforms:\n  a:\n    description: A\n    inherit: ghost\n");
        match manager.apply_platform("a") {
            Err(ConfigError::UnknownParentPlatform { name, parent, .. }) => {
                assert_eq!(name, "a");
                assert_eq!(parent, "ghost");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_inheritance_cycle() {
        let manager = from_yaml(
            "platforms:\n  a:\n    description: A\n    inherit: b\n  b:\n    description: B\n    inherit: a\n",
        );
        assert!(matches!(
            manager.platforms(),
            Err(ConfigError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn test_cmdline_overrides_files() {
        let mut manager = from_yaml(PLATFORMS);
        manager
            .add_cmdline(["-components.ram.size", "8K", "-global.selected-platform", "board"])
            .unwrap();

        assert_eq!(manager.select_platform(None).unwrap(), "board");
        assert_eq!(manager.select_platform(Some("other")).unwrap(), "other");

        let applied = manager.apply_platform("board").unwrap();
        assert_eq!(applied.get_path("components.ram.size").raw(), Some("8K"));
        assert_eq!(applied.get_path("components.ram.size").origin(), Origin::Cmdline);
        assert_eq!(applied.get_path("components.cpu.type").raw(), Some("cpu"));
        assert_eq!(applied.get("description").raw(), Some("Board"));
    }

    #[test]
    fn test_select_without_choice() {
        let manager = from_yaml(PLATFORMS);
        assert!(matches!(
            manager.select_platform(None),
            Err(ConfigError::NoPlatformSelected(names)) if names == "board, other"
        ));

        let single = from_yaml("platforms:\n  only:\n    description: Only\n");
        assert_eq!(single.select_platform(None).unwrap(), "only");
    }

    fn temp_file(suffix: &str) -> NamedTempFile {
        Builder::new().suffix(suffix).tempfile().unwrap()
    }

    #[test]
    fn test_later_file_overrides_earlier() {
        let mut first = temp_file(".yml");
        writeln!(first, "global:\n  selected-platform: first\n  config-dir: /etc").unwrap();
        let mut second = temp_file(".json");
        writeln!(second, r#"{{"global": {{"selected-platform": "second"}}}}"#).unwrap();

        let mut manager = ConfigManager::new();
        assert!(manager.add_config_file(first.path()).unwrap());
        assert!(manager.add_config_file(second.path()).unwrap());
        assert!(!manager.add_config_file(first.path()).unwrap());

        let global = manager.global_params().unwrap();
        assert_eq!(global.selected_platform.as_deref(), Some("second"));
        assert_eq!(global.config_dir.as_deref(), Some("/etc"));
        assert_eq!(manager.loaded_files().count(), 2);
    }

    #[test]
    fn test_origin_points_at_file() {
        let mut file = temp_file(".yaml");
        writeln!(file, "global:\n  selected-platform: 3").unwrap();

        let mut manager = ConfigManager::new();
        manager.add_config_file(file.path()).unwrap();
        let node = manager.root().get_path("global.selected-platform");
        assert_eq!(node.origin(), Origin::file_at(&file.path().display().to_string(), 2, 22));
    }

    #[test]
    fn test_config_dir_and_includes() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "config: extra/defaults.yml\nglobal:\n  selected-platform: a\n",
        )
        .unwrap();
        fs::write(dir.path().join("nested/b.yaml"), "platforms:\n  b:\n    description: B\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a description").unwrap();

        fs::create_dir(dir.path().join("extra")).unwrap();
        fs::write(
            dir.path().join("extra/defaults.yml"),
            "global:\n  selected-platform: defaults\n  config-dir: here\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new();
        // extra/defaults.yml is loaded through the include, then again by
        // the directory walk, which skips it.
        assert_eq!(manager.add_config_dir(dir.path()).unwrap(), 2);

        let global = manager.global_params().unwrap();
        assert_eq!(global.selected_platform.as_deref(), Some("a"));
        assert_eq!(global.config_dir.as_deref(), Some("here"));
        assert!(manager.platforms().unwrap().contains_key("b"));
        assert_eq!(manager.loaded_files().count(), 3);
    }

    #[test]
    fn test_missing_directory() {
        let mut manager = ConfigManager::new();
        assert!(matches!(
            manager.add_config_dir(Path::new("/nonexistent/vplatform")),
            Err(ConfigError::Directory { .. })
        ));
    }

    #[test]
    fn test_unary_cmdline_key() {
        let mut manager = ConfigManager::new();
        manager.add_unary_key("global.trace");
        manager.add_cmdline(["-global.trace"]).unwrap();
        assert_eq!(manager.root().get_path("global.trace").parse::<bool>(), Ok(true));
    }
}
