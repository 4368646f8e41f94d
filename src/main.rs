use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use std::path::{Path, PathBuf};

use vplatform::components::stock_registry;
use vplatform::config::ConfigManager;
use vplatform::description::loader;
use vplatform::module::Namespace;
use vplatform::orchestrator::Orchestrator;
use vplatform::parser::PlatformNode;

/// Build a virtual platform from its description
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML or JSON); may be repeated, later files win
    #[arg(short, long)]
    config: Vec<PathBuf>,

    /// Directory of configuration files, loaded recursively
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Platform to build
    #[arg(short, long)]
    platform: Option<String>,

    /// List the platforms and module types, then exit
    #[arg(long)]
    list_platforms: bool,

    /// Print the applied platform description as YAML
    #[arg(long)]
    dump: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Description overrides, e.g. `-- -components.ram.size 8K`
    #[arg(last = true, allow_hyphen_values = true)]
    overrides: Vec<String>,
}

fn load(args: &Args) -> Result<ConfigManager> {
    let mut config = ConfigManager::new();
    config
        .add_cmdline(&args.overrides)
        .wrap_err("Invalid description override")?;

    if let Some(dir) = &args.config_dir {
        config
            .add_config_dir(dir)
            .wrap_err_with(|| format!("Failed to load configuration directory '{}'", dir.display()))?;
    }
    if let Some(dir) = config.global_params()?.config_dir {
        config
            .add_config_dir(Path::new(&dir))
            .wrap_err_with(|| format!("Failed to load configuration directory '{}'", dir))?;
    }
    for file in &args.config {
        config
            .add_config_file(file)
            .wrap_err_with(|| format!("Failed to load configuration file '{}'", file.display()))?;
    }
    Ok(config)
}

fn list(config: &ConfigManager) -> Result<()> {
    let registry = stock_registry();
    println!("Platforms:");
    for platform in config.list_platforms()? {
        let generic = if platform.generic { " (generic)" } else { "" };
        println!("  {}{}: {}", platform.name, generic, platform.description);
    }
    for ns in Namespace::MODULES {
        println!("{} types:", ns);
        for (type_name, description) in registry.types(ns) {
            println!("  {}: {}", type_name, description);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let config = load(&args)?;

    if args.list_platforms {
        return list(&config);
    }

    let name = config.select_platform(args.platform.as_deref())?;
    info!("Selected platform: {}", name);

    let descr = config
        .apply_platform(&name)
        .wrap_err_with(|| format!("Failed to apply platform '{}'", name))?;
    if args.dump {
        println!("{}", loader::to_yaml_string(&descr)?);
    }

    let registry = stock_registry();
    let node = PlatformNode::parse(&name, &descr, &registry)
        .wrap_err_with(|| format!("Invalid description of platform '{}'", name))?;
    let platform = Orchestrator::new(&registry)
        .build(&node)
        .wrap_err_with(|| format!("Failed to build platform '{}'", name))?;

    for binding in platform.bindings() {
        info!("{}", binding);
    }
    if !platform.unused_keys().is_empty() {
        warn!("{} configuration key(s) were not used", platform.unused_keys().len());
    }

    info!(
        "Platform '{}' built with {} component(s)",
        platform.name(),
        platform.component_names().count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "vplatform",
            "-c",
            "a.yml",
            "--config",
            "b.json",
            "-p",
            "board",
            "--",
            "-components.ram.size",
            "8K",
        ]);

        assert_eq!(args.config, [PathBuf::from("a.yml"), PathBuf::from("b.json")]);
        assert_eq!(args.platform.as_deref(), Some("board"));
        assert_eq!(args.overrides, ["-components.ram.size", "8K"]);
        assert!(!args.dump);
        assert!(!args.verbose);
    }

    #[test]
    fn test_load_layers_overrides_over_files() {
        let mut file = Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "global:\n  selected-platform: from-file").unwrap();

        let path = file.path().display().to_string();
        let args = Args::parse_from([
            "vplatform",
            "-c",
            path.as_str(),
            "--",
            "-global.selected-platform",
            "from-cmdline",
        ]);
        let config = load(&args).unwrap();
        assert_eq!(config.select_platform(None).unwrap(), "from-cmdline");
    }
}
