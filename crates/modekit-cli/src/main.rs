//! `modekit` command-line front end
//!
//! Lists, inspects, edits, migrates and watches mode definitions across the
//! global and project stores.

mod commands;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use modekit_core::{ModeRegistry, RegistryConfig};
use modekit_model::{ModeScope, Slug};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the global root when no flag or config sets it
const GLOBAL_ROOT_ENV: &str = "MODEKIT_GLOBAL_ROOT";

fn scope_arg(required: bool) -> Arg {
    let arg = Arg::new("scope")
        .long("scope")
        .value_parser(value_parser!(ModeScope))
        .help("Target scope: global or project");
    if required {
        arg.required(true)
    } else {
        arg
    }
}

fn slug_arg() -> Arg {
    Arg::new("slug")
        .required(true)
        .value_parser(value_parser!(Slug))
        .help("Mode slug")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

fn cli() -> Command {
    Command::new("modekit")
        .version(modekit_core::VERSION)
        .about("Inspect and manage scoped mode definitions")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Registry configuration file (.toml or .json)"),
        )
        .arg(
            Arg::new("global-root")
                .long("global-root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Installation-wide settings directory"),
        )
        .arg(
            Arg::new("project-root")
                .long("project-root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Repository root (defaults to the current directory)"),
        )
        .arg(
            Arg::new("no-project")
                .long("no-project")
                .global(true)
                .action(ArgAction::SetTrue)
                .conflicts_with("project-root")
                .help("Serve global modes only"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("list")
                .about("List resolved modes and where each comes from")
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Show one resolved mode")
                .arg(slug_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("delete")
                .about("Remove a mode from every store")
                .arg(slug_arg()),
        )
        .subcommand(
            Command::new("migrate")
                .about("Convert legacy aggregate files into split directories")
                .arg(scope_arg(false)),
        )
        .subcommand(
            Command::new("export")
                .about("Print a mode as a split document")
                .arg(slug_arg()),
        )
        .subcommand(
            Command::new("import")
                .about("Import modes from a legacy or split document")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Document to import"),
                )
                .arg(scope_arg(false).default_value("project")),
        )
        .subcommand(
            Command::new("reset")
                .about("Remove every mode of one scope")
                .arg(scope_arg(true)),
        )
        .subcommand(Command::new("watch").about("Print a line whenever the resolved modes change"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Configuration from file, environment and flags, later sources winning
async fn build_config(matches: &ArgMatches) -> Result<RegistryConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => RegistryConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    let from_file = matches.contains_id("config");

    if let Some(root) = matches.get_one::<PathBuf>("global-root") {
        config.global_root = root.clone();
    } else if let Some(root) = std::env::var_os(GLOBAL_ROOT_ENV) {
        if !from_file {
            config.global_root = PathBuf::from(root);
        }
    }

    if matches.get_flag("no-project") {
        config.project_root = None;
    } else if let Some(root) = matches.get_one::<PathBuf>("project-root") {
        config.project_root = Some(root.clone());
    } else if config.project_root.is_none() {
        config.project_root =
            Some(std::env::current_dir().context("cannot determine current directory")?);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = build_config(&matches).await?;
    tracing::debug!(?config, "registry configuration");
    let registry = ModeRegistry::new(config);

    match matches.subcommand() {
        Some(("list", args)) => commands::list(&registry, args.get_flag("json")).await,
        Some(("show", args)) => {
            let slug = args.get_one::<Slug>("slug").context("slug is required")?;
            commands::show(&registry, slug, args.get_flag("json")).await
        }
        Some(("delete", args)) => {
            let slug = args.get_one::<Slug>("slug").context("slug is required")?;
            commands::delete(&registry, slug).await
        }
        Some(("migrate", args)) => {
            let scopes = match args.get_one::<ModeScope>("scope") {
                Some(scope) => vec![*scope],
                None => vec![ModeScope::Global, ModeScope::Project],
            };
            commands::migrate(&registry, &scopes).await
        }
        Some(("export", args)) => {
            let slug = args.get_one::<Slug>("slug").context("slug is required")?;
            commands::export(&registry, slug).await
        }
        Some(("import", args)) => {
            let file = args.get_one::<PathBuf>("file").context("file is required")?;
            let scope = args
                .get_one::<ModeScope>("scope")
                .copied()
                .unwrap_or(ModeScope::Project);
            commands::import(&registry, file, scope).await
        }
        Some(("reset", args)) => {
            let scope = args.get_one::<ModeScope>("scope").context("scope is required")?;
            commands::reset(&registry, *scope).await
        }
        Some(("watch", _)) => commands::watch(&registry).await,
        _ => Ok(()),
    }
}
