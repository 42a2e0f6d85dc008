//! Schema Validator CLI
//!
//! Loads schema definitions from a directory and validates form
//! configurations, record linkers and data requirements against them.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use casework_schemas::graph::load_into_registry;
use casework_schemas::{
    DataRequirementSet, DynamicEntity, EngineConfig, FormConfiguration, FormValidator,
    IdentityContext, MemorySchemaStore, RecordLinker, RecordLinkerValidator, SchemaError,
    SchemaRegistry,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-validator")]
#[command(about = "Validate form configurations and mappings against dynamic schemas")]
struct Cli {
    /// Directory of schema definition files (overrides registry.schema_dir)
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    /// Config file to layer over the defaults
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a form configuration against a schema
    Form {
        schema: String,
        form: PathBuf,
    },

    /// Print the related-schema closure of a schema
    Related { schema: String },

    /// Validate a record linker against a transaction schema
    Linker {
        transaction: String,
        linker: PathBuf,
    },

    /// Validate a data requirement set against a schema
    Requirements {
        schema: String,
        set: PathBuf,
        /// User type of the caller
        #[arg(long, default_value = "")]
        user_type: String,
    },

    /// Build a dynamic entity from a JSON payload and print it back
    Entity { schema: String, data: PathBuf },

    /// Print the effective configuration
    Config,
}

struct CliIdentity(String);

impl IdentityContext for CliIdentity {
    fn current_user_type(&self) -> String {
        self.0.clone()
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn open_registry(cli_dir: Option<PathBuf>, config: &EngineConfig) -> anyhow::Result<SchemaRegistry<MemorySchemaStore>> {
    let dir = cli_dir
        .or_else(|| config.registry.schema_dir.clone())
        .ok_or_else(|| anyhow!("no schema directory given (use --schemas or registry.schema_dir)"))?;
    let registry = SchemaRegistry::with_config(MemorySchemaStore::new(), &config.registry)?;
    load_into_registry(&dir, &registry)?;
    Ok(registry)
}

fn run(cli: Cli, config: EngineConfig) -> anyhow::Result<()> {
    let open = || open_registry(cli.schemas.clone(), &config);

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Form { schema, form } => {
            let registry = open()?;
            let form: FormConfiguration = read_json(&form)?;
            let validator = FormValidator::with_config(&registry, &config.validation);
            let errors = validator.validate(&form.root(), &schema)?;
            if errors.is_empty() {
                println!("✅ Form configuration is valid for '{}'", schema);
            } else {
                println!("{}", serde_json::to_string_pretty(&errors)?);
                std::process::exit(1);
            }
        }

        Commands::Related { schema } => {
            let registry = open()?;
            let related = registry.get_all_related_schemas(&schema)?;
            println!("{}", serde_json::to_string_pretty(&related)?);
        }

        Commands::Linker { transaction, linker } => {
            let registry = open()?;
            let linker: RecordLinker = read_json(&linker)?;
            match RecordLinkerValidator::new(&registry).validate(&transaction, &linker) {
                Ok(()) => println!("✅ Record linker '{}' is valid", linker.record_definition_key),
                Err(SchemaError::RecordLinker(errors)) => {
                    println!("{}", serde_json::to_string_pretty(&errors)?);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Requirements { schema, set, user_type } => {
            let registry = open()?;
            let set: DataRequirementSet = read_json(&set)?;
            set.validate(&registry, &schema, &CliIdentity(user_type))?;
            println!("✅ All data requirements hold for '{}'", schema);
        }

        Commands::Entity { schema, data } => {
            let registry = open()?;
            let data: serde_json::Map<String, serde_json::Value> = read_json(&data)?;
            let entity = DynamicEntity::build_for_key(&registry, &schema, &data)?;
            println!("{}", serde_json::to_string_pretty(&entity.to_generic_map())?);
        }
    }

    Ok(())
}
