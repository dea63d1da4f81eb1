//! IDL Registry CLI
//!
//! Validates and inspects schema files, and resolves or compiles versions
//! from an on-disk `<root>/<module>/<version>/` layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use idl_registry::compiler::MemoryJobStore;
use idl_registry::{
    Compiler, GeneratorRegistry, MemoryStore, RegistryConfig, ResolutionMode, SchemaRegistry,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "idl-registry")]
#[command(about = "Validate, resolve and compile IDL schema modules")]
struct Cli {
    /// Registry root (defaults to `[registry] root` from config)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Extra config file layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that schema files parse
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show package, imports and directives of a schema file
    Inspect {
        file: PathBuf,
        /// Print the full tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// List modules and their versions
    List,

    /// List the built-in generator backends
    Languages,

    /// Show the files a version compiles against
    Resolve {
        module: String,
        version: String,
        /// Follow dependencies of dependencies
        #[arg(long)]
        transitive: bool,
    },

    /// Compile a version with the built-in backends
    Compile {
        module: String,
        version: String,
        /// Target language (repeatable)
        #[arg(short, long = "lang", default_value = "rust")]
        languages: Vec<String>,
        /// Generator option as key=value (repeatable)
        #[arg(short = 'O', long = "option")]
        options: Vec<String>,
        /// Emit service definitions too
        #[arg(long)]
        grpc: bool,
        /// Write generated files here instead of listing them
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = RegistryConfig::load_from(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.registry.root = root;
    }

    match cli.command {
        Commands::Validate { files } => {
            let facade = config.schema_facade();
            let mut failures = 0;
            for file in &files {
                match facade.parse_file(file) {
                    Ok(_) => println!("✅ {}", file.display()),
                    Err(e) => {
                        println!("❌ {} - {}", file.display(), e);
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{} of {} file(s) failed to parse", failures, files.len());
            }
            Ok(())
        }

        Commands::Inspect { file, json } => {
            let facade = config.schema_facade();
            let root = facade.parse_file(&file)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&root)?);
                return Ok(());
            }

            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            match facade.extract_package_name(&text) {
                Ok(name) if name.is_empty() => println!("📦 package: (default)"),
                Ok(name) => println!("📦 package: {}", name),
                Err(e) => println!("📦 package: {}", e),
            }

            let imports = facade.extract_imports(&text)?;
            println!("📥 imports: {}", imports.len());
            for import in imports {
                let modifier = match (import.public, import.weak) {
                    (true, _) => " (public)",
                    (_, true) => " (weak)",
                    _ => "",
                };
                println!("   └─ {}{}", import.path, modifier);
            }

            let directives = root.all_directives();
            println!("🏷️  directives: {}", directives.len());
            for directive in directives {
                println!(
                    "   └─ {}:{} {} = {}",
                    directive.span.start.line,
                    directive.span.start.column,
                    directive.option,
                    directive.value
                );
            }
            Ok(())
        }

        Commands::List => {
            let registry = open_registry(&config).await?;
            for module in registry.list_modules().await? {
                let versions: Vec<String> = registry
                    .list_versions(&module.name)
                    .await?
                    .iter()
                    .map(|v| v.version.clone())
                    .collect();
                println!("📦 {} [{}]", module.name, versions.join(", "));
            }
            Ok(())
        }

        Commands::Languages => {
            let generators = GeneratorRegistry::with_builtins(&config.parse_options());
            for (language, description) in generators.descriptions() {
                println!("🛠️  {:<12} {}", language, description);
            }
            Ok(())
        }

        Commands::Resolve {
            module,
            version,
            transitive,
        } => {
            if transitive {
                config.resolver.mode = ResolutionMode::Transitive;
            }
            let registry = open_registry(&config).await?;
            let resolved = registry.resolve(&module, &version).await?;

            println!("🔗 {}@{}: {} file(s)", module, version, resolved.len());
            for file in resolved.own_files() {
                println!("   ├─ {} (own)", file.path);
            }
            for file in resolved.dependency_files() {
                println!("   ├─ {}", file.path);
            }
            for shadowed in &resolved.shadowed {
                println!(
                    "   ⚠️  {} from {} shadowed by {}",
                    shadowed.path, shadowed.dropped_from, shadowed.kept_from
                );
            }
            Ok(())
        }

        Commands::Compile {
            module,
            version,
            languages,
            options,
            grpc,
            out,
        } => {
            let options = parse_options(&options)?;
            let registry = open_registry(&config).await?.with_compiler(Compiler::with_store(
                GeneratorRegistry::with_builtins(&config.parse_options()),
                Arc::new(MemoryJobStore::new()),
                config.compiler_options(),
            ));

            let results = registry
                .compile_version(&module, &version, &languages, options, grpc)
                .await?;

            let mut failed = 0;
            for result in &results {
                if !result.success {
                    failed += 1;
                    println!(
                        "❌ {} - {}",
                        result.language,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    continue;
                }
                println!(
                    "✅ {} - {} file(s) in {:?}",
                    result.language,
                    result.generated_files.len() + result.package_files.len(),
                    result.duration
                );
                let files = result.generated_files.iter().chain(&result.package_files);
                match &out {
                    Some(dir) => {
                        for file in files {
                            write_output(&dir.join(&result.language), &file.path, &file.content)?;
                        }
                    }
                    None => {
                        for file in files {
                            println!("   └─ {}", file.path);
                        }
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} language(s) failed", failed, results.len());
            }
            Ok(())
        }
    }
}

async fn open_registry(config: &RegistryConfig) -> anyhow::Result<SchemaRegistry> {
    let root = config.root_path();
    let store = Arc::new(MemoryStore::new());
    let count = store
        .load_layout(&root)
        .await
        .with_context(|| format!("loading registry at {}", root.display()))?;
    tracing::info!(root = %root.display(), versions = count, "loaded registry");
    Ok(SchemaRegistry::from_config(store, config))
}

fn parse_options(raw: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("option '{}' is not key=value", pair),
        })
        .collect()
}

fn write_output(dir: &Path, relative: &str, content: &str) -> anyhow::Result<()> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    println!("   └─ {}", path.display());
    Ok(())
}
