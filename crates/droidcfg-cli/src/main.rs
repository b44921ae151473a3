#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use droidcfg_config::descriptor::{DescriptorFile, DescriptorFormat};
use droidcfg_config::Settings;
use droidcfg_engine::signing::BindingSource;
use droidcfg_engine::{
    FlutterProvider, LintOptions, LintResult, OutputFormat, PluginRegistry, Providers,
    Resolution, ValueContext,
};

type CliResult = Result<(), Box<dyn Error>>;

/// Descriptor locations tried, in order, when `--descriptor` is not given.
const DEFAULT_DESCRIPTORS: [&str; 3] = [
    "build.gradle.kts",
    "android/app/build.gradle.kts",
    "droidcfg.toml",
];

#[derive(Debug, Parser)]
#[command(
    name = "droidcfg",
    about = "Resolve, validate and harden Flutter Android build descriptors"
)]
#[command(version)]
struct Cli {
    /// Path to the descriptor (defaults to build.gradle.kts, then
    /// android/app/build.gradle.kts, then droidcfg.toml)
    #[arg(long, global = true)]
    descriptor: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lint the descriptor and report every finding
    Check {
        /// Disable a rule (repeatable)
        #[arg(long)]
        allow: Vec<String>,
        /// Treat warnings as errors
        #[arg(long)]
        deny_warnings: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve plugins, signing, versions and source root
    Resolve {
        /// Resolve signing for one build type only
        #[arg(long)]
        build_type: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the activated plugins
    Plugins {
        /// Print the dependency-respecting order instead
        #[arg(long)]
        order: bool,
    },
    /// Print the descriptor in canonical form
    Emit {
        /// Output syntax: kts or toml
        #[arg(long, default_value = "kts")]
        format: OutputFormat,
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Move credentials behind environment variables and fix plugin order
    Harden {
        /// Output syntax: kts or toml (defaults to the descriptor's own)
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Rewrite the descriptor in place
        #[arg(long)]
        write: bool,
        /// Environment variable prefix (defaults to the settings value)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Create a new descriptor with environment-backed release signing
    Init {
        /// Reverse-domain namespace, e.g. com.example.app
        #[arg(long)]
        namespace: String,
        /// Application id (defaults to the namespace)
        #[arg(long)]
        application_id: Option<String>,
        /// Output syntax: kts or toml
        #[arg(long, default_value = "kts")]
        format: OutputFormat,
        /// Directory to create the descriptor in
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Environment variable prefix (defaults to the settings value)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Check the environment and every descriptor under a directory
    Doctor {
        /// Directory to scan (defaults to the current directory)
        dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let descriptor = cli.descriptor.as_deref();
    let result = match cli.command {
        Command::Check {
            allow,
            deny_warnings,
            json,
        } => cmd_check(descriptor, allow, deny_warnings, json),
        Command::Resolve { build_type, json } => {
            cmd_resolve(descriptor, build_type.as_deref(), json)
        }
        Command::Plugins { order } => cmd_plugins(descriptor, order),
        Command::Emit { format, output } => cmd_emit(descriptor, format, output.as_deref()),
        Command::Harden {
            format,
            write,
            prefix,
        } => cmd_harden(descriptor, format, write, prefix),
        Command::Init {
            namespace,
            application_id,
            format,
            dir,
            prefix,
        } => cmd_init(namespace, application_id, format, dir, prefix),
        Command::Doctor { dir } => cmd_doctor(dir),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("DROIDCFG_LOG")
        .unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Pick the descriptor: the explicit path, else the first default that exists under `cwd`.
fn locate_descriptor(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, Box<dyn Error>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(format!("descriptor {} does not exist", path.display()).into());
        }
        return Ok(path.to_path_buf());
    }
    DEFAULT_DESCRIPTORS
        .iter()
        .map(|name| cwd.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            format!(
                "no descriptor found in {}; pass --descriptor or run `droidcfg init`",
                cwd.display()
            )
            .into()
        })
}

/// A loaded descriptor with its settings and plugin registry.
struct Workspace {
    file: DescriptorFile,
    settings: Settings,
    registry: PluginRegistry,
}

impl Workspace {
    fn load(descriptor: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let cwd = std::env::current_dir()?;
        Self::load_from(&locate_descriptor(descriptor, &cwd)?, &cwd)
    }

    fn load_from(path: &Path, cwd: &Path) -> Result<Self, Box<dyn Error>> {
        let file = DescriptorFile::load(path)?;
        let (settings, settings_path) = Settings::discover(&[file.module_dir(), cwd])?;
        if let Some(settings_path) = settings_path {
            tracing::debug!(path = %settings_path.display(), "using settings");
        }
        let registry = PluginRegistry::with_extra(&settings.registry.plugins)?;
        Ok(Self {
            file,
            settings,
            registry,
        })
    }

    fn providers(&self) -> Result<Providers, Box<dyn Error>> {
        Ok(Providers::discover(
            self.file.module_dir(),
            &self.settings.provider.flutter,
        )?)
    }

    fn context(&self) -> ValueContext {
        ValueContext::process(self.file.module_dir())
    }

    fn lint(&self, options: &LintOptions) -> Result<LintResult, Box<dyn Error>> {
        Ok(droidcfg_engine::lint(
            &self.file,
            &self.registry,
            &self.providers()?,
            &self.context(),
            options,
        ))
    }
}

fn lint_options(settings: &Settings, allow: Vec<String>, deny_warnings: bool) -> LintOptions {
    let mut options = LintOptions::from_settings(&settings.lint);
    for rule in allow {
        if !options.allow.contains(&rule) {
            options.allow.push(rule);
        }
    }
    options.deny_warnings |= deny_warnings;
    options
}

fn cmd_check(
    descriptor: Option<&Path>,
    allow: Vec<String>,
    deny_warnings: bool,
    json: bool,
) -> CliResult {
    let ws = Workspace::load(descriptor)?;
    if let Some(rule) = allow.iter().find(|r| !droidcfg_engine::lint::is_rule(r)) {
        return Err(format!("unknown rule `{rule}`").into());
    }
    let options = lint_options(&ws.settings, allow, deny_warnings);
    let result = ws.lint(&options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let path = ws.file.path.display();
        for diag in &result.diagnostics {
            match diag.line {
                Some(line) => println!("{path}:{line}: {diag}"),
                None => println!("{path}: {diag}"),
            }
        }
    }

    if result.success {
        eprintln!(
            "    Finished check: {} warning(s)",
            result.warning_count
        );
        Ok(())
    } else {
        Err(format!(
            "check found {} error(s) and {} warning(s)",
            result.error_count, result.warning_count
        )
        .into())
    }
}

fn binding_label(source: BindingSource) -> &'static str {
    match source {
        BindingSource::Explicit => "explicit",
        BindingSource::DefaultConfig => "from defaultConfig",
        BindingSource::ImplicitDebug => "implicit debug",
    }
}

fn print_resolution(resolution: &Resolution) {
    println!("descriptor: {}", resolution.descriptor);
    if let Some(namespace) = &resolution.namespace {
        println!("namespace: {namespace}");
    }
    if let Some(id) = &resolution.application_id {
        println!("applicationId: {id}");
    }
    println!("plugins:");
    for plugin in &resolution.plugins {
        println!("  {}", plugin.id);
    }
    println!("signing:");
    for signing in &resolution.signing {
        let fingerprint = signing
            .fingerprint
            .as_deref()
            .map_or("not generated yet", droidcfg_util::hash::short_digest);
        println!(
            "  {} -> {} ({}): {} [{fingerprint}], alias {}",
            signing.build_type,
            signing.identity,
            binding_label(signing.source),
            signing.keystore.display(),
            signing.key_alias
        );
    }
    let versions = &resolution.versions;
    println!("versions:");
    let numbers = [
        ("compileSdk", &versions.compile_sdk),
        ("minSdk", &versions.min_sdk),
        ("targetSdk", &versions.target_sdk),
        ("versionCode", &versions.version_code),
    ];
    for (name, value) in numbers {
        if let Some(v) = value {
            println!("  {name} = {} ({})", v.value, v.origin);
        }
    }
    let strings = [
        ("ndkVersion", &versions.ndk_version),
        ("versionName", &versions.version_name),
    ];
    for (name, value) in strings {
        if let Some(v) = value {
            println!("  {name} = {} ({})", v.value, v.origin);
        }
    }
    if let Some(java) = versions.jvm_target {
        println!("  jvmTarget = {}", java.jvm_target());
    }
    if let Some(root) = &resolution.source_root {
        println!("source: {}", root.path.display());
    }
}

fn cmd_resolve(descriptor: Option<&Path>, build_type: Option<&str>, json: bool) -> CliResult {
    let ws = Workspace::load(descriptor)?;
    let resolution = droidcfg_engine::resolve(
        &ws.file,
        &ws.registry,
        &ws.providers()?,
        &ws.context(),
        build_type,
    )?;
    if json {
        println!("{}", resolution.to_json()?);
    } else {
        print_resolution(&resolution);
    }
    Ok(())
}

fn cmd_plugins(descriptor: Option<&Path>, order: bool) -> CliResult {
    let ws = Workspace::load(descriptor)?;
    let declared = &ws.file.descriptor.plugins;
    if order {
        for plugin in droidcfg_engine::plugins::topological_order(declared, &ws.registry)? {
            println!("{}", plugin.id);
        }
        return Ok(());
    }

    let activated = droidcfg_engine::plugins::resolve_plugins(declared, &ws.registry)?;
    for plugin in &activated {
        let alias = if plugin.declared_as == plugin.id {
            String::new()
        } else {
            format!(" (declared as {})", plugin.declared_as)
        };
        match &plugin.extension {
            Some(extension) => println!("{}{alias}: `{extension}` extension", plugin.id),
            None => println!("{}{alias}", plugin.id),
        }
    }
    Ok(())
}

fn cmd_emit(descriptor: Option<&Path>, format: OutputFormat, output: Option<&Path>) -> CliResult {
    let ws = Workspace::load(descriptor)?;
    let content = droidcfg_engine::emit(&ws.file.descriptor, format)?;
    match output {
        Some(path) => {
            droidcfg_util::fs::write_atomic(path, &content)?;
            eprintln!("    Wrote {format} descriptor to {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn own_format(format: DescriptorFormat) -> OutputFormat {
    match format {
        DescriptorFormat::KotlinDsl => OutputFormat::KotlinDsl,
        DescriptorFormat::Toml => OutputFormat::Toml,
    }
}

fn cmd_harden(
    descriptor: Option<&Path>,
    format: Option<OutputFormat>,
    write: bool,
    prefix: Option<String>,
) -> CliResult {
    let ws = Workspace::load(descriptor)?;
    let prefix = prefix.unwrap_or_else(|| ws.settings.harden.env_prefix.clone());
    let report = droidcfg_engine::harden(&ws.file.descriptor, &ws.registry, &prefix)?;
    let format = format.unwrap_or_else(|| own_format(ws.file.format));
    let content = droidcfg_engine::emit(&report.descriptor, format)?;

    for change in &report.changes {
        eprintln!("    Hardened {change}");
    }
    if write {
        if format != own_format(ws.file.format) {
            return Err(format!(
                "cannot write {format} output over {}; drop --format or --write",
                ws.file.path.display()
            )
            .into());
        }
        if report.changes.is_empty() {
            eprintln!("    Nothing to harden in {}", ws.file.path.display());
            return Ok(());
        }
        droidcfg_util::fs::write_atomic(&ws.file.path, &content)?;
        eprintln!("    Rewrote {}", ws.file.path.display());
    } else {
        print!("{content}");
    }
    Ok(())
}

fn cmd_init(
    namespace: String,
    application_id: Option<String>,
    format: OutputFormat,
    dir: Option<PathBuf>,
    prefix: Option<String>,
) -> CliResult {
    let cwd = std::env::current_dir()?;
    let dir = dir.unwrap_or_else(|| cwd.clone());
    droidcfg_util::fs::ensure_dir(&dir)?;
    let env_prefix = match prefix {
        Some(prefix) => prefix,
        None => Settings::discover(&[dir.as_path(), cwd.as_path()])?.0.harden.env_prefix,
    };
    let options = droidcfg_engine::InitOptions {
        namespace,
        application_id,
        env_prefix,
        format,
    };
    let path = droidcfg_engine::init_descriptor(&dir, &options)?;

    eprintln!("    Created descriptor at {}", path.display());
    eprintln!();
    eprintln!("  Release signing reads these environment variables:");
    for field in ["storeFile", "storePassword", "keyPassword", "keyAlias"] {
        eprintln!(
            "    {}",
            droidcfg_engine::emit::env_var_name(&options.env_prefix, "release", field)
        );
    }
    Ok(())
}

/// Whether a found descriptor sits under a build output or hidden directory.
fn is_generated(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(|name| name == "build" || (name.starts_with('.') && name.len() > 1 && name != ".."))
}

fn cmd_doctor(dir: Option<PathBuf>) -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;
    let cwd = std::env::current_dir()?;
    let root = dir.unwrap_or_else(|| cwd.clone());

    eprintln!("  [ok] Host: {}", droidcfg_sdk::host());
    match droidcfg_util::fs::home_dir() {
        Ok(home) => {
            let keystore = home.join(".android").join("debug.keystore");
            if keystore.exists() {
                eprintln!("  [ok] Debug keystore: {}", keystore.display());
            } else {
                eprintln!("  [--] Debug keystore: not generated yet ({})", keystore.display());
            }
        }
        Err(e) => {
            eprintln!("  [!!] Home directory: {e}");
            issues = issues.saturating_add(1);
        }
    }

    let settings = match Settings::discover(&[root.as_path(), cwd.as_path()]) {
        Ok((settings, Some(path))) => {
            eprintln!("  [ok] Settings: {}", path.display());
            settings
        }
        Ok((settings, None)) => {
            eprintln!("  [--] No .droidcfg.toml; using defaults");
            settings
        }
        Err(e) => {
            eprintln!("  [!!] Settings: {e}");
            issues = issues.saturating_add(1);
            Settings::default()
        }
    };

    let descriptors: Vec<PathBuf> =
        droidcfg_util::fs::find_files(&root, "**/build.gradle.kts")?
            .into_iter()
            .filter(|p| !is_generated(p, &root))
            .collect();
    if descriptors.is_empty() {
        eprintln!("  [--] No build.gradle.kts under {}", root.display());
    }

    let options = LintOptions::from_settings(&settings.lint);
    for path in &descriptors {
        let ws = match Workspace::load_from(path, &cwd) {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("  [!!] {}: {e}", path.display());
                issues = issues.saturating_add(1);
                continue;
            }
        };
        match FlutterProvider::discover(ws.file.module_dir(), &ws.settings.provider.flutter) {
            Ok(provider) => match provider.framework_version() {
                Some(version) => eprintln!("  [ok] Flutter {version} for {}", path.display()),
                None => eprintln!("  [--] Flutter version unknown for {}", path.display()),
            },
            Err(e) => {
                eprintln!("  [!!] Flutter: {e}");
                issues = issues.saturating_add(1);
                continue;
            }
        }
        match ws.lint(&options) {
            Ok(result) if result.success => eprintln!(
                "  [ok] {}: {} warning(s)",
                path.display(),
                result.warning_count
            ),
            Ok(result) => {
                eprintln!(
                    "  [!!] {}: {} error(s), {} warning(s); run `droidcfg check --descriptor {}`",
                    path.display(),
                    result.error_count,
                    result.warning_count,
                    path.display()
                );
                issues = issues.saturating_add(1);
            }
            Err(e) => {
                eprintln!("  [!!] {}: {e}", path.display());
                issues = issues.saturating_add(1);
            }
        }
    }

    eprintln!();
    if issues > 0 {
        eprintln!("{issues} issue(s) found");
        Err(format!("{issues} issue(s) found").into())
    } else {
        eprintln!("All checks passed");
        Ok(())
    }
}
