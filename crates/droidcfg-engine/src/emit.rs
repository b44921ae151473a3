//! Descriptor emission (Kotlin DSL or TOML) and hardening.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use droidcfg_config::descriptor::{
    BuildDescriptor, BuildTypeConfig, ConfigValue, Secret, Setting, SigningIdentity,
    DEBUG_BUILD_TYPE, DEBUG_SIGNING, RELEASE_BUILD_TYPE,
};
use droidcfg_config::lower::{GRADLE_PROPERTIES, ROOT_PROJECT_PREFIX};

use crate::error::EngineError;
use crate::plugins;
use crate::registry::PluginRegistry;
use crate::signing;

/// Output syntax for [`emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    KotlinDsl,
    Toml,
}

impl FromStr for OutputFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kts" | "kotlin" | "gradle.kts" => Ok(Self::KotlinDsl),
            "toml" => Ok(Self::Toml),
            other => Err(EngineError::InvalidValue {
                field: "format".to_owned(),
                value: other.to_owned(),
                reason: "expected `kts` or `toml`".to_owned(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KotlinDsl => f.write_str("kts"),
            Self::Toml => f.write_str("toml"),
        }
    }
}

/// Render a descriptor. Output is deterministic for a given descriptor.
///
/// # Errors
/// Returns an error if TOML serialization fails.
pub fn emit(descriptor: &BuildDescriptor, format: OutputFormat) -> Result<String, EngineError> {
    match format {
        OutputFormat::KotlinDsl => Ok(KtsWriter::render(descriptor)),
        OutputFormat::Toml => Ok(descriptor.to_toml()?),
    }
}

/// Indentation-aware line buffer.
#[derive(Default)]
struct KtsWriter {
    out: String,
    depth: usize,
    /// `(file, variable)` for each properties file the descriptor reads.
    property_files: Vec<(String, String)>,
}

impl KtsWriter {
    fn render(descriptor: &BuildDescriptor) -> String {
        let mut w = Self {
            property_files: property_files(descriptor),
            ..Self::default()
        };
        w.preamble();
        w.plugins(descriptor);
        w.android(descriptor);
        if let Some(source) = &descriptor.source_root {
            w.blank();
            w.open("flutter");
            w.line(&format!("source = {}", quote(&source.path)));
            w.close();
        }
        w.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("{\n") && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{header} {{"));
        self.depth = self.depth.saturating_add(1);
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn preamble(&mut self) {
        let loaded: Vec<(String, String)> = self
            .property_files
            .iter()
            .filter(|(file, _)| file != GRADLE_PROPERTIES)
            .cloned()
            .collect();
        if loaded.is_empty() {
            return;
        }
        self.line("import java.io.FileInputStream");
        self.line("import java.util.Properties");
        for (file, var) in &loaded {
            self.blank();
            let file_var = format!("{var}File");
            let opener = match file.strip_prefix(&format!("{ROOT_PROJECT_PREFIX}/")) {
                Some(rest) => format!("rootProject.file({})", quote(rest)),
                None => format!("file({})", quote(file)),
            };
            self.line(&format!("val {var} = Properties()"));
            self.line(&format!("val {file_var} = {opener}"));
            self.open(&format!("if ({file_var}.exists())"));
            self.line(&format!("{var}.load(FileInputStream({file_var}))"));
            self.close();
        }
    }

    fn plugins(&mut self, descriptor: &BuildDescriptor) {
        if descriptor.plugins.is_empty() {
            return;
        }
        self.blank();
        self.open("plugins");
        for plugin in &descriptor.plugins {
            self.line(&format!("id({})", quote(&plugin.id)));
        }
        self.close();
    }

    fn android(&mut self, d: &BuildDescriptor) {
        self.blank();
        self.open("android");
        if let Some(namespace) = &d.namespace {
            self.line(&format!("namespace = {}", quote(namespace)));
        }
        let v = &d.versions;
        if let Some(compile) = &v.compile_sdk {
            self.line(&format!("compileSdk = {}", number_setting(compile)));
        }
        if let Some(ndk) = &v.ndk_version {
            self.line(&format!("ndkVersion = {}", text_setting(ndk)));
        }
        if let Some(tools) = &v.build_tools_version {
            self.line(&format!("buildToolsVersion = {}", quote(tools)));
        }

        if v.source_compatibility.is_some() || v.target_compatibility.is_some() {
            self.blank();
            self.open("compileOptions");
            if let Some(java) = v.source_compatibility {
                self.line(&format!("sourceCompatibility = JavaVersion.{}", java.constant()));
            }
            if let Some(java) = v.target_compatibility {
                self.line(&format!("targetCompatibility = JavaVersion.{}", java.constant()));
            }
            self.close();
        }
        if let Some(java) = v.jvm_target {
            self.blank();
            self.open("kotlinOptions");
            self.line(&format!("jvmTarget = JavaVersion.{}.toString()", java.constant()));
            self.close();
        }

        if !d.signing_configs.is_empty() {
            self.blank();
            self.open("signingConfigs");
            for identity in &d.signing_configs {
                self.signing_config(identity);
            }
            self.close();
        }

        self.default_config(d);

        if !d.build_types.is_empty() {
            self.blank();
            self.open("buildTypes");
            for build_type in &d.build_types {
                self.build_type(build_type);
            }
            self.close();
        }
        self.close();
    }

    fn signing_config(&mut self, identity: &SigningIdentity) {
        self.open(&signing_entry(&identity.name));
        if let Some(store_file) = &identity.store_file {
            let rendered = self.store_file(store_file);
            self.line(&format!("storeFile = {rendered}"));
        }
        for (field, secret) in identity.secrets() {
            let rendered = self.value(&secret.0);
            self.line(&format!("{field} = {rendered}"));
        }
        if let Some(alias) = &identity.key_alias {
            let rendered = self.value(alias);
            self.line(&format!("keyAlias = {rendered}"));
        }
        self.close();
    }

    fn default_config(&mut self, d: &BuildDescriptor) {
        let v = &d.versions;
        let mut lines = Vec::new();
        if let Some(id) = &d.application_id {
            lines.push(format!("applicationId = {}", quote(id)));
        }
        if let Some(min) = &v.min_sdk {
            lines.push(format!("minSdk = {}", number_setting(min)));
        }
        if let Some(target) = &v.target_sdk {
            lines.push(format!("targetSdk = {}", number_setting(target)));
        }
        if let Some(code) = &v.version_code {
            lines.push(format!("versionCode = {}", number_setting(code)));
        }
        if let Some(name) = &v.version_name {
            lines.push(format!("versionName = {}", text_setting(name)));
        }
        if let Some(identity) = &d.default_signing_config {
            lines.push(format!("signingConfig = {}", signing_ref(identity)));
        }
        if lines.is_empty() {
            return;
        }
        self.blank();
        self.open("defaultConfig");
        for line in &lines {
            self.line(line);
        }
        self.close();
    }

    fn build_type(&mut self, build_type: &BuildTypeConfig) {
        self.open(&build_type_entry(&build_type.name));
        if let Some(identity) = &build_type.signing_config {
            self.line(&format!("signingConfig = {}", signing_ref(identity)));
        }
        let flags = [
            ("isMinifyEnabled", build_type.minify_enabled),
            ("isShrinkResources", build_type.shrink_resources),
            ("isDebuggable", build_type.debuggable),
        ];
        for (field, flag) in flags {
            if let Some(flag) = flag {
                self.line(&format!("{field} = {flag}"));
            }
        }
        self.close();
    }

    fn property_var(&self, file: &str) -> String {
        self.property_files
            .iter()
            .find(|(f, _)| f == file)
            .map(|(_, var)| var.clone())
            .unwrap_or_else(|| property_var_name(file))
    }

    fn value(&self, value: &ConfigValue) -> String {
        match value {
            ConfigValue::Literal(text) => quote(text),
            ConfigValue::Env { env } => format!("System.getenv({})", quote(env)),
            ConfigValue::Property { property, file } if file == GRADLE_PROPERTIES => {
                format!("project.findProperty({}) as String", quote(property))
            }
            ConfigValue::Property { property, file } => {
                format!("{}[{}] as String", self.property_var(file), quote(property))
            }
            ConfigValue::Opaque { expr } => expr.clone(),
        }
    }

    fn store_file(&self, value: &ConfigValue) -> String {
        match value {
            ConfigValue::Literal(path) => format!("file({})", quote(path)),
            ConfigValue::Env { env } => format!("System.getenv({})?.let {{ file(it) }}", quote(env)),
            ConfigValue::Property { property, file } if file == GRADLE_PROPERTIES => {
                format!("project.findProperty({})?.let {{ file(it) }}", quote(property))
            }
            ConfigValue::Property { property, file } => format!(
                "{}[{}]?.let {{ file(it) }}",
                self.property_var(file),
                quote(property)
            ),
            ConfigValue::Opaque { expr } => expr.clone(),
        }
    }
}

/// `getByName("x")` for build types AGP predefines, `create("x")` otherwise.
fn build_type_entry(name: &str) -> String {
    if name == DEBUG_BUILD_TYPE || name == RELEASE_BUILD_TYPE {
        format!("getByName({})", quote(name))
    } else {
        format!("create({})", quote(name))
    }
}

/// Only the debug signing config is predefined; every other one is created.
fn signing_entry(name: &str) -> String {
    if name == DEBUG_SIGNING {
        format!("getByName({})", quote(name))
    } else {
        format!("create({})", quote(name))
    }
}

fn signing_ref(identity: &str) -> String {
    format!("signingConfigs.getByName({})", quote(identity))
}

fn number_setting(setting: &Setting<u32>) -> String {
    setting.to_string()
}

fn text_setting(setting: &Setting<String>) -> String {
    match setting {
        Setting::Literal(text) => quote(text),
        other => other.to_string(),
    }
}

/// Kotlin string literal.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len().saturating_add(2));
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// `../key.properties` → `keyProperties`.
fn property_var_name(file: &str) -> String {
    let name = file.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(file);
    let stem = name.strip_suffix(".properties").unwrap_or(name);
    let mut var = String::new();
    let mut upper = false;
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            if var.is_empty() && ch.is_ascii_digit() {
                var.push('p');
            }
            if upper && !var.is_empty() {
                var.push(ch.to_ascii_uppercase());
            } else {
                var.push(ch);
            }
            upper = false;
        } else {
            upper = true;
        }
    }
    if var.is_empty() {
        var.push_str("signing");
    }
    var.push_str("Properties");
    var
}

/// Properties files referenced by signing values, in first-use order, with
/// their variable names.
fn property_files(descriptor: &BuildDescriptor) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = Vec::new();
    for identity in &descriptor.signing_configs {
        let values = identity
            .store_file
            .iter()
            .chain(identity.secrets().map(|(_, s)| &s.0))
            .chain(identity.key_alias.iter());
        for value in values {
            let ConfigValue::Property { file, .. } = value else {
                continue;
            };
            if files.iter().any(|(f, _)| f == file) {
                continue;
            }
            let base = property_var_name(file);
            let mut var = base.clone();
            let mut n = 2_usize;
            while files.iter().any(|(_, v)| *v == var) {
                var = format!("{base}{n}");
                n = n.saturating_add(1);
            }
            files.push((file.clone(), var));
        }
    }
    files
}

/// Result of [`harden`].
#[derive(Debug, Clone, Serialize)]
pub struct HardenReport {
    pub descriptor: BuildDescriptor,
    /// Human-readable list of rewrites; empty when the descriptor was already hardened.
    pub changes: Vec<String>,
}

/// Environment variable name for a signing field: `ANDROID_RELEASE_STORE_PASSWORD`.
pub fn env_var_name(prefix: &str, identity: &str, field: &str) -> String {
    let mut name = String::new();
    for part in [prefix, identity] {
        for ch in part.chars() {
            name.push(if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            });
        }
        name.push('_');
    }
    let mut prev_lower = false;
    for ch in field.chars() {
        if ch.is_ascii_uppercase() && prev_lower {
            name.push('_');
        }
        prev_lower = ch.is_ascii_lowercase();
        name.push(ch.to_ascii_uppercase());
    }
    name
}

/// Move plaintext credentials and absolute keystore paths behind environment
/// variables and reorder plugins from their declared requirements.
///
/// Hardening a hardened descriptor changes nothing.
///
/// # Errors
/// Returns an error if the plugin requirements form a cycle.
pub fn harden(
    descriptor: &BuildDescriptor,
    registry: &PluginRegistry,
    env_prefix: &str,
) -> Result<HardenReport, EngineError> {
    let mut hardened = descriptor.clone();
    let mut changes = Vec::new();

    let ordered = plugins::topological_order(&descriptor.plugins, registry)?;
    let before: Vec<&str> = descriptor.plugins.iter().map(|p| p.id.as_str()).collect();
    let after: Vec<&str> = ordered.iter().map(|p| p.id.as_str()).collect();
    if before != after {
        changes.push(format!("plugins reordered: {}", after.join(", ")));
    }
    hardened.plugins = ordered;

    for identity in &mut hardened.signing_configs {
        let name = identity.name.clone();
        let env_for = |field: &str| ConfigValue::Env {
            env: env_var_name(env_prefix, &name, field),
        };

        if let Some(ConfigValue::Literal(path)) = &identity.store_file {
            if signing::is_machine_specific(path) {
                let replacement = env_for("storeFile");
                changes.push(format!(
                    "signingConfigs.{name}.storeFile: absolute path -> {}",
                    signing::describe(&replacement)
                ));
                identity.store_file = Some(replacement);
            }
        }
        for (field, slot) in [
            ("storePassword", &mut identity.store_password),
            ("keyPassword", &mut identity.key_password),
        ] {
            if slot.as_ref().is_some_and(Secret::is_plaintext) {
                let replacement = env_for(field);
                changes.push(format!(
                    "signingConfigs.{name}.{field}: literal -> {}",
                    signing::describe(&replacement)
                ));
                *slot = Some(Secret(replacement));
            }
        }
    }

    for change in &changes {
        tracing::info!(change = %change, "hardened");
    }
    Ok(HardenReport {
        descriptor: hardened,
        changes,
    })
}
