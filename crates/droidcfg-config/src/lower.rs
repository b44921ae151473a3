//! Lower a parsed Kotlin-DSL syntax tree into a [`BuildDescriptor`].

use std::collections::HashMap;

use droidcfg_sdk::JavaVersion;

use crate::descriptor::{
    BuildDescriptor, BuildTypeConfig, ConfigValue, DescriptorError, PluginReference, Secret,
    Setting, SigningIdentity, SourceRootPointer,
};
use crate::dsl::{self, Expr, Stmt, StmtKind};

/// Where `rootProject.file(...)` paths land relative to the app module.
pub const ROOT_PROJECT_PREFIX: &str = "..";
/// Properties file used by `project.findProperty(...)` lookups.
pub const GRADLE_PROPERTIES: &str = "../gradle.properties";

/// Parse Kotlin-DSL text into a descriptor.
///
/// # Errors
/// Returns an error if the text does not parse or a recognised field holds a
/// value of the wrong shape (e.g. `namespace = 42`).
pub fn parse_kotlin_dsl(text: &str, origin: &str) -> Result<BuildDescriptor, DescriptorError> {
    let stmts = dsl::parse(text).map_err(|e| DescriptorError::Syntax {
        origin: origin.to_owned(),
        line: e.line,
        message: e.message,
    })?;
    let mut lowerer = Lowerer {
        origin,
        descriptor: BuildDescriptor::default(),
        file_vars: HashMap::new(),
        props_vars: HashMap::new(),
    };
    lowerer.walk(&stmts, Ctx::Top)?;
    Ok(lowerer.descriptor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Top,
    Plugins,
    Android,
    CompileOptions,
    KotlinOptions,
    Kotlin,
    DefaultConfig,
    SigningConfigs,
    SigningConfig(usize),
    BuildTypes,
    BuildType(usize),
    Flutter,
}

struct Lowerer<'a> {
    origin: &'a str,
    descriptor: BuildDescriptor,
    /// `val f = rootProject.file("key.properties")` → `f` → `../key.properties`.
    file_vars: HashMap<String, String>,
    /// `val props = Properties()`; the file is filled in by `props.load(...)`.
    props_vars: HashMap<String, Option<String>>,
}

impl Lowerer<'_> {
    fn walk(&mut self, stmts: &[Stmt], ctx: Ctx) -> Result<(), DescriptorError> {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.walk(then_branch, ctx)?;
                    self.walk(else_branch, ctx)?;
                }
                StmtKind::Decl { name, value } => self.declare(name, value),
                StmtKind::Assign { target, value } => {
                    let Some(field) = target.dotted() else {
                        continue;
                    };
                    self.assign(ctx, &field, value, stmt.line)?;
                }
                StmtKind::Expr(expr) => self.expr_stmt(ctx, expr, stmt.line)?,
            }
        }
        Ok(())
    }

    fn declare(&mut self, name: &str, value: &Expr) {
        if value.call_name() == Some("Properties") {
            self.props_vars.insert(name.to_owned(), None);
        } else if let Some(path) = file_path_of(value, &self.file_vars) {
            self.file_vars.insert(name.to_owned(), path);
        }
    }

    fn expr_stmt(&mut self, ctx: Ctx, expr: &Expr, line: usize) -> Result<(), DescriptorError> {
        if self.try_properties_load(expr) {
            return Ok(());
        }
        if ctx == Ctx::Plugins {
            return self.plugin(expr, line);
        }

        let Expr::Call {
            callee,
            args,
            block,
        } = expr
        else {
            return Ok(());
        };

        // `name { ... }` or `create("name") { ... }`.
        if let Some(stmts) = block {
            let name = callee.dotted().unwrap_or_default();
            let arg = expr.first_str_arg();
            return self.enter_block(ctx, &name, arg, stmts, line);
        }

        // Call-style setters: `compileSdkVersion(34)`, `minSdkVersion(21)`.
        let name = callee.dotted().unwrap_or_default();
        match (ctx, name.as_str(), args.first()) {
            (Ctx::Top, "apply", Some(Expr::Str(id))) => {
                self.descriptor.plugins.push(PluginReference {
                    id: id.clone(),
                    line: Some(line),
                });
                Ok(())
            }
            (Ctx::Kotlin, "jvmToolchain", Some(arg)) => {
                self.descriptor.versions.jvm_target = Some(self.java_version(arg, "jvmToolchain", line)?);
                Ok(())
            }
            (Ctx::KotlinOptions, "jvmTarget.set", Some(arg)) => {
                self.descriptor.versions.jvm_target = Some(self.java_version(arg, "jvmTarget", line)?);
                Ok(())
            }
            (_, field, Some(arg)) if !field.is_empty() => self.assign(ctx, field, arg, line),
            _ => Ok(()),
        }
    }

    fn enter_block(
        &mut self,
        ctx: Ctx,
        name: &str,
        arg: Option<&str>,
        stmts: &[Stmt],
        line: usize,
    ) -> Result<(), DescriptorError> {
        let next = match (ctx, name) {
            (Ctx::Top, "plugins") => Ctx::Plugins,
            (Ctx::Top, "android") => {
                if self.descriptor.lines.android.is_none() {
                    self.descriptor.lines.android = Some(line);
                }
                Ctx::Android
            }
            (Ctx::Top, "flutter") => Ctx::Flutter,
            (Ctx::Top, "kotlin") => Ctx::Kotlin,
            (Ctx::Android, "compileOptions") => Ctx::CompileOptions,
            (Ctx::Android, "kotlinOptions") | (Ctx::Kotlin, "compilerOptions") => {
                Ctx::KotlinOptions
            }
            (Ctx::Android, "defaultConfig") => Ctx::DefaultConfig,
            (Ctx::Android, "signingConfigs") => Ctx::SigningConfigs,
            (Ctx::Android, "buildTypes") => Ctx::BuildTypes,
            (Ctx::SigningConfigs, container) => {
                let Some(identity) = container_entry(container, arg) else {
                    return Ok(());
                };
                Ctx::SigningConfig(self.signing_index(identity, line))
            }
            (Ctx::BuildTypes, container) => {
                let Some(build_type) = container_entry(container, arg) else {
                    return Ok(());
                };
                Ctx::BuildType(self.build_type_index(build_type, line))
            }
            _ => {
                tracing::trace!(block = name, line, "skipping block");
                return Ok(());
            }
        };
        self.walk(stmts, next)
    }

    fn signing_index(&mut self, name: &str, line: usize) -> usize {
        let configs = &mut self.descriptor.signing_configs;
        if let Some(idx) = configs.iter().position(|s| s.name == name) {
            return idx;
        }
        configs.push(SigningIdentity {
            line: Some(line),
            ..SigningIdentity::named(name)
        });
        configs.len() - 1
    }

    fn build_type_index(&mut self, name: &str, line: usize) -> usize {
        let types = &mut self.descriptor.build_types;
        if let Some(idx) = types.iter().position(|b| b.name == name) {
            return idx;
        }
        types.push(BuildTypeConfig {
            line: Some(line),
            ..BuildTypeConfig::named(name)
        });
        types.len() - 1
    }

    fn plugin(&mut self, expr: &Expr, line: usize) -> Result<(), DescriptorError> {
        // Peel `version "x"` and `apply false` off the declaration.
        let mut core = expr;
        while let Expr::Infix { lhs, op, rhs } = core {
            if op == "apply" && **rhs == Expr::Bool(false) {
                tracing::debug!(line, "plugin declared with `apply false`; not applied here");
                return Ok(());
            }
            core = lhs.as_ref();
        }

        let id = match (core.call_name(), core) {
            (Some("id"), _) => core.first_str_arg().map(str::to_owned),
            (Some("kotlin"), _) => core
                .first_str_arg()
                .map(|module| format!("org.jetbrains.kotlin.{module}")),
            (Some("alias"), Expr::Call { args, .. }) => args.first().map(ToString::to_string),
            (None, Expr::Ident(name)) => Some(name.clone()),
            (None, Expr::Member { .. }) => core.dotted(),
            _ => None,
        };
        let Some(id) = id else {
            return Err(self.invalid(line, "plugins", format!("unrecognised plugin declaration `{expr}`")));
        };
        self.descriptor.plugins.push(PluginReference {
            id,
            line: Some(line),
        });
        Ok(())
    }

    fn assign(&mut self, ctx: Ctx, field: &str, value: &Expr, line: usize) -> Result<(), DescriptorError> {
        match (ctx, field) {
            (Ctx::Android, "namespace") => {
                self.descriptor.namespace = Some(self.string(value, field, line)?);
                self.descriptor.lines.namespace = Some(line);
            }
            (Ctx::Android, "compileSdk" | "compileSdkVersion") => {
                self.descriptor.versions.compile_sdk = Some(self.setting_u32(value, field, line)?);
            }
            (Ctx::Android, "ndkVersion") => {
                self.descriptor.versions.ndk_version = Some(self.setting_string(value));
            }
            (Ctx::Android, "buildToolsVersion") => {
                self.descriptor.versions.build_tools_version = Some(self.string(value, field, line)?);
            }
            (Ctx::CompileOptions, "sourceCompatibility") => {
                self.descriptor.versions.source_compatibility = Some(self.java_version(value, field, line)?);
            }
            (Ctx::CompileOptions, "targetCompatibility") => {
                self.descriptor.versions.target_compatibility = Some(self.java_version(value, field, line)?);
            }
            (Ctx::KotlinOptions, "jvmTarget") => {
                self.descriptor.versions.jvm_target = Some(self.java_version(value, field, line)?);
            }
            (Ctx::DefaultConfig, "applicationId") => {
                self.descriptor.application_id = Some(self.string(value, field, line)?);
                self.descriptor.lines.application_id = Some(line);
            }
            (Ctx::DefaultConfig, "minSdk" | "minSdkVersion") => {
                self.descriptor.versions.min_sdk = Some(self.setting_u32(value, field, line)?);
            }
            (Ctx::DefaultConfig, "targetSdk" | "targetSdkVersion") => {
                self.descriptor.versions.target_sdk = Some(self.setting_u32(value, field, line)?);
            }
            (Ctx::DefaultConfig, "versionCode") => {
                self.descriptor.versions.version_code = Some(self.setting_u32(value, field, line)?);
            }
            (Ctx::DefaultConfig, "versionName") => {
                self.descriptor.versions.version_name = Some(self.setting_string(value));
            }
            (Ctx::DefaultConfig, "signingConfig") => {
                self.descriptor.default_signing_config = self.signing_ref(value, line)?;
            }
            (Ctx::SigningConfig(idx), _) => self.signing_field(idx, field, value),
            (Ctx::BuildType(idx), _) => self.build_type_field(idx, field, value, line)?,
            (Ctx::Flutter, "source") => {
                self.descriptor.source_root = Some(SourceRootPointer {
                    path: self.string(value, field, line)?,
                });
            }
            _ => tracing::trace!(field, line, "ignoring assignment"),
        }
        Ok(())
    }

    fn signing_field(&mut self, idx: usize, field: &str, value: &Expr) {
        let store_file = (field == "storeFile").then(|| self.store_file_value(value)).flatten();
        let other = self.config_value(value);
        let Some(identity) = self.descriptor.signing_configs.get_mut(idx) else {
            return;
        };
        match field {
            "storeFile" => identity.store_file = store_file,
            "storePassword" => identity.store_password = other.map(Secret),
            "keyPassword" => identity.key_password = other.map(Secret),
            "keyAlias" => identity.key_alias = other,
            _ => {}
        }
    }

    fn build_type_field(&mut self, idx: usize, field: &str, value: &Expr, line: usize) -> Result<(), DescriptorError> {
        let signing = if field == "signingConfig" {
            Some(self.signing_ref(value, line)?)
        } else {
            None
        };
        let flag = match value {
            Expr::Bool(b) => Some(*b),
            _ => None,
        };
        let Some(build_type) = self.descriptor.build_types.get_mut(idx) else {
            return Ok(());
        };
        match field {
            "signingConfig" => build_type.signing_config = signing.flatten(),
            "isMinifyEnabled" | "minifyEnabled" => build_type.minify_enabled = flag,
            "isShrinkResources" | "shrinkResources" => build_type.shrink_resources = flag,
            "isDebuggable" | "debuggable" => build_type.debuggable = flag,
            _ => {}
        }
        Ok(())
    }

    /// Recognise `props.load(FileInputStream(f))` and bind `props` to the file.
    fn try_properties_load(&mut self, expr: &Expr) -> bool {
        let Expr::Call { callee, args, .. } = expr else {
            return false;
        };
        let Expr::Member { target, name } = callee.as_ref() else {
            return false;
        };
        let Expr::Ident(var) = target.as_ref() else {
            return false;
        };
        if name != "load" || !self.props_vars.contains_key(var) {
            return false;
        }
        let path = args.first().and_then(|arg| file_path_of(arg, &self.file_vars));
        self.props_vars.insert(var.clone(), path);
        true
    }

    /// `file("...")`, `file(props["storeFile"] as String)`, `props["storeFile"]?.let { file(it) }`.
    fn store_file_value(&self, value: &Expr) -> Option<ConfigValue> {
        match value {
            Expr::Null => None,
            Expr::Call { callee, args, block } => {
                let name = callee.dotted().unwrap_or_default();
                if name == "file" || name == "rootProject.file" || name == "project.file" {
                    let path = args.first()?;
                    return match (name.as_str(), path) {
                        ("rootProject.file", Expr::Str(p)) => {
                            Some(ConfigValue::literal(format!("{ROOT_PROJECT_PREFIX}/{p}")))
                        }
                        _ => self.config_value(path),
                    };
                }
                if let (Expr::Member { target, name }, Some(_)) = (callee.as_ref(), block) {
                    if name == "let" {
                        return self.config_value(target);
                    }
                }
                self.config_value(value)
            }
            _ => self.config_value(value),
        }
    }

    fn config_value(&self, value: &Expr) -> Option<ConfigValue> {
        let resolved = match value {
            Expr::Null => return None,
            Expr::Str(s) => ConfigValue::Literal(s.clone()),
            Expr::Infix { lhs, op, .. } if op == "as" || op == "?:" => return self.config_value(lhs),
            Expr::Index { target, index } => match (target.as_ref(), index.as_ref()) {
                (Expr::Ident(var), Expr::Str(key)) => self.property(var, key),
                _ => opaque(value),
            },
            Expr::Call { callee, args, .. } => {
                let name = callee.dotted().unwrap_or_default();
                match (name.as_str(), args.first()) {
                    ("System.getenv", Some(Expr::Str(env))) => ConfigValue::Env { env: env.clone() },
                    ("project.findProperty" | "findProperty" | "project.property" | "property", Some(Expr::Str(key))) => {
                        ConfigValue::Property {
                            property: key.clone(),
                            file: GRADLE_PROPERTIES.to_owned(),
                        }
                    }
                    (_, Some(Expr::Str(key))) if name.ends_with(".getProperty") => {
                        let var = name.trim_end_matches(".getProperty");
                        self.property(var, key)
                    }
                    (_, None) if name.ends_with(".toString") => {
                        let Expr::Member { target, .. } = callee.as_ref() else {
                            return Some(opaque(value));
                        };
                        return self.config_value(target);
                    }
                    _ => opaque(value),
                }
            }
            _ => opaque(value),
        };
        Some(resolved)
    }

    fn property(&self, var: &str, key: &str) -> ConfigValue {
        match self.props_vars.get(var) {
            Some(Some(file)) => ConfigValue::Property {
                property: key.to_owned(),
                file: file.clone(),
            },
            _ => ConfigValue::Opaque {
                expr: format!("{var}[{key:?}]"),
            },
        }
    }

    fn signing_ref(&self, value: &Expr, line: usize) -> Result<Option<String>, DescriptorError> {
        let name = match value {
            Expr::Null => return Ok(None),
            Expr::Call { callee, .. } => match callee.dotted().as_deref() {
                Some("signingConfigs.getByName" | "signingConfigs.named" | "signingConfigs.findByName") => {
                    value.first_str_arg().map(str::to_owned)
                }
                _ => None,
            },
            Expr::Index { target, index } => match (target.as_ref(), index.as_ref()) {
                (Expr::Ident(container), Expr::Str(name)) if container == "signingConfigs" => Some(name.clone()),
                _ => None,
            },
            Expr::Member { target, name } if **target == Expr::Ident("signingConfigs".to_owned()) => {
                Some(name.clone())
            }
            _ => None,
        };
        match name {
            Some(name) => Ok(Some(name)),
            None => Err(self.invalid(
                line,
                "signingConfig",
                format!("expected signingConfigs.getByName(\"name\"), found `{value}`"),
            )),
        }
    }

    fn string(&self, value: &Expr, field: &str, line: usize) -> Result<String, DescriptorError> {
        match value {
            Expr::Str(s) => Ok(s.clone()),
            other => Err(self.invalid(line, field, format!("expected a string literal, found `{other}`"))),
        }
    }

    fn setting_u32(&self, value: &Expr, field: &str, line: usize) -> Result<Setting<u32>, DescriptorError> {
        match value {
            Expr::Int(raw) => u32::try_from(*raw)
                .map(Setting::Literal)
                .map_err(|_| self.invalid(line, field, format!("{raw} is not a valid version number"))),
            Expr::Str(raw) => raw
                .parse()
                .map(Setting::Literal)
                .map_err(|_| self.invalid(line, field, format!("\"{raw}\" is not a number"))),
            Expr::Call { callee, args, .. } if args.is_empty() => match callee.as_ref() {
                Expr::Member { target, name } if name == "toInt" => self.setting_u32(target, field, line),
                _ => Ok(Setting::Opaque {
                    expr: value.to_string(),
                }),
            },
            _ => Ok(provided(value).unwrap_or_else(|| Setting::Opaque {
                expr: value.to_string(),
            })),
        }
    }

    fn setting_string(&self, value: &Expr) -> Setting<String> {
        match value {
            Expr::Str(s) => Setting::Literal(s.clone()),
            Expr::Call { callee, args, .. } if args.is_empty() => match callee.as_ref() {
                Expr::Member { target, name } if name == "toString" => self.setting_string(target),
                _ => Setting::Opaque {
                    expr: value.to_string(),
                },
            },
            _ => provided(value).unwrap_or_else(|| Setting::Opaque {
                expr: value.to_string(),
            }),
        }
    }

    fn java_version(&self, value: &Expr, field: &str, line: usize) -> Result<JavaVersion, DescriptorError> {
        let raw = match value {
            Expr::Str(s) => s.clone(),
            Expr::Int(n) => n.to_string(),
            Expr::Call { callee, args, .. } if args.is_empty() => match callee.as_ref() {
                Expr::Member { target, name } if name == "toString" => return self.java_version(target, field, line),
                _ => value.to_string(),
            },
            other => other.dotted().unwrap_or_else(|| other.to_string()),
        };
        raw.parse()
            .map_err(|e: droidcfg_sdk::SdkError| self.invalid(line, field, e.to_string()))
    }

    fn invalid(&self, line: usize, field: &str, message: String) -> DescriptorError {
        DescriptorError::InvalidValue {
            origin: self.origin.to_owned(),
            line,
            field: field.to_owned(),
            message,
        }
    }
}

/// Entry name for a container block: `release { }`, `create("release") { }`, ...
fn container_entry<'e>(callee: &'e str, arg: Option<&'e str>) -> Option<&'e str> {
    match callee {
        "create" | "register" | "getByName" | "maybeCreate" | "named" => arg,
        "all" | "configureEach" | "" => None,
        other if !other.contains('.') => Some(other),
        _ => None,
    }
}

/// `flutter.minSdkVersion` → provided by `flutter` under `minSdkVersion`.
fn provided<T>(value: &Expr) -> Option<Setting<T>> {
    let dotted = value.dotted()?;
    let (provider, key) = dotted.split_once('.')?;
    if key.contains('.') {
        return None;
    }
    Some(Setting::Provided {
        provider: provider.to_owned(),
        key: key.to_owned(),
    })
}

fn opaque(value: &Expr) -> ConfigValue {
    ConfigValue::Opaque {
        expr: value.to_string(),
    }
}

/// Resolve a file-valued expression to a path relative to the module directory.
fn file_path_of(expr: &Expr, file_vars: &HashMap<String, String>) -> Option<String> {
    match expr {
        Expr::Ident(var) => file_vars.get(var).cloned(),
        Expr::Call { callee, args, .. } => {
            let name = callee.dotted();
            match (name.as_deref(), args.first()) {
                (Some("rootProject.file"), Some(Expr::Str(p))) => Some(format!("{ROOT_PROJECT_PREFIX}/{p}")),
                (Some("file" | "project.file"), Some(Expr::Str(p))) => Some(p.clone()),
                (Some("FileInputStream" | "File"), Some(inner)) => file_path_of(inner, file_vars),
                _ => match callee.as_ref() {
                    Expr::Member { target, name } if name == "inputStream" || name == "reader" => {
                        file_path_of(target, file_vars)
                    }
                    _ => None,
                },
            }
        }
        _ => None,
    }
}
