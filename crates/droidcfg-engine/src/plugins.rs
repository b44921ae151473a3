//! Plugin set resolution, ordering checks, and topological reordering.

use std::collections::HashMap;

use serde::Serialize;

use droidcfg_config::descriptor::PluginReference;
use droidcfg_config::PluginSpec;

use crate::error::EngineError;
use crate::registry::PluginRegistry;

/// A declared plugin matched against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivatedPlugin {
    /// Canonical registry id.
    pub id: String,
    /// The identifier as written, e.g. `kotlin-android`.
    pub declared_as: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// DSL block this plugin contributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// A problem with the declared plugin list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginIssue {
    Unknown {
        id: String,
        line: Option<usize>,
        location: String,
    },
    Duplicate {
        id: String,
        line: Option<usize>,
        first: String,
        second: String,
    },
    Missing {
        id: String,
        line: Option<usize>,
        location: String,
        requires: String,
    },
    Order {
        id: String,
        line: Option<usize>,
        location: String,
        requires: String,
    },
}

impl PluginIssue {
    /// Lint rule id for this issue.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "unknown-plugin",
            Self::Duplicate { .. } => "duplicate-plugin",
            Self::Missing { .. } | Self::Order { .. } => "plugin-order",
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Unknown { line, .. }
            | Self::Duplicate { line, .. }
            | Self::Missing { line, .. }
            | Self::Order { line, .. } => *line,
        }
    }

    pub fn into_error(self, registry: &PluginRegistry) -> EngineError {
        match self {
            Self::Unknown { id, location, .. } => EngineError::UnknownPlugin {
                id,
                location,
                available: registry.available(),
            },
            Self::Duplicate {
                id, first, second, ..
            } => EngineError::DuplicatePlugin { id, first, second },
            Self::Missing {
                id,
                location,
                requires,
                ..
            } => EngineError::MissingRequiredPlugin {
                id,
                location,
                requires,
            },
            Self::Order {
                id,
                location,
                requires,
                ..
            } => EngineError::PluginOrder {
                id,
                location,
                requires,
            },
        }
    }
}

/// Human-readable position of a declared plugin.
fn location(plugin: &PluginReference, index: usize) -> String {
    match plugin.line {
        Some(line) => format!("line {line}"),
        None => format!("plugin #{}", index.saturating_add(1)),
    }
}

/// Match every declared plugin against the registry and collect all issues.
///
/// Plugins with issues of their own (unknown, duplicate) are left out of the
/// activated list; ordering issues keep the plugin.
pub fn analyze(
    declared: &[PluginReference],
    registry: &PluginRegistry,
) -> (Vec<ActivatedPlugin>, Vec<PluginIssue>) {
    let mut activated = Vec::new();
    let mut issues = Vec::new();
    let mut seen: HashMap<&str, String> = HashMap::new();
    let specs: Vec<Option<&PluginSpec>> = declared.iter().map(|p| registry.get(&p.id)).collect();

    for (index, (plugin, spec)) in declared.iter().zip(&specs).enumerate() {
        let here = location(plugin, index);
        let Some(spec) = spec else {
            issues.push(PluginIssue::Unknown {
                id: plugin.id.clone(),
                line: plugin.line,
                location: here,
            });
            continue;
        };
        if let Some(first) = seen.get(spec.id.as_str()) {
            issues.push(PluginIssue::Duplicate {
                id: spec.id.clone(),
                line: plugin.line,
                first: first.clone(),
                second: here,
            });
            continue;
        }
        seen.insert(spec.id.as_str(), here.clone());

        let (before, after) = specs.split_at(index);
        let after = after.get(1..).unwrap_or_default();
        for requirement in &spec.requires {
            let met = |candidates: &[Option<&PluginSpec>]| {
                candidates
                    .iter()
                    .flatten()
                    .any(|c| registry.satisfies(c, requirement))
            };
            if met(before) {
                continue;
            }
            let issue = if met(after) {
                PluginIssue::Order {
                    id: spec.id.clone(),
                    line: plugin.line,
                    location: here.clone(),
                    requires: requirement.clone(),
                }
            } else {
                PluginIssue::Missing {
                    id: spec.id.clone(),
                    line: plugin.line,
                    location: here.clone(),
                    requires: requirement.clone(),
                }
            };
            issues.push(issue);
        }

        activated.push(ActivatedPlugin {
            id: spec.id.clone(),
            declared_as: plugin.id.clone(),
            line: plugin.line,
            extension: spec.extension.clone(),
        });
    }

    (activated, issues)
}

/// Resolve the declared plugins into the activated set.
///
/// # Errors
/// Returns the first issue found: unknown identifier, duplicate, missing
/// requirement, or a requirement declared too late.
pub fn resolve_plugins(
    declared: &[PluginReference],
    registry: &PluginRegistry,
) -> Result<Vec<ActivatedPlugin>, EngineError> {
    let (activated, issues) = analyze(declared, registry);
    if let Some(issue) = issues.into_iter().next() {
        return Err(issue.into_error(registry));
    }
    tracing::debug!(count = activated.len(), "resolved plugin set");
    Ok(activated)
}

/// Reorder plugins so each one follows everything it requires.
///
/// Duplicates are dropped (first declaration wins) and plugins unknown to the
/// registry keep their relative position. Among plugins with no ordering
/// constraint between them, declaration order is preserved.
///
/// # Algorithm
/// DFS over declaration order with three-colour marking (white, grey, black);
/// a requirement is visited before the plugin that needs it and a grey node
/// reached again is a cycle.
///
/// # Errors
/// Returns an error if the registry's requirements form a cycle among the
/// declared plugins.
pub fn topological_order(
    declared: &[PluginReference],
    registry: &PluginRegistry,
) -> Result<Vec<PluginReference>, EngineError> {
    let mut nodes: Vec<(&PluginReference, Option<&PluginSpec>)> = Vec::new();
    for plugin in declared {
        let spec = registry.get(&plugin.id);
        let key = spec.map_or(plugin.id.as_str(), |s| s.id.as_str());
        let duplicate = nodes.iter().any(|(p, s)| {
            s.map_or(p.id.as_str(), |s| s.id.as_str()) == key
        });
        if !duplicate {
            nodes.push((plugin, spec));
        }
    }

    let edges: Vec<Vec<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, (_, spec))| {
            let Some(spec) = spec else {
                return Vec::new();
            };
            let mut deps = Vec::new();
            for requirement in &spec.requires {
                for (j, (_, other)) in nodes.iter().enumerate() {
                    if j != i
                        && other.is_some_and(|o| registry.satisfies(o, requirement))
                        && !deps.contains(&j)
                    {
                        deps.push(j);
                    }
                }
            }
            deps
        })
        .collect();

    let mut color = vec![Color::White; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = Vec::new();
    for start in 0..nodes.len() {
        visit(start, &nodes, &edges, &mut color, &mut order, &mut stack)?;
    }

    Ok(order
        .into_iter()
        .filter_map(|i| nodes.get(i).map(|(p, _)| (*p).clone()))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

fn visit(
    node: usize,
    nodes: &[(&PluginReference, Option<&PluginSpec>)],
    edges: &[Vec<usize>],
    color: &mut [Color],
    order: &mut Vec<usize>,
    stack: &mut Vec<usize>,
) -> Result<(), EngineError> {
    let name = |i: usize| nodes.get(i).map_or_else(String::new, |(p, _)| p.id.clone());
    match color.get(node).copied() {
        Some(Color::Black) | None => return Ok(()),
        Some(Color::Grey) => {
            let start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = stack.get(start..).unwrap_or_default().iter().map(|&n| name(n)).collect();
            cycle.push(name(node));
            return Err(EngineError::PluginCycle {
                cycle: cycle.join(" -> "),
            });
        }
        Some(Color::White) => {}
    }

    if let Some(c) = color.get_mut(node) {
        *c = Color::Grey;
    }
    stack.push(node);
    for &dep in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
        visit(dep, nodes, edges, color, order, stack)?;
    }
    stack.pop();
    if let Some(c) = color.get_mut(node) {
        *c = Color::Black;
    }
    order.push(node);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn refs(ids: &[&str]) -> Vec<PluginReference> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| PluginReference {
                id: (*id).to_owned(),
                line: Some(i + 2),
            })
            .collect()
    }

    fn ids(plugins: &[PluginReference]) -> Vec<&str> {
        plugins.iter().map(|p| p.id.as_str()).collect()
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::builtin().unwrap()
    }

    const FLUTTER_APP: [&str; 3] = [
        "com.android.application",
        "kotlin-android",
        "dev.flutter.flutter-gradle-plugin",
    ];

    #[test]
    fn flutter_app_resolves() {
        let activated = resolve_plugins(&refs(&FLUTTER_APP), &registry()).unwrap();
        assert_eq!(activated.len(), 3);
        let kotlin = activated.get(1).unwrap();
        assert_eq!(kotlin.id, "org.jetbrains.kotlin.android");
        assert_eq!(kotlin.declared_as, "kotlin-android");
        assert_eq!(
            activated.last().unwrap().extension.as_deref(),
            Some("flutter")
        );
    }

    #[test]
    fn unknown_plugin_is_fatal() {
        let err = resolve_plugins(&refs(&["com.android.application", "com.example.nope"]), &registry())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("com.example.nope"), "got: {msg}");
        assert!(msg.contains("line 3"), "got: {msg}");
    }

    #[test]
    fn alias_duplicates_are_detected() {
        let declared = refs(&[
            "com.android.application",
            "kotlin-android",
            "org.jetbrains.kotlin.android",
        ]);
        let (_, issues) = analyze(&declared, &registry());
        assert_eq!(
            issues,
            vec![PluginIssue::Duplicate {
                id: "org.jetbrains.kotlin.android".to_owned(),
                line: Some(4),
                first: "line 3".to_owned(),
                second: "line 4".to_owned(),
            }]
        );
    }

    #[test]
    fn framework_before_kotlin_is_an_order_violation() {
        let declared = refs(&[
            "com.android.application",
            "dev.flutter.flutter-gradle-plugin",
            "kotlin-android",
        ]);
        let (activated, issues) = analyze(&declared, &registry());
        assert_eq!(activated.len(), 3);
        assert_eq!(issues.len(), 1);
        let issue = issues.first().unwrap();
        assert_eq!(issue.rule(), "plugin-order");
        assert!(matches!(issue, PluginIssue::Order { requires, .. } if requires == "org.jetbrains.kotlin.android"));
        let err = resolve_plugins(&declared, &registry()).unwrap_err();
        assert!(err.to_string().contains("must be applied after"));
    }

    #[test]
    fn missing_platform_plugin() {
        let (_, issues) = analyze(&refs(&["kotlin-android"]), &registry());
        assert!(matches!(
            issues.first(),
            Some(PluginIssue::Missing { requires, .. }) if requires == "android-platform"
        ));
    }

    #[test]
    fn library_module_satisfies_platform() {
        assert!(resolve_plugins(&refs(&["com.android.library", "kotlin-android"]), &registry()).is_ok());
    }

    #[test]
    fn toml_plugins_use_positions() {
        let declared = vec![PluginReference::new("nope")];
        let err = resolve_plugins(&declared, &registry()).unwrap_err();
        assert!(err.to_string().contains("plugin #1"));
    }

    #[test]
    fn topological_order_fixes_misordering() {
        let declared = refs(&[
            "dev.flutter.flutter-gradle-plugin",
            "kotlin-android",
            "com.android.application",
        ]);
        let ordered = topological_order(&declared, &registry()).unwrap();
        assert_eq!(
            ids(&ordered),
            vec![
                "com.android.application",
                "kotlin-android",
                "dev.flutter.flutter-gradle-plugin"
            ]
        );
        assert!(resolve_plugins(&ordered, &registry()).is_ok());
    }

    #[test]
    fn topological_order_is_stable_and_dedups() {
        let declared = refs(&[
            "com.android.application",
            "com.google.gms.google-services",
            "kotlin-android",
            "com.android.application",
            "com.example.unknown",
            "dev.flutter.flutter-gradle-plugin",
        ]);
        let ordered = topological_order(&declared, &registry()).unwrap();
        assert_eq!(
            ids(&ordered),
            vec![
                "com.android.application",
                "com.google.gms.google-services",
                "kotlin-android",
                "com.example.unknown",
                "dev.flutter.flutter-gradle-plugin"
            ]
        );
    }

    #[test]
    fn requirement_cycles_are_reported() {
        let a = PluginSpec {
            id: "com.example.a".to_owned(),
            description: String::new(),
            aliases: Vec::new(),
            requires: vec!["com.example.b".to_owned()],
            provides: Vec::new(),
            extension: None,
        };
        let mut b = a.clone();
        b.id = "com.example.b".to_owned();
        b.requires = vec!["com.example.a".to_owned()];
        let registry = PluginRegistry::with_extra(&[a, b]).unwrap();
        let err = topological_order(&refs(&["com.example.a", "com.example.b"]), &registry).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"), "got: {msg}");
        assert!(msg.contains("com.example.a -> com.example.b -> com.example.a"), "got: {msg}");
    }

    proptest! {
        #[test]
        fn any_permutation_reorders_into_a_valid_set(perm in Just(FLUTTER_APP.to_vec()).prop_shuffle()) {
            let ordered = topological_order(&refs(&perm), &registry()).unwrap();
            prop_assert!(resolve_plugins(&ordered, &registry()).is_ok());
            prop_assert_eq!(ordered.len(), 3);
        }
    }
}
