//! Topological ordering, cycle detection, and reverse-dependency trees.
//!
//! Traversal is depth-first with explicit white/grey/black coloring:
//! reaching a grey node names a cycle; reaching a node that isn't
//! registered, or whose declared version doesn't satisfy the requirement,
//! is a missing-dependency error. A cycle or missing-dep involving `P`
//! excludes `P` and every plugin that transitively requires it; unrelated
//! plugins still resolve.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ResolverError;
use crate::manifest::PluginManifest;
use crate::requirement::Requirement;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// The outcome of a resolution pass: the plugins that may be loaded, in
/// dependency order, and one error per excluded plugin.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Names in a valid topological order (dependencies precede dependents).
    pub order: Vec<String>,
    /// One error per excluded plugin, keyed by that plugin's name.
    pub errors: HashMap<String, ResolverError>,
}

/// Computes the topological load order over `plugins`, visited in
/// `insertion_order`. Ties among mutually independent plugins are broken by
/// `insertion_order`, so the result is deterministic for a fixed scan.
pub fn resolve(
    plugins: &HashMap<String, PluginManifest>,
    insertion_order: &[String],
) -> ResolveReport {
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut report = ResolveReport::default();

    for name in insertion_order {
        if !plugins.contains_key(name) {
            continue;
        }
        if matches!(colors.get(name), None | Some(Color::White)) {
            let _ = visit(name, plugins, &mut colors, &mut report);
        }
    }
    report
}

fn visit(
    name: &str,
    plugins: &HashMap<String, PluginManifest>,
    colors: &mut HashMap<String, Color>,
    report: &mut ResolveReport,
) -> Result<(), ResolverError> {
    match colors.get(name) {
        Some(Color::Black) => {
            return match report.errors.get(name) {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
        }
        Some(Color::Grey) => return Err(ResolverError::Cycle(name.to_string())),
        _ => {}
    }

    colors.insert(name.to_string(), Color::Grey);
    let manifest = &plugins[name];

    for raw in &manifest.dependencies {
        if let Err(e) = visit_dependency(name, raw, plugins, colors, report) {
            colors.insert(name.to_string(), Color::Black);
            report.errors.insert(name.to_string(), e.clone());
            return Err(e);
        }
    }

    colors.insert(name.to_string(), Color::Black);
    report.order.push(name.to_string());
    Ok(())
}

fn visit_dependency(
    name: &str,
    raw: &str,
    plugins: &HashMap<String, PluginManifest>,
    colors: &mut HashMap<String, Color>,
    report: &mut ResolveReport,
) -> Result<(), ResolverError> {
    let req = Requirement::parse(raw).ok_or_else(|| ResolverError::MissingDep {
        plugin: name.to_string(),
        requirement: raw.to_string(),
    })?;

    let target = plugins.get(&req.name).ok_or_else(|| ResolverError::MissingDep {
        plugin: name.to_string(),
        requirement: req.to_string(),
    })?;

    if !req.is_satisfied_by(&target.version) {
        return Err(ResolverError::MissingDep {
            plugin: name.to_string(),
            requirement: req.to_string(),
        });
    }

    visit(&req.name, plugins, colors, report)
}

/// Computes `{ P : target ∈ deps*(P) }`, the transitive reverse-dependency
/// closure, intersected with `topo_order` and returned in that order.
pub fn reverse_dependencies(
    target: &str,
    topo_order: &[String],
    plugins: &HashMap<String, PluginManifest>,
) -> Vec<String> {
    let mut reverse_edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, manifest) in plugins {
        for raw in &manifest.dependencies {
            let Some(req) = Requirement::parse(raw) else {
                continue;
            };
            let Some((target_name, _)) = plugins.get_key_value(req.name.as_str()) else {
                continue;
            };
            reverse_edges
                .entry(target_name.as_str())
                .or_default()
                .push(name.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(target);
    while let Some(current) = queue.pop_front() {
        if let Some(dependents) = reverse_edges.get(current) {
            for dependent in dependents {
                if visited.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
    }

    topo_order
        .iter()
        .filter(|name| visited.contains(name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, version: &str, deps: &[&str]) -> PluginManifest {
        PluginManifest {
            name: name.to_string(),
            path: std::path::PathBuf::from(name),
            version: crate::version::Version::parse(version).unwrap(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn registry(entries: Vec<PluginManifest>) -> (HashMap<String, PluginManifest>, Vec<String>) {
        let order: Vec<String> = entries.iter().map(|m| m.name.clone()).collect();
        let map = entries.into_iter().map(|m| (m.name.clone(), m)).collect();
        (map, order)
    }

    #[test]
    fn bring_up_ordering() {
        let (plugins, order) = registry(vec![
            manifest("a", "0.0.0", &[]),
            manifest("b", "0.0.0", &["a"]),
            manifest("c", "0.0.0", &["b"]),
        ]);
        let report = resolve(&plugins, &order);
        assert_eq!(report.order, vec!["a", "b", "c"]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn two_cycle_excludes_both() {
        let (plugins, order) = registry(vec![
            manifest("a", "0.0.0", &["b"]),
            manifest("b", "0.0.0", &["a"]),
        ]);
        let report = resolve(&plugins, &order);
        assert!(report.order.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert!(
            report
                .errors
                .values()
                .all(|e| matches!(e, ResolverError::Cycle(_)))
        );
    }

    #[test]
    fn version_constraint_excludes_dependent_only() {
        let (plugins, order) = registry(vec![
            manifest("core", "1.0.0", &[]),
            manifest("sec", "1.0.0", &["core>=2.0.0"]),
        ]);
        let report = resolve(&plugins, &order);
        assert_eq!(report.order, vec!["core"]);
        assert!(matches!(
            report.errors.get("sec"),
            Some(ResolverError::MissingDep { .. })
        ));
    }

    #[test]
    fn unknown_dependency_is_missing_dep() {
        let (plugins, order) = registry(vec![manifest("a", "0.0.0", &["ghost"])]);
        let report = resolve(&plugins, &order);
        assert!(report.order.is_empty());
        assert!(matches!(
            report.errors.get("a"),
            Some(ResolverError::MissingDep { .. })
        ));
    }

    #[test]
    fn cascading_exclusion_reaches_transitive_dependents() {
        let (plugins, order) = registry(vec![
            manifest("a", "0.0.0", &["ghost"]),
            manifest("b", "0.0.0", &["a"]),
            manifest("c", "0.0.0", &["b"]),
        ]);
        let report = resolve(&plugins, &order);
        assert!(report.order.is_empty());
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn reverse_dependency_tree_is_transitive_and_ordered() {
        let (plugins, order) = registry(vec![
            manifest("a", "0.0.0", &[]),
            manifest("b", "0.0.0", &["a"]),
            manifest("c", "0.0.0", &["b"]),
            manifest("d", "0.0.0", &[]),
        ]);
        let report = resolve(&plugins, &order);
        let rev = reverse_dependencies("a", &report.order, &plugins);
        assert_eq!(rev, vec!["b", "c"]);
    }
}
