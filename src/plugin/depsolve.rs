//! Topological sort over plugin `run_before`/`run_after` rules. The runtime
//! only surfaces rule lists (spec.md section 4.4); depsolving itself is the
//! caller's responsibility, so this lives as a standalone function rather
//! than a `Plugin` method.

use super::Plugin;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Orders `plugins` by `(order asc, name asc)` as a stable tie-break, then
/// applies `run_after` and the inverse of `run_before` as directed edges.
/// A cycle is a permanent failure, not a partial ordering.
pub fn depsolve(plugins: &[Plugin]) -> Result<Vec<String>> {
    let mut by_name: BTreeMap<&str, &Plugin> = BTreeMap::new();
    for plugin in plugins {
        by_name.insert(plugin.name.as_str(), plugin);
    }

    for plugin in plugins {
        for conflict in &plugin.rules.conflicts {
            if by_name.contains_key(conflict.as_str()) {
                return Err(Error::internal(format!(
                    "plugin '{}' conflicts with '{}'; refusing to depsolve",
                    plugin.name, conflict
                )));
            }
        }
    }

    let mut order: Vec<&Plugin> = plugins.iter().collect();
    order.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

    let mut edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    for plugin in &order {
        edges.entry(&plugin.name).or_default();
        indegree.entry(&plugin.name).or_insert(0);
    }

    let mut add_edge = |from: &str, to: &str, edges: &mut BTreeMap<&str, BTreeSet<&str>>, indegree: &mut BTreeMap<&str, usize>| {
        if let (Some(&from_key), Some(&to_key)) = (by_name.get_key_value(from).map(|(k, _)| k), by_name.get_key_value(to).map(|(k, _)| k)) {
            if edges.entry(from_key).or_default().insert(to_key) {
                *indegree.entry(to_key).or_insert(0) += 1;
            }
        }
    };

    for plugin in &order {
        for after in &plugin.rules.run_after {
            add_edge(after.as_str(), &plugin.name, &mut edges, &mut indegree);
        }
        for before in &plugin.rules.run_before {
            add_edge(&plugin.name, before.as_str(), &mut edges, &mut indegree);
        }
    }

    let mut ready: VecDeque<&str> = order
        .iter()
        .filter(|p| indegree.get(p.name.as_str()).copied().unwrap_or(0) == 0)
        .map(|p| p.name.as_str())
        .collect();
    let mut ready_sorted: Vec<&str> = ready.drain(..).collect();
    ready_sorted.sort();
    let mut ready: VecDeque<&str> = ready_sorted.into();

    let mut resolved = Vec::with_capacity(order.len());
    while let Some(name) = ready.pop_front() {
        resolved.push(name.to_string());
        if let Some(targets) = edges.get(name) {
            let mut newly_ready = Vec::new();
            for &target in targets {
                let entry = indegree.get_mut(target).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    newly_ready.push(target);
                }
            }
            newly_ready.sort();
            for target in newly_ready {
                ready.push_back(target);
            }
        }
    }

    if resolved.len() != order.len() {
        return Err(Error::internal("plugin dependency graph contains a cycle"));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_with_rules(name: &str, order: i32, run_after: &[&str], run_before: &[&str]) -> Plugin {
        let mut plugin = Plugin::new(name);
        plugin.order = order;
        plugin.rules.run_after = run_after.iter().map(|s| s.to_string()).collect();
        plugin.rules.run_before = run_before.iter().map(|s| s.to_string()).collect();
        plugin
    }

    #[test]
    fn independent_plugins_sort_by_order_then_name() {
        let plugins = vec![
            plugin_with_rules("zeta", 0, &[], &[]),
            plugin_with_rules("alpha", 0, &[], &[]),
        ];
        assert_eq!(depsolve(&plugins).unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn run_after_orders_dependent_after_dependency() {
        let plugins = vec![
            plugin_with_rules("cros_ec", 0, &["usb"], &[]),
            plugin_with_rules("usb", 0, &[], &[]),
        ];
        assert_eq!(depsolve(&plugins).unwrap(), vec!["usb", "cros_ec"]);
    }

    #[test]
    fn run_before_is_equivalent_to_inverse_run_after() {
        let plugins = vec![
            plugin_with_rules("usb", 0, &[], &["cros_ec"]),
            plugin_with_rules("cros_ec", 0, &[], &[]),
        ];
        assert_eq!(depsolve(&plugins).unwrap(), vec!["usb", "cros_ec"]);
    }

    #[test]
    fn cycle_is_a_permanent_failure() {
        let plugins = vec![
            plugin_with_rules("a", 0, &["b"], &[]),
            plugin_with_rules("b", 0, &["a"], &[]),
        ];
        assert!(depsolve(&plugins).is_err());
    }

    #[test]
    fn conflicting_plugins_are_a_permanent_failure() {
        let mut a = plugin_with_rules("a", 0, &[], &[]);
        a.rules.conflicts.insert("b".to_string());
        let b = plugin_with_rules("b", 0, &[], &[]);
        assert!(depsolve(&[a, b]).is_err());
    }
}
