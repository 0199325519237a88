//! Environment overrides of the merged configuration tree.

use serde_yaml::Value;
use tracing::warn;

/// Prefix of variables that override configuration keys.
pub const ENV_PREFIX: &str = "EH_METRICS_";

/// Deep-merges `overlay` into `base`. Mappings merge key by key, anything
/// else replaces.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Resolves one path segment against a node, matching mapping keys without
/// regard to case and sequence entries by index.
fn child<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Mapping(mapping) => mapping
            .iter_mut()
            .find(|(key, _)| {
                key.as_str()
                    .is_some_and(|key| key.eq_ignore_ascii_case(segment))
            })
            .map(|(_, value)| value),
        Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

/// Parses a raw variable as a scalar, keeping it a string where the tree
/// already holds one.
fn scalar(current: &Value, raw: &str) -> Value {
    if current.is_string() {
        return Value::String(raw.to_string());
    }

    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_path(node: &mut Value, path: &[&str], raw: &str) -> bool {
    match path.split_first() {
        None => {
            *node = scalar(node, raw);
            true
        }
        Some((segment, rest)) => child(node, segment).is_some_and(|next| set_path(next, rest, raw)),
    }
}

/// Applies every `EH_METRICS_*` variable to the tree. Underscores separate
/// path segments, so `EH_METRICS_COLLECTOR_CONCURRENCY` sets
/// `collector.concurrency`.
pub(crate) fn apply<I>(tree: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in vars {
        let Some(path) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        let path: Vec<&str> = path.split('_').filter(|s| !s.is_empty()).collect();
        if path.is_empty() || !set_path(tree, &path, &raw) {
            warn!(variable = %name, "ignoring environment override for unknown key");
        }
    }
}
