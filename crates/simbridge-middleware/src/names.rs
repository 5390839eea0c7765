//! Topic name resolution.
//!
//! Names follow the graph-resource conventions the bridge's clients already
//! use:
//!
//! | Written as | Resolves to |
//! |---|---|
//! | `~wheel_cmd` | `/<node_name>/wheel_cmd` |
//! | `joy` | `/joy` |
//! | `/camera/image` | `/camera/image` |

use simbridge_types::BridgeError;

/// Resolve `name` relative to the node called `node_name`.
///
/// # Errors
///
/// Returns [`BridgeError::Config`] for empty names or names containing
/// characters other than ASCII alphanumerics, `_` and `/`.
pub fn resolve_name(node_name: &str, name: &str) -> Result<String, BridgeError> {
    let node = node_name.trim_matches('/');
    if node.is_empty() {
        return Err(BridgeError::Config("node name must not be empty".to_string()));
    }
    validate(node)?;

    let resolved = if let Some(private) = name.strip_prefix('~') {
        let private = private.trim_start_matches('/');
        if private.is_empty() {
            return Err(BridgeError::Config(format!("invalid private name {name:?}")));
        }
        format!("/{node}/{private}")
    } else if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if resolved.len() <= 1 || resolved.ends_with('/') || resolved.contains("//") {
        return Err(BridgeError::Config(format!("invalid topic name {name:?}")));
    }
    validate(&resolved)?;
    Ok(resolved)
}

fn validate(name: &str) -> Result<(), BridgeError> {
    match name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '/'))
    {
        Some(bad) => Err(BridgeError::Config(format!(
            "invalid character {bad:?} in name {name:?}"
        ))),
        None => Ok(()),
    }
}
