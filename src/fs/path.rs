use crate::error::{Result, RouteFsError};

/// Split an absolute path into its components. Doubled and trailing
/// slashes collapse; relative paths and `.`/`..` segments are rejected.
pub(crate) fn split(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(RouteFsError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" => continue,
            "." | ".." => return Err(RouteFsError::InvalidPath(path.to_string())),
            c => parts.push(c),
        }
    }
    Ok(parts)
}

/// Parent components and leaf name, for operations that add or remove a
/// directory entry. The root itself has no parent.
pub(crate) fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = split(path)?;
    match parts.pop() {
        Some(leaf) => Ok((parts, leaf)),
        None => Err(RouteFsError::InvalidPath(path.to_string())),
    }
}
