//! Volume identity on a NetApp filer.

use std::fmt;

use crate::error::{Result, StorageError};

/// Identity of a NetApp volume: its junction path, optionally qualified by
/// the node hosting it (`node:/junction/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    /// Hosting node, when the caller pinned one
    pub node_name: Option<String>,
    /// Junction path in the filer namespace
    pub junction_path: String,
}

impl VolumeKey {
    /// Parse a volume key.
    ///
    /// The part before the first `:` is a node name only when what follows
    /// is an absolute path; anything else is taken as a bare junction path.
    pub fn parse(volume_name: &str) -> Self {
        match volume_name.split_once(':') {
            Some((node, path)) if !node.is_empty() && path.starts_with('/') => Self {
                node_name: Some(node.to_string()),
                junction_path: path.to_string(),
            },
            _ => Self {
                node_name: None,
                junction_path: volume_name.to_string(),
            },
        }
    }

    /// Parse a key that must name a mountable location.
    pub fn parse_absolute(volume_name: &str) -> Result<Self> {
        let key = Self::parse(volume_name);
        if key.junction_path.starts_with('/') {
            Ok(key)
        } else {
            Err(StorageError::InvalidInput(format!(
                "Junction path must be absolute: {}",
                volume_name
            )))
        }
    }

    /// Filer-native volume name derived from the junction path.
    ///
    /// Every character that is not alphanumeric becomes `_`, and leading
    /// separators are dropped: `/ORA/dbs00/TOTO` becomes `ORA_dbs00_TOTO`.
    pub fn derived_volume_name(&self) -> String {
        let sanitized: String = self
            .junction_path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        sanitized.trim_start_matches('_').to_string()
    }
}

impl fmt::Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_name {
            Some(node) => write!(f, "{}:{}", node, self.junction_path),
            None => f.write_str(&self.junction_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_path() {
        let key = VolumeKey::parse("/ORA/dbs00/TOTO");
        assert_eq!(key.node_name, None);
        assert_eq!(key.junction_path, "/ORA/dbs00/TOTO");
    }

    #[test]
    fn test_parse_node_prefix() {
        let key = VolumeKey::parse("dbnasr0009:/ORA/dbs00/TOTO");
        assert_eq!(key.node_name.as_deref(), Some("dbnasr0009"));
        assert_eq!(key.junction_path, "/ORA/dbs00/TOTO");
        assert_eq!(key.to_string(), "dbnasr0009:/ORA/dbs00/TOTO");
    }

    #[test]
    fn test_colon_without_path_is_not_a_node() {
        let key = VolumeKey::parse("weird:name");
        assert_eq!(key.node_name, None);
        assert_eq!(key.junction_path, "weird:name");

        let key = VolumeKey::parse(":/data");
        assert_eq!(key.node_name, None);
        assert_eq!(key.junction_path, ":/data");
    }

    #[test]
    fn test_parse_absolute() {
        assert!(VolumeKey::parse_absolute("node-1:/data/vol").is_ok());
        assert!(matches!(
            VolumeKey::parse_absolute("vol1"),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_derived_volume_name() {
        let key = VolumeKey::parse("node-1:/ORA/dbs00/TOTO-clone");
        assert_eq!(key.derived_volume_name(), "ORA_dbs00_TOTO_clone");
    }
}
