//! Entity blocks declared in the configuration
//!
//! Both `sources:` and `clients:` are sequences of blocks shaped like:
//!
//! ```yaml
//! sources:
//!   - type: spotify
//!     name: my-spotify
//!     clients: [maloja-main]
//!     data:
//!       clientId: ...
//! ```

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use tracing::warn;

/// Where a block came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    #[default]
    ConfigFile,
    /// Synthesized from a deprecated top-level key
    LegacyTopLevel,
}

impl Provenance {
    pub fn describe(&self) -> &'static str {
        match self {
            Provenance::ConfigFile => "config.yaml",
            Provenance::LegacyTopLevel => "config.yaml (top level)",
        }
    }
}

/// One declared source or client, before it is turned into a live entity
#[derive(Debug, Clone, Deserialize)]
pub struct EntityBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Names of the clients this source relays to; empty means all
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default = "empty_mapping")]
    pub data: Value,
    #[serde(skip)]
    pub provenance: Provenance,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn empty_mapping() -> Value {
    Value::Mapping(Default::default())
}

impl EntityBlock {
    pub(crate) fn legacy(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            name: default_name(),
            clients: Vec::new(),
            data,
            provenance: Provenance::LegacyTopLevel,
        }
    }

    /// Deserializes the provider specific `data` mapping
    pub fn parse_data<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_yaml::from_value(self.data.clone()).map_err(|e| {
            anyhow::anyhow!(
                "Invalid data for {} '{}' ({}): {}",
                self.kind,
                self.name,
                self.provenance.describe(),
                e
            )
        })
    }
}

pub(crate) fn parse_blocks(section: Option<Value>, label: &str) -> Vec<EntityBlock> {
    let items = match section {
        Some(Value::Sequence(items)) => items,
        Some(Value::Null) | None => return Vec::new(),
        Some(_) => {
            warn!("'{}' must be a list of entries, ignoring it", label);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, item)| match serde_yaml::from_value::<EntityBlock>(item) {
                Ok(block) => Some(block),
                Err(e) => {
                    warn!("Skipping {} entry #{}: {}", label, index, e);
                    None
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Creds {
        clientid: String,
    }

    fn blocks(yaml: &str) -> Vec<EntityBlock> {
        parse_blocks(Some(serde_yaml::from_str(yaml).unwrap()), "sources")
    }

    #[test]
    fn test_parse_named_blocks() {
        let parsed = blocks(
            "- type: spotify\n  name: mine\n  clients: [a, b]\n  data:\n    clientid: xyz\n- type: plex\n",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, "spotify");
        assert_eq!(parsed[0].name, "mine");
        assert_eq!(parsed[0].clients, vec!["a", "b"]);
        let creds: Creds = parsed[0].parse_data().unwrap();
        assert_eq!(creds.clientid, "xyz");

        assert_eq!(parsed[1].name, "unnamed");
        assert!(parsed[1].clients.is_empty());
        assert_eq!(parsed[1].provenance, Provenance::ConfigFile);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let parsed = blocks("- name: no-type\n- type: jellyfin\n  name: ok\n- 42\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "ok");
    }

    #[test]
    fn test_non_sequence_section_is_ignored() {
        let parsed = parse_blocks(Some(Value::String("oops".into())), "clients");
        assert!(parsed.is_empty());
        assert!(parse_blocks(None, "clients").is_empty());
    }

    #[test]
    fn test_parse_data_reports_entity() {
        let parsed = blocks("- type: spotify\n  name: broken\n  data:\n    other: 1\n");
        let err = parsed[0].parse_data::<Creds>().unwrap_err().to_string();
        assert!(err.contains("spotify 'broken'"));
    }
}
