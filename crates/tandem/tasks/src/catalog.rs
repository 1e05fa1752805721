//! Declared protocols

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tandem_types::{CoordinationError, ProtocolSpec, Result};

/// Protocols known to the coordinator, by name.
pub struct ProtocolCatalog {
    protocols: DashMap<String, ProtocolSpec>,
}

impl ProtocolCatalog {
    pub fn new() -> Self {
        Self {
            protocols: DashMap::new(),
        }
    }

    /// Declare a protocol. Declaring an identical spec again is a no-op;
    /// a different spec under the same name is a `ProtocolConflict`.
    ///
    /// Returns `true` if the protocol was new.
    pub fn declare(&self, spec: ProtocolSpec) -> Result<bool> {
        spec.validate()?;
        match self.protocols.entry(spec.name.clone()) {
            Entry::Occupied(existing) => {
                if existing.get() == &spec {
                    Ok(false)
                } else {
                    Err(CoordinationError::ProtocolConflict(format!(
                        "{} is already declared with different roles",
                        spec.name
                    )))
                }
            }
            Entry::Vacant(slot) => {
                tracing::info!(protocol = %spec.name, roles = spec.roles.len(), "Protocol declared");
                slot.insert(spec);
                Ok(true)
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<ProtocolSpec> {
        self.protocols
            .get(name)
            .map(|p| p.clone())
            .ok_or_else(|| CoordinationError::UnknownProtocol(name.to_string()))
    }

    pub fn list(&self) -> Vec<ProtocolSpec> {
        let mut specs: Vec<ProtocolSpec> = self.protocols.iter().map(|p| p.value().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

impl Default for ProtocolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
