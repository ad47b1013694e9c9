use std::{
    fs::File,
    io::{self, BufReader},
    net::SocketAddr,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    compiler::CompileOptions,
    sharing::{SharingError, SharingScheme},
};

/// Configuration of a computing node: who the peers are and how values are shared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub parties: Vec<PartyConfig>,
    #[serde(default)]
    pub sharing: SharingConfig,
    #[serde(default)]
    pub compile: CompileOptions,
}

/// Details about party in networked multiparty protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyConfig {
    pub address: SocketAddr,
}

/// Sharing scheme without the party count, which is implied by the party list.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SharingConfig {
    Additive,
    Shamir { threshold: usize },
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self::Additive
    }
}

impl NodeConfig {
    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Sharing scheme used among the configured parties.
    pub fn scheme(&self) -> Result<SharingScheme, SharingError> {
        match self.sharing {
            SharingConfig::Additive => SharingScheme::additive(self.parties.len()),
            SharingConfig::Shamir { threshold } => {
                SharingScheme::shamir(self.parties.len(), threshold)
            }
        }
    }
}
