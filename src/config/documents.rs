//! Built-in configuration document types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A persisted document selected by its `"typename"` field.
pub trait ConfigDocument: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPENAME: &'static str;
}

/// Node identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub uuid: String,
    pub address: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub nickname: String,
}

impl ConfigDocument for IdentityConfig {
    const TYPENAME: &'static str = "identity";
}

/// Network interface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub port: u16,
    #[serde(default)]
    pub ip4_cidr: String,
    #[serde(default)]
    pub ip6_cidr: String,
    #[serde(default)]
    pub mcast4_addr: String,
    #[serde(default)]
    pub mcast6_addr: String,
    #[serde(default)]
    pub mac_addr: String,
}

impl ConfigDocument for NetworkConfig {
    const TYPENAME: &'static str = "network";
}

/// Group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub uuid: String,
    pub address: String,
}

impl ConfigDocument for GroupConfig {
    const TYPENAME: &'static str = "group";
}
