//! Core types module

mod config;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use config::{
    DelayMechanism, DomainConfig, GptpConfig, GptpConfigBuilder, PdelayMode, PortConfig, Profile,
};

/// Role of a port in the time distribution tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    /// Port does not take part in time distribution
    #[default]
    Disabled,
    /// Port sends time towards its link partner
    Master,
    /// Port receives time from the grandmaster
    Slave,
    /// Port neither sends nor receives time
    Passive,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "DISABLED",
            Self::Master => "MASTER",
            Self::Slave => "SLAVE",
            Self::Passive => "PASSIVE",
        };
        f.write_str(name)
    }
}
