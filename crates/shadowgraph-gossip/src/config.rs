//! Shadow graph configuration

use serde::{Deserialize, Serialize};
use shadowgraph_core::constants;

/// Shadow graph settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowGraphConfig {
    /// Number of nodes in the network. The tip set is expected to stay at or
    /// below this size; growing past it is reported as an anomaly.
    /// Zero disables the check.
    #[serde(default = "default_network_size")]
    pub network_size: usize,
}

fn default_network_size() -> usize {
    constants::DEFAULT_NETWORK_SIZE
}

impl Default for ShadowGraphConfig {
    fn default() -> Self {
        Self {
            network_size: default_network_size(),
        }
    }
}

impl ShadowGraphConfig {
    /// Configuration for a network of `network_size` nodes
    pub fn for_network(network_size: usize) -> Self {
        Self { network_size }
    }

    pub(crate) fn tip_limit(&self) -> Option<usize> {
        (self.network_size > 0).then_some(self.network_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_tip_limit() {
        assert_eq!(ShadowGraphConfig::default().tip_limit(), None);
        assert_eq!(ShadowGraphConfig::for_network(4).tip_limit(), Some(4));
    }
}
