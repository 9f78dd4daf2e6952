use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::TransportErr;

/// The role a node plays in the parameter-server cluster.
///
/// Shards hold parameter partitions and consume gradient batches; clients
/// compute gradients and submit them. The set is closed: role checks past
/// this enum are exhaustive matches, so a misconfigured role can only enter
/// the program through [`NodeRole::from_str`], where it is rejected before
/// any channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Shard,
    Client,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Shard => "shard",
            NodeRole::Client => "client",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = TransportErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shard" => Ok(NodeRole::Shard),
            "client" => Ok(NodeRole::Client),
            other => Err(TransportErr::UnsupportedRole {
                got: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!("shard".parse::<NodeRole>().unwrap(), NodeRole::Shard);
        assert_eq!("client".parse::<NodeRole>().unwrap(), NodeRole::Client);
    }

    #[test]
    fn rejects_unknown_role() {
        let err = "backup".parse::<NodeRole>().unwrap_err();
        assert!(matches!(err, TransportErr::UnsupportedRole { got } if got == "backup"));
    }
}
