//! Peer identities and load ranking

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connected peer and the number of requests currently open to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub peer: PeerId,
    pub active_requests: usize,
}

/// Candidate list ordered least-loaded first, ties broken by peer id.
pub fn rank_peers_by_load(connections: &[PeerConnection]) -> Vec<PeerId> {
    let mut ranked: Vec<&PeerConnection> = connections.iter().collect();
    ranked.sort_by(|a, b| {
        a.active_requests
            .cmp(&b.active_requests)
            .then_with(|| a.peer.cmp(&b.peer))
    });
    ranked.into_iter().map(|c| c.peer.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_peers_by_load() {
        let connections = vec![
            PeerConnection { peer: PeerId::new("c"), active_requests: 3 },
            PeerConnection { peer: PeerId::new("b"), active_requests: 0 },
            PeerConnection { peer: PeerId::new("a"), active_requests: 3 },
        ];
        assert_eq!(
            rank_peers_by_load(&connections),
            vec![PeerId::new("b"), PeerId::new("a"), PeerId::new("c")]
        );
    }
}
