//! Server-to-server federation.
//!
//! Each server keeps an outbound [`PeerLink`] per configured peer and
//! forwards relayed frames over them, tagging each frame with its own id
//! in `forwardedBy` so no frame travels the same hop twice.

pub mod link;
pub mod peers;
pub mod url;

pub use link::PeerLink;
pub use peers::PeerFederation;
pub use url::normalize_peer_url;
