// Network module for the chain mirror node
//
// Peers, the mesh that pools them, and the public network profiles

pub mod mesh;
pub mod peer;
pub mod profiles;

pub use mesh::Mesh;
pub use peer::{Peer, PeerTelemetry};
pub use profiles::{validate_endpoint, NetworkProfile};
