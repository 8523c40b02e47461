pub mod connection;
pub mod ice;
pub mod rtc;
pub mod state;
pub mod transport;
pub mod types;

pub use connection::{Applied, ErrorOutcome, PeerConnection};
pub use rtc::RtcTransportFactory;
pub use state::{transition, PeerInput, PeerState, Step};
pub use transport::{PeerLink, PeerTransport, TransportEvent, TransportFactory};
pub use types::{Role, ServerConfig};
