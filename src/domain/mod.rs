//! Domain layer public interface.
//!
//! Transport-independent abstractions shared by the client and the concrete
//! transports.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Frame,
    Inbound,
    InboundStream,
    Transport,
    TransportPtr,
};
