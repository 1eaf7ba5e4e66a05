//module tree
pub mod inbound;
pub mod outbound;

//API exports
pub use inbound::*;
pub use outbound::*;

//-------------------------------------------------------------------------------------------------------------------

/// The only protocol version this server negotiates on HELLO (spec §6, §7 `PROTOCOL_VERSION`).
pub const SUPPORTED_VERSION: &str = "1.0";
