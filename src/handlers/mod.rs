//module tree
pub mod messages;
pub mod presence;
pub mod rooms;
pub mod session;
