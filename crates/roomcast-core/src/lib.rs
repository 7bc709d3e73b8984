pub mod errors;
pub mod frame;
pub mod ids;

pub use errors::RelayError;
pub use frame::Frame;
pub use ids::ConnectionId;
