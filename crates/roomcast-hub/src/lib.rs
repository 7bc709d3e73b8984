pub mod connection;
pub mod registry;
pub mod rooms;

pub use connection::RoomConnection;
pub use registry::{BroadcastOutcome, RoomRegistry};
pub use rooms::{start_room_sweep, RoomIndex};
