pub mod codec;
pub mod connection;
pub mod state;

pub use codec::*;
pub use connection::{Connection, ConnectionReader, ConnectionWriter};
pub use state::*;
