mod peer_connection;
mod peer_driver;
mod peer_table;

pub use peer_connection::*;
pub use peer_driver::*;
pub use peer_table::*;
