pub mod broker;
pub mod client_connection;

pub use broker::{Broker, BrokerHandle};
pub use client_connection::ClientConnection;
