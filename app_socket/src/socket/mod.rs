pub mod socket_connection;
pub mod socket_server;
pub mod socket_sink;
