pub mod release;
pub mod server;
