pub mod proto;

mod connection;
mod error;
mod export;
pub use self::export::ExportRegistry;

mod server;
pub use self::server::NBDServer;

mod session;
mod wire;
