pub mod client;
pub mod error;

pub use client::VcdClient;
pub use error::VcdError;
