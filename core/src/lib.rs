pub mod appender;
pub mod crypto;
pub mod network;
pub mod retry;
pub mod shutdown;
pub mod stats;
pub mod types;
pub mod utils;
