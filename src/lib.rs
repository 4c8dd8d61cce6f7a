pub mod logging;
pub mod server;
pub mod storage;
