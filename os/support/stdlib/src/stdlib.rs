pub mod fmt;
pub mod logger;
pub mod malloc;
