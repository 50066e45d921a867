pub mod context;
pub mod device;
pub mod interface;
pub mod range;
pub mod services;
