pub mod controller;
pub mod key;
pub mod session;
pub mod types;
