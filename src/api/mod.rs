pub mod client;

pub use client::{HttpOrderApi, OrderApi};
