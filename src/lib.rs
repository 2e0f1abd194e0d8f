// 模組定義
pub mod adapter;
pub mod batch;
pub mod config;
pub mod contract;
pub mod engine;
pub mod market_data;
pub mod monitor;
pub mod parity;
pub mod schema;
pub mod serialization;
