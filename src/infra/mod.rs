pub mod db;
pub mod error;
pub mod http;
pub mod openai;
pub mod seed;
pub mod telemetry;
