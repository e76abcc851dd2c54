pub mod api;
pub mod config;
pub mod db;
pub mod mqtt;
pub mod reading;
pub mod reading_cache;
pub mod sensors;
