pub mod calendar_gateway;
pub mod config;
pub mod error;
pub mod event_mapper;
pub mod in_memory_gateway;
pub mod logging;
