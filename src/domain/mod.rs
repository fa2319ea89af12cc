pub mod calendar_time;
pub mod category;
pub mod models;
