pub mod change_feed;
pub mod editing;
pub mod indexes;
pub mod loader;
pub mod merger;
pub mod range;
pub mod selection;
pub mod session;
pub mod time_indicator;
