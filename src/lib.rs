pub mod analytics;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod shortcode;
pub mod storage;
pub mod store;
pub mod submission;
pub mod sweeper;

pub use app::LinkApp;
