//! Process-wide settings

pub mod schema;
pub mod store;

pub use schema::Settings;
pub use store::{ConfigStore, DEFAULT_SETTINGS_PATH, ENV_DEFAULT_GADGET, ENV_SETTINGS_PATH};
