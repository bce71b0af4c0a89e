pub mod artifact;
pub mod config;
pub mod fetch;
pub mod installer;
pub mod installer_modules;
pub mod logging;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod ui;
pub mod utils;
