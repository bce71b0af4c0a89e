//! Built-in installer modules.
//!
//! Every unit here follows the `<segment>::<Type>` layout with
//! `snake_case(Type) == segment`; only such units are picked up by
//! internal discovery.

pub mod forge;
pub mod vanilla;

use crate::registry::Catalog;

/// Reserved namespace for installer modules, built-in or external.
pub const NAMESPACE: &str = module_path!();

/// Log level pattern of Minecraft server consoles (`[12:00:00] [Server thread/INFO]: ...`).
pub const MINECRAFT_LOG_PATTERN: &str = r"/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]";

pub const MINECRAFT_STOP_COMMAND: &str = "stop";

pub fn builtin_catalog() -> Catalog {
    Catalog::new()
        .with(vanilla::Vanilla::TYPE_PATH, vanilla::Vanilla::construct)
        .with(forge::Forge::TYPE_PATH, forge::Forge::construct)
}
