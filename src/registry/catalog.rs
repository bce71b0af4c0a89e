//! Host type table: fully-qualified type path → constructor.

use crate::installer::ServerInstaller;
use crate::utils::snake_case;

pub type Constructor = fn() -> anyhow::Result<Box<dyn ServerInstaller>>;

#[derive(Clone, Default)]
pub struct Catalog {
    entries: Vec<(String, Constructor)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctor` under `type_path`. Registering a path twice keeps the
    /// first slot and the latest constructor.
    pub fn register(&mut self, type_path: impl Into<String>, ctor: Constructor) -> &mut Self {
        let type_path = type_path.into();
        match self.entries.iter_mut().find(|(path, _)| *path == type_path) {
            Some(entry) => entry.1 = ctor,
            None => self.entries.push((type_path, ctor)),
        }
        self
    }

    pub fn with(mut self, type_path: impl Into<String>, ctor: Constructor) -> Self {
        self.register(type_path, ctor);
        self
    }

    pub fn get(&self, type_path: &str) -> Option<Constructor> {
        self.entries
            .iter()
            .find(|(path, _)| path == type_path)
            .map(|(_, ctor)| *ctor)
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Constructor)> {
        self.entries.iter().map(|(path, ctor)| (path.as_str(), *ctor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `type_path` lies under `namespace`.
pub fn in_namespace(namespace: &str, type_path: &str) -> bool {
    type_path
        .strip_prefix(namespace)
        .map(|rest| rest.starts_with("::"))
        .unwrap_or(false)
}

/// A built-in unit is `<namespace>::<segment>::<Type>` where the segment is
/// the snake_case form of the type name.
pub fn is_self_named_unit(namespace: &str, type_path: &str) -> bool {
    let Some(rest) = type_path
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix("::"))
    else {
        return false;
    };
    let mut parts = rest.split("::");
    match (parts.next(), parts.next(), parts.next()) {
        (Some(segment), Some(type_name), None) => {
            !type_name.is_empty() && snake_case(type_name) == segment
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "server_installer::installer_modules";

    #[test]
    fn test_self_named_unit() {
        assert!(is_self_named_unit(NS, "server_installer::installer_modules::vanilla::Vanilla"));
        assert!(is_self_named_unit(NS, "server_installer::installer_modules::paper_mc::PaperMc"));
        // segment and type disagree
        assert!(!is_self_named_unit(NS, "server_installer::installer_modules::vanilla::Forge"));
        // helper nested below a unit
        assert!(!is_self_named_unit(NS, "server_installer::installer_modules::forge::util::Forge"));
        assert!(!is_self_named_unit(NS, "server_installer::installer_modules::Vanilla"));
        assert!(!is_self_named_unit(NS, "other::vanilla::Vanilla"));
    }

    #[test]
    fn test_in_namespace() {
        assert!(in_namespace(NS, "server_installer::installer_modules::x::X"));
        assert!(!in_namespace(NS, "server_installer::installer_modules_evil::x::X"));
        assert!(!in_namespace(NS, "acme::x::X"));
    }

    fn failing() -> anyhow::Result<Box<dyn ServerInstaller>> {
        anyhow::bail!("nope")
    }

    #[test]
    fn test_register_replaces_constructor_in_place() {
        let mut catalog = Catalog::new();
        catalog.register("a::A", failing).register("b::B", failing);
        catalog.register("a::A", failing);
        assert_eq!(catalog.len(), 2);
        let paths: Vec<&str> = catalog.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a::A", "b::B"]);
        assert!(catalog.get("c::C").is_none());
    }
}
