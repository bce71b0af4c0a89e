//! Interactive selection: numbered tables and prompts.

use std::io::{self, BufRead, Write};

use anyhow::Context;

use crate::installer::{InstallContext, InstallRequest};
use crate::registry::ModuleDescriptor;

/// Lay out `items` as numbered cells (`<prefix>n<suffix> item`), `columns`
/// per row, every cell padded to the widest one plus two spaces.
pub fn print_table(items: &[String], columns: usize, prefix: &str, suffix: &str) -> Vec<String> {
    let columns = columns.max(1);
    let cells: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}{}{} {}", prefix, i + 1, suffix, item))
        .collect();
    let width = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0) + 2;

    cells
        .chunks(columns)
        .map(|row| {
            row.iter()
                .map(|cell| format!("{:<width$}", cell, width = width))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect()
}

/// What the user picked, ready for the install step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Zero-based registry ordinal
    pub ordinal: usize,
    pub request: InstallRequest,
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Show `items` as a table and read a 1-based choice. End of input picks
    /// the first entry; anything outside the range asks again.
    pub fn choose(
        &mut self,
        what: &str,
        items: &[String],
        columns: usize,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<usize> {
        if items.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("no {} to choose from", what)));
        }
        writeln!(self.output, "Available {}:", what)?;
        for line in print_table(items, columns, prefix, suffix) {
            writeln!(self.output, "{}", line)?;
        }

        loop {
            write!(self.output, "Select {} (1-{}): ", what, items.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                tracing::warn!("No input provided, using default {}: 1", what);
                return Ok(0);
            }
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
                _ => writeln!(self.output, "Invalid selection '{}'", line.trim())?,
            }
        }
    }

    /// Walk module → channel → version → sub-version. Blocks on network
    /// lookups through the chosen installer.
    pub fn select_installation(
        &mut self,
        modules: &[ModuleDescriptor],
        ctx: &InstallContext,
    ) -> anyhow::Result<Selection> {
        let names: Vec<String> = modules.iter().map(|m| m.display_name.clone()).collect();
        let ordinal = self.choose("installer", &names, 3, "", ".")?;
        let module = &modules[ordinal];
        let installer = module.installer();
        tracing::info!("Selected installer: {}", module.display_name);

        let channel = if module.channels.is_empty() {
            None
        } else {
            let idx = self.choose("type", &module.channels, 4, "[", "]")?;
            Some(module.channels[idx].clone())
        };

        let versions = installer
            .available_versions(ctx, channel.as_deref())
            .with_context(|| format!("Failed to list versions of {}", module.display_name))?;
        if versions.is_empty() {
            anyhow::bail!("{} offers no versions", module.display_name);
        }
        let version = versions[self.choose("version", &versions, 4, "[", "]")?].clone();

        let sub_versions = installer
            .available_sub_versions(ctx, &version)
            .with_context(|| format!("Failed to list sub-versions of {}", version))?;
        let sub_version = if sub_versions.is_empty() {
            None
        } else {
            Some(sub_versions[self.choose("sub-version", &sub_versions, 4, "[", "]")?].clone())
        };

        let mut request = InstallRequest::new(version);
        request.channel = channel;
        request.sub_version = sub_version;
        Ok(Selection { ordinal, request })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_print_table_layout() {
        let lines = print_table(&strings(&["1.20.4", "1.20.3", "1.19", "1.18.2", "1.8"]), 4, "[", "]");
        assert_eq!(lines.len(), 2);
        // widest cell "[1] 1.20.4" is 10 chars, columns are 12 wide
        assert_eq!(lines[0], "[1] 1.20.4  [2] 1.20.3  [3] 1.19    [4] 1.18.2");
        assert_eq!(lines[1], "[5] 1.8");
    }

    #[test]
    fn test_print_table_default_style() {
        let lines = print_table(&strings(&["Vanilla", "Forge"]), 3, "", ".");
        assert_eq!(lines, vec!["1. Vanilla  2. Forge"]);
    }

    #[test]
    fn test_choose_reprompts_on_invalid_input() {
        let input = Cursor::new("abc\n7\n2\n");
        let mut prompter = Prompter::new(input, Vec::new());
        let idx = prompter.choose("version", &strings(&["a", "b", "c"]), 4, "[", "]").unwrap();
        assert_eq!(idx, 1);
        let out = String::from_utf8(prompter.into_output()).unwrap();
        assert_eq!(out.matches("Invalid selection").count(), 2);
        assert!(out.contains("Select version (1-3): "));
    }

    #[test]
    fn test_choose_defaults_to_first_on_eof() {
        let mut prompter = Prompter::new(Cursor::new(""), Vec::new());
        let idx = prompter.choose("type", &strings(&["Release", "Snapshot"]), 4, "[", "]").unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_choose_empty_list_is_error() {
        let mut prompter = Prompter::new(Cursor::new("1\n"), Vec::new());
        assert!(prompter.choose("version", &[], 4, "[", "]").is_err());
    }
}
