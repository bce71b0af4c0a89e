//! Shared utility functions for the server installer.

use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// `PaperMc` → `paper_mc`, `Vanilla` → `vanilla`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Pad `text` to `width` columns, putting the odd space in front.
/// Longer text is truncated.
pub fn center_text(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.chars().take(width).collect();
    }
    let total = width - len;
    let start = (total + 1) / 2;
    let end = total / 2;
    format!("{}{}{}", " ".repeat(start), text, " ".repeat(end))
}

/// Substitute `{version}` and `{sub_version}` placeholders.
pub fn expand_template(template: &str, version: &str, sub_version: Option<&str>) -> String {
    template
        .replace("{version}", version)
        .replace("{sub_version}", sub_version.unwrap_or(""))
}
