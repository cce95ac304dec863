//! File editor primitives shared by the `str_replace_editor` tool.
//!
//! Parsing and text manipulation only; file I/O goes through the container.

use serde::Deserialize;

/// Editor call as issued by the model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditorCommand {
    View {
        path: String,
        /// 1-indexed inclusive `[start, end]`; `end = -1` means end of file.
        #[serde(default)]
        view_range: Option<(i64, i64)>,
    },
    Create {
        path: String,
        file_text: String,
    },
    StrReplace {
        path: String,
        old_str: String,
        #[serde(default)]
        new_str: String,
    },
}

impl EditorCommand {
    pub fn parse(args: &serde_json::Value) -> Result<Self, String> {
        serde_json::from_value(args.clone())
            .map_err(|e| format!("Invalid str_replace_editor arguments: {}", e))
    }
}

/// Prefix each line with its 1-based line number.
pub fn number_lines<'a>(lines: impl IntoIterator<Item = &'a str>, first: usize) -> String {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| format!("{:>6}│ {}", first + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render file content for `view`, optionally restricted to a line range.
pub fn render_view(content: &str, view_range: Option<(i64, i64)>) -> Result<String, String> {
    let lines: Vec<&str> = content.lines().collect();
    let Some((start, end)) = view_range else {
        return Ok(number_lines(lines.iter().copied(), 1));
    };

    let total = lines.len() as i64;
    if total == 0 && start == 1 && end == -1 {
        return Ok(String::new());
    }
    if start < 1 || start > total.max(1) {
        return Err(format!(
            "Invalid view_range [{}, {}]: start must be between 1 and {}",
            start, end, total
        ));
    }
    let end = if end == -1 { total } else { end };
    if end < start || end > total {
        return Err(format!(
            "Invalid view_range [{}, {}]: end must be -1 or between {} and {}",
            start, end, start, total
        ));
    }

    let from = (start - 1) as usize;
    let to = end as usize;
    Ok(number_lines(lines[from..to].iter().copied(), from + 1))
}

/// Replace the first occurrence of `old` and return the new content plus the
/// 1-based line where the replacement starts. `None` if `old` is absent.
pub fn replace_first(content: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let offset = content.find(old)?;
    let line = content[..offset].matches('\n').count() + 1;
    Some((content.replacen(old, new, 1), line))
}

/// Numbered excerpt around an edit.
pub fn snippet(content: &str, start_line: usize, changed_lines: usize, context: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let first = start_line.saturating_sub(context + 1);
    let last = (start_line + changed_lines.max(1) - 1 + context).min(lines.len());
    number_lines(lines[first.min(lines.len())..last].iter().copied(), first + 1)
}

/// Single-quote a string for `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Resolve a validated path against the container workspace.
pub fn resolve_in_workspace(workspace: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    let relative = path.trim_start_matches("./");
    if relative.is_empty() || relative == "." {
        return workspace.to_string();
    }
    format!("{}/{}", workspace.trim_end_matches('/'), relative)
}
