//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format resolution chains, parameter positions,
//! producer names, and "did you mean?" suggestions.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use warren_support::rendering::render_chain;
///
/// let chain = vec!["UserService", "UserRepo", "Database", "UserService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "UserService → UserRepo → Database → UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a zero-based parameter index as a one-based English ordinal.
///
/// ```
/// use warren_support::rendering::ordinal;
///
/// assert_eq!(ordinal(0), "1st");
/// assert_eq!(ordinal(1), "2nd");
/// assert_eq!(ordinal(10), "11th");
/// assert_eq!(ordinal(21), "22nd");
/// ```
pub fn ordinal(index: usize) -> String {
    let n = index + 1;
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// One line of an indented tree, see [`render_tree`].
#[derive(Debug)]
pub struct TreeEntry {
    /// Nesting level, 0 for the root.
    pub depth: usize,
    /// Main label of the line
    pub label: String,
    /// Optional trailing detail, rendered in parentheses
    pub detail: Option<String>,
}

/// Renders nested entries as an indented tree.
///
/// ```text
/// root  (2 registered)
/// └─ request  (1 registered)
///    └─ nested
/// ```
pub fn render_tree(entries: &[TreeEntry]) -> String {
    let mut result = String::new();

    for entry in entries {
        if entry.depth > 0 {
            result.push_str(&"   ".repeat(entry.depth - 1));
            result.push_str("└─ ");
        }

        result.push_str(&entry.label);

        if let Some(ref detail) = entry.detail {
            result.push_str(&format!("  ({detail})"));
        }

        result.push('\n');
    }

    result
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use warren_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                current_segment.clear();
            }
            '<' | '>' | ',' | ' ' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => {
                current_segment.push(ch);
            }
        }
    }

    result.push_str(&current_segment);
    result
}

/// Picks registered names that look like the requested one.
///
/// Substring matches rank first, then shared prefixes of three or more
/// characters. At most `max_suggestions` names are returned.
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            let common = name_lower
                .chars()
                .zip(requested_lower.chars())
                .take_while(|(a, b)| a == b)
                .count();

            if common >= 3 {
                return Some((name, common * 10));
            }

            None
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_simple_chain() {
        let chain = vec!["A", "B", "C", "A"];
        assert_eq!(render_chain(&chain), "A → B → C → A");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn ordinals_cover_teens() {
        assert_eq!(ordinal(2), "3rd");
        assert_eq!(ordinal(3), "4th");
        assert_eq!(ordinal(11), "12th");
        assert_eq!(ordinal(12), "13th");
        assert_eq!(ordinal(100), "101st");
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("logger"), "logger");
    }

    #[test]
    fn suggest_similar_names() {
        let available = vec!["userService", "userRepository", "logger", "database"];

        let suggestions = suggest_similar("userServise", &available, 3);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0], "userService");
    }

    #[test]
    fn suggest_skips_exact_name() {
        let available = vec!["logger"];
        assert!(suggest_similar("logger", &available, 3).is_empty());
    }

    #[test]
    fn suggest_no_match() {
        let available = vec!["database"];
        assert!(suggest_similar("xyzAbc", &available, 3).is_empty());
    }

    #[test]
    fn tree_rendering() {
        let entries = vec![
            TreeEntry { depth: 0, label: "root".into(), detail: Some("2 registered".into()) },
            TreeEntry { depth: 1, label: "request".into(), detail: None },
            TreeEntry { depth: 2, label: "nested".into(), detail: None },
        ];

        let rendered = render_tree(&entries);
        assert!(rendered.starts_with("root  (2 registered)\n"));
        assert!(rendered.contains("└─ request\n"));
        assert!(rendered.contains("   └─ nested\n"));
    }
}
