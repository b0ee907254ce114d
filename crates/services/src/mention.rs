//! `@username` detection in comment bodies.

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.\-@/])@([A-Za-z0-9_.\-]{3,50})").expect("mention pattern is valid")
});

/// Distinct, lower-cased usernames mentioned in `text`, in order of appearance.
pub fn mentions(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for capture in MENTION.captures_iter(text) {
        let name = capture[1].trim_end_matches('.').to_lowercase();
        if name.len() >= 3 && !found.contains(&name) {
            found.push(name);
        }
    }
    found
}

/// Usernames mentioned in `new` that `old` did not mention.
pub fn new_mentions(old: &str, new: &str) -> Vec<String> {
    let before = mentions(old);
    mentions(new)
        .into_iter()
        .filter(|name| !before.contains(name))
        .collect()
}
