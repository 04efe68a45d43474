use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_\s-]").expect("valid slug regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static HYPHEN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("valid hyphen regex"));

/// Fallback slug for names with no usable characters.
const EMPTY_SLUG: &str = "feed";

/// Derives a URL-safe identifier from a feed's display name.
///
/// Lowercases, drops everything but ASCII letters, digits, `_`, `-` and
/// whitespace, turns whitespace runs into `-`, collapses repeated hyphens and
/// trims hyphens from both ends.
///
/// # Examples
///
/// ```
/// use feedwall::util::slugify;
///
/// assert_eq!(slugify("Hacker News"), "hacker-news");
/// assert_eq!(slugify("  C++ & Rust -- Weekly! "), "c-rust-weekly");
/// assert_eq!(slugify("???"), "feed");
/// ```
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lower, "");
    let hyphenated = WHITESPACE_RUN.replace_all(stripped.trim(), "-");
    let collapsed = HYPHEN_RUN.replace_all(&hyphenated, "-");
    let slug = collapsed.trim_matches('-');

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Hands out slugs that are unique within one build.
///
/// The first feed to claim a slug keeps it; later collisions get `-2`, `-3`,
/// ... in the order they are requested.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    taken: HashSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: &str) -> String {
        let base = slugify(name);
        if self.taken.insert(base.clone()) {
            return base;
        }

        // A literal name like "news 2" may already own a suffixed slug
        let mut n = 2usize;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
