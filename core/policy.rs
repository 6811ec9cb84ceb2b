use once_cell::sync::Lazy;
use serde::Deserialize;

/// Extensions shown in the directory-tree preview of a local walk.
pub const TREE_EXTENSIONS: &[&str] = &[".py", ".md", ".lua"];
/// Extensions whose contents are packaged from a local walk.
// `.lua` stays preview-only here; the tree lists it, the contents section does not.
pub const CONTENT_EXTENSIONS: &[&str] = &[".py", ".md"];
/// Extensions extracted from a remote archive.
pub const ARCHIVE_EXTENSIONS: &[&str] = &[".py"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionPattern {
    /// Matches a directory or file name exactly.
    ExactName(String),
    /// Matches when the text appears anywhere in the relative path context.
    PathSubstring(String),
    /// Matches names ending with the stored suffix (`*.pyc` stores `.pyc`).
    SuffixWildcard(String),
}

impl ExclusionPattern {
    /// Expands one raw pattern string into its tagged forms.
    ///
    /// `*.ext` becomes a single [`ExclusionPattern::SuffixWildcard`]; any other
    /// string becomes an exact-name pattern followed by a path-substring pattern.
    pub fn parse(raw: &str) -> Vec<ExclusionPattern> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }
        match raw.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => {
                vec![ExclusionPattern::SuffixWildcard(suffix.to_string())]
            }
            _ => vec![
                ExclusionPattern::ExactName(raw.to_string()),
                ExclusionPattern::PathSubstring(raw.to_string()),
            ],
        }
    }

    pub fn matches(&self, name: &str, path_context: &str) -> bool {
        match self {
            ExclusionPattern::ExactName(exact) => name == exact.as_str(),
            ExclusionPattern::PathSubstring(fragment) => path_context.contains(fragment.as_str()),
            ExclusionPattern::SuffixWildcard(suffix) => name.ends_with(suffix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExclusionPolicy {
    patterns: Vec<ExclusionPattern>,
}

#[derive(Debug, Deserialize)]
struct BuiltinExclusions {
    #[serde(default)]
    patterns: Vec<String>,
}

static BUILTIN_POLICY: Lazy<ExclusionPolicy> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/exclusions.yaml"
    ));
    let builtin: BuiltinExclusions =
        serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/exclusions.yaml");
    ExclusionPolicy::from_patterns(builtin.patterns.as_slice())
});

impl ExclusionPolicy {
    pub fn from_patterns<S: AsRef<str>>(raw_patterns: &[S]) -> Self {
        let patterns = raw_patterns
            .iter()
            .flat_map(|p| ExclusionPattern::parse(p.as_ref()))
            .collect();
        Self { patterns }
    }

    /// The fixed policy applied to every local walk.
    pub fn builtin() -> &'static ExclusionPolicy {
        &BUILTIN_POLICY
    }

    pub fn patterns(&self) -> &[ExclusionPattern] {
        &self.patterns
    }

    /// First matching pattern wins; no match keeps the entry.
    pub fn should_exclude(&self, name: &str, path_context: &str) -> bool {
        match self.patterns.iter().find(|p| p.matches(name, path_context)) {
            Some(pattern) => {
                log::trace!(
                    "Excluding '{}' (context '{}') by {:?}",
                    name,
                    path_context,
                    pattern
                );
                true
            }
            None => false,
        }
    }
}

pub fn has_accepted_extension(name: &str, extensions: &[&str]) -> bool {
    extensions.iter().any(|ext| name.ends_with(ext))
}
