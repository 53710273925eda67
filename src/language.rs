use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A source language the static analyzer understands.
///
/// Plain enum rather than trait objects; dispatch is a match on extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceLanguage {
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    CSharp,
    Php,
    Ruby,
    Cpp,
}

impl SourceLanguage {
    pub const ALL: &'static [SourceLanguage] = &[
        SourceLanguage::JavaScript,
        SourceLanguage::TypeScript,
        SourceLanguage::Python,
        SourceLanguage::Java,
        SourceLanguage::Go,
        SourceLanguage::CSharp,
        SourceLanguage::Php,
        SourceLanguage::Ruby,
        SourceLanguage::Cpp,
    ];

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceLanguage::JavaScript => &["js", "jsx", "mjs", "cjs", "vue", "ejs", "es", "es6"],
            SourceLanguage::TypeScript => &["ts", "tsx"],
            SourceLanguage::Python => &["py"],
            SourceLanguage::Java => &["java"],
            SourceLanguage::Go => &["go"],
            SourceLanguage::CSharp => &["cs"],
            SourceLanguage::Php => &["php"],
            SourceLanguage::Ruby => &["rb"],
            SourceLanguage::Cpp => &["c", "cc", "cpp", "cxx", "h", "hpp", "hxx"],
        }
    }
}

/// Capability check: can the static analyzer handle this file?
pub trait SourceFormats: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;
}

/// Extension-based format check. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct ExtensionFormats {
    extensions: HashSet<String>,
}

impl Default for ExtensionFormats {
    fn default() -> Self {
        let extensions = SourceLanguage::ALL
            .iter()
            .flat_map(|lang| lang.extensions())
            .map(|ext| ext.to_string())
            .collect();
        Self { extensions }
    }
}

impl ExtensionFormats {
    /// Use `extensions` when configured, the built-in language table otherwise.
    /// Leading dots are accepted (`".py"` and `"py"` are the same).
    pub fn from_config(extensions: Option<&[String]>) -> Self {
        match extensions {
            Some(list) => Self {
                extensions: list
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect(),
            },
            None => Self::default(),
        }
    }
}

impl SourceFormats for ExtensionFormats {
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formats_cover_known_languages() {
        let formats = ExtensionFormats::default();
        assert!(formats.is_supported(Path::new("/r/a.py")));
        assert!(formats.is_supported(Path::new("/r/App.TSX")));
        assert!(formats.is_supported(Path::new("/r/Main.java")));
        assert!(!formats.is_supported(Path::new("/r/package.json")));
        assert!(!formats.is_supported(Path::new("/r/Makefile")));
    }

    #[test]
    fn test_configured_extensions_replace_defaults() {
        let configured = vec![".py".to_string(), "RB".to_string(), "".to_string()];
        let formats = ExtensionFormats::from_config(Some(configured.as_slice()));
        assert!(formats.is_supported(Path::new("x.py")));
        assert!(formats.is_supported(Path::new("x.rb")));
        assert!(!formats.is_supported(Path::new("x.js")));
    }
}
