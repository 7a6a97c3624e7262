//! Language detection by file extension.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedLanguage {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    /// Vue single-file component (script block is TS/JS).
    Vue,
    /// Svelte component (script block is TS/JS).
    Svelte,
}

/// The closed set of analyzer families. Every language maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageFamily {
    TsLike,
    Python,
    Rust,
}

impl SupportedLanguage {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(SupportedLanguage::Rust),
            "py" | "pyw" | "pyi" => Some(SupportedLanguage::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(SupportedLanguage::JavaScript),
            "ts" | "mts" | "cts" => Some(SupportedLanguage::TypeScript),
            "tsx" => Some(SupportedLanguage::Tsx),
            "vue" => Some(SupportedLanguage::Vue),
            "svelte" => Some(SupportedLanguage::Svelte),
            _ => None,
        }
    }

    pub fn family(&self) -> LanguageFamily {
        match self {
            SupportedLanguage::Rust => LanguageFamily::Rust,
            SupportedLanguage::Python => LanguageFamily::Python,
            SupportedLanguage::JavaScript
            | SupportedLanguage::TypeScript
            | SupportedLanguage::Tsx
            | SupportedLanguage::Vue
            | SupportedLanguage::Svelte => LanguageFamily::TsLike,
        }
    }

    /// Name of the syntax engine that parses this language.
    pub fn engine_name(&self) -> &'static str {
        match self {
            SupportedLanguage::Rust => "rust",
            SupportedLanguage::Python => "python",
            SupportedLanguage::JavaScript => "javascript",
            SupportedLanguage::TypeScript | SupportedLanguage::Vue | SupportedLanguage::Svelte => {
                "typescript"
            }
            SupportedLanguage::Tsx => "tsx",
        }
    }

    /// Markup containers whose `<script>` blocks carry the code.
    pub fn is_container(&self) -> bool {
        matches!(self, SupportedLanguage::Vue | SupportedLanguage::Svelte)
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            SupportedLanguage::Rust => "Rust",
            SupportedLanguage::Python => "Python",
            SupportedLanguage::JavaScript => "JavaScript",
            SupportedLanguage::TypeScript => "TypeScript",
            SupportedLanguage::Tsx => "TSX",
            SupportedLanguage::Vue => "Vue",
            SupportedLanguage::Svelte => "Svelte",
        }
    }
}

impl fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
