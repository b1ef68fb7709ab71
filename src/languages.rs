//! Language configuration for compilation and execution

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Source languages accepted by the judge.
///
/// `OutputOnly` is a pseudo-language: the submitted text is the answer itself
/// and no program is ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Cpp,
    Go,
    Rust,
    Java,
    Python,
    OutputOnly,
}

impl Language {
    pub fn all_variants() -> &'static [Language] {
        &[
            Language::C,
            Language::Cpp,
            Language::Go,
            Language::Rust,
            Language::Java,
            Language::Python,
            Language::OutputOnly,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Python => "python",
            Language::OutputOnly => "output_only",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Language::all_variants()
            .iter()
            .copied()
            .find(|lang| lang.name() == lowered)
            .ok_or_else(|| anyhow::anyhow!("Unknown language: {}", s))
    }
}

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Name of the source file (e.g., "main.cpp")
    pub source_file: String,
    /// Compile command (None for interpreted languages)
    pub compile_command: Option<Vec<String>>,
    /// Run command, resolved against the scratch directory
    pub run_command: Vec<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Toolchain table keyed by language.
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    configs: HashMap<Language, LanguageConfig>,
    aliases: HashMap<String, Language>,
}

impl LanguageTable {
    /// The table shipped with the crate.
    pub fn builtin() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
        Self::from_toml_str(content)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;
        let mut table = Self::default();

        for (name, raw) in raw_configs {
            let language: Language = name.parse()?;
            if language == Language::OutputOnly {
                anyhow::bail!("output_only cannot have a toolchain entry");
            }

            let run_command = into_command(&raw.run_command);
            if run_command.is_empty() {
                anyhow::bail!("Empty run command for {}", name);
            }

            let config = LanguageConfig {
                source_file: raw.source_file,
                compile_command: raw
                    .compile_command
                    .map(|cmd| into_command(&cmd))
                    .filter(|cmd| !cmd.is_empty()),
                run_command,
            };

            table.aliases.insert(language.name().to_string(), language);
            for alias in raw.aliases {
                table.aliases.insert(alias.to_lowercase(), language);
            }
            table.configs.insert(language, config);
        }

        Ok(table)
    }

    pub fn get(&self, language: Language) -> Option<&LanguageConfig> {
        self.configs.get(&language)
    }

    /// Resolve a language name or alias (case-insensitive).
    pub fn resolve(&self, name: &str) -> Option<Language> {
        let lowered = name.to_lowercase();
        if lowered == Language::OutputOnly.name() {
            return Some(Language::OutputOnly);
        }
        self.aliases.get(&lowered).copied()
    }

    pub fn supported(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.configs.keys().copied().collect();
        langs.sort_by_key(|l| l.name());
        langs
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}
