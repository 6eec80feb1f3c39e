//! Language registry and detection
//!
//! Maps language names, aliases and file extensions to compiled
//! [`LanguageConfiguration`]s. [`LanguageRegistry::resolve`] is the callback
//! the highlighter uses to turn injection names into configurations.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::Language;

use super::language_config::LanguageConfiguration;
use super::theme_table::HighlightThemeTable;
use crate::error::QueryCompileError;

/// Bundled grammar and query sources for one language
struct BuiltinLanguage {
    name: &'static str,
    language: fn() -> Language,
    injections: &'static str,
    locals: &'static str,
    highlights: &'static str,
    extensions: &'static [&'static str],
    aliases: &'static [&'static str],
}

fn javascript() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

fn html() -> Language {
    tree_sitter_html::LANGUAGE.into()
}

fn css() -> Language {
    tree_sitter_css::LANGUAGE.into()
}

fn json() -> Language {
    tree_sitter_json::LANGUAGE.into()
}

fn rust() -> Language {
    tree_sitter_rust::LANGUAGE.into()
}

fn python() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

const BUILTIN_LANGUAGES: &[BuiltinLanguage] = &[
    BuiltinLanguage {
        name: "javascript",
        language: javascript,
        injections: tree_sitter_javascript::INJECTIONS_QUERY,
        locals: tree_sitter_javascript::LOCALS_QUERY,
        highlights: tree_sitter_javascript::HIGHLIGHT_QUERY,
        extensions: &["js", "mjs", "cjs", "jsx"],
        aliases: &["js", "jsx", "node", "ecmascript"],
    },
    BuiltinLanguage {
        name: "html",
        language: html,
        injections: tree_sitter_html::INJECTIONS_QUERY,
        locals: "",
        highlights: tree_sitter_html::HIGHLIGHTS_QUERY,
        extensions: &["html", "htm", "xhtml"],
        aliases: &["htm", "xhtml"],
    },
    BuiltinLanguage {
        name: "css",
        language: css,
        injections: "",
        locals: "",
        highlights: tree_sitter_css::HIGHLIGHTS_QUERY,
        extensions: &["css"],
        aliases: &[],
    },
    BuiltinLanguage {
        name: "json",
        language: json,
        injections: "",
        locals: "",
        highlights: tree_sitter_json::HIGHLIGHTS_QUERY,
        extensions: &["json", "jsonc"],
        aliases: &["jsonc"],
    },
    BuiltinLanguage {
        name: "rust",
        language: rust,
        injections: tree_sitter_rust::INJECTIONS_QUERY,
        locals: "",
        highlights: tree_sitter_rust::HIGHLIGHTS_QUERY,
        extensions: &["rs"],
        aliases: &["rs"],
    },
    BuiltinLanguage {
        name: "python",
        language: python,
        injections: "",
        locals: "",
        highlights: tree_sitter_python::HIGHLIGHTS_QUERY,
        extensions: &["py", "pyi", "pyw"],
        aliases: &["py", "python3"],
    },
];

/// Known languages by name, alias and file extension
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    configs: HashMap<String, Arc<LanguageConfiguration>>,
    aliases: HashMap<String, String>,
    extensions: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every bundled grammar. Languages whose queries fail to
    /// compile are logged and left out.
    pub fn with_builtin_languages() -> Self {
        let mut registry = Self::new();
        for builtin in BUILTIN_LANGUAGES {
            let config = LanguageConfiguration::new(
                (builtin.language)(),
                builtin.name,
                builtin.injections,
                builtin.locals,
                builtin.highlights,
            );
            match config {
                Ok(config) => {
                    registry.register(config);
                    for alias in builtin.aliases {
                        registry.add_alias(*alias, builtin.name);
                    }
                    for extension in builtin.extensions {
                        registry
                            .extensions
                            .insert((*extension).to_string(), builtin.name.to_string());
                    }
                }
                Err(e) => tracing::error!("Failed to load {} language: {}", builtin.name, e),
            }
        }
        tracing::debug!("Loaded {} builtin languages", registry.configs.len());
        registry
    }

    /// Compile and register a language from query sources
    pub fn add_language(
        &mut self,
        language: Language,
        name: &str,
        injections: &str,
        locals: &str,
        highlights: &str,
    ) -> Result<Arc<LanguageConfiguration>, QueryCompileError> {
        let config = LanguageConfiguration::new(language, name, injections, locals, highlights)?;
        Ok(self.register(config))
    }

    /// Register a compiled configuration under its name, replacing any
    /// previous one
    pub fn register(&mut self, config: LanguageConfiguration) -> Arc<LanguageConfiguration> {
        let config = Arc::new(config);
        self.configs
            .insert(config.name.to_lowercase(), Arc::clone(&config));
        config
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, language: impl Into<String>) {
        self.aliases
            .insert(alias.into().to_lowercase(), language.into().to_lowercase());
    }

    pub fn add_extension(&mut self, extension: impl Into<String>, language: impl Into<String>) {
        self.extensions.insert(
            extension.into().trim_start_matches('.').to_lowercase(),
            language.into().to_lowercase(),
        );
    }

    /// Configuration for a language name or alias, as written in an
    /// injection query or a code fence (`JS`, ` python `, ...)
    pub fn resolve(&self, name: &str) -> Option<&LanguageConfiguration> {
        self.get(name).map(Arc::as_ref)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LanguageConfiguration>> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        self.configs.get(&name).or_else(|| {
            self.aliases
                .get(&name)
                .and_then(|canonical| self.configs.get(canonical))
        })
    }

    /// Detect the language of a file from its extension
    pub fn language_for_path(&self, path: &Path) -> Option<&LanguageConfiguration> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        let name = self.extensions.get(&extension)?;
        self.resolve(name)
    }

    /// Registered language names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Point every language's captures at `table`
    pub fn set_theme(&self, table: &HighlightThemeTable) {
        for config in self.configs.values() {
            config.set_highlight_configuration(table);
        }
    }
}
