//! Highlight themes
//!
//! Provides YAML-based themes with compile-time embedded built-ins and
//! user-defined themes from the config directory. A theme's `syntax:` map
//! names the highlights it styles; the order of that map fixes the
//! highlight ids of the resulting [`HighlightThemeTable`].
//!
//! Theme loading priority:
//! 1. User config: `~/.config/token-syntax/themes/{id}.yaml`
//! 2. Embedded: Built-in themes compiled into binary

use std::path::Path;

use serde::Deserialize;

use crate::syntax::{HighlightStyle, HighlightThemeTable};

// Embed theme YAML files at compile time
pub const DEFAULT_DARK_YAML: &str = include_str!("../themes/default-dark.yaml");
pub const DEFAULT_LIGHT_YAML: &str = include_str!("../themes/default-light.yaml");

/// A built-in theme entry
pub struct BuiltinTheme {
    /// Stable identifier for config (e.g. "default-dark")
    pub id: &'static str,
    /// Embedded YAML content
    pub yaml: &'static str,
}

/// Registry of all built-in themes
pub const BUILTIN_THEMES: &[BuiltinTheme] = &[
    BuiltinTheme {
        id: "default-dark",
        yaml: DEFAULT_DARK_YAML,
    },
    BuiltinTheme {
        id: "default-light",
        yaml: DEFAULT_LIGHT_YAML,
    },
];

/// Where the theme came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeSource {
    /// User-defined theme in ~/.config/token-syntax/themes/
    User,
    /// Built-in theme embedded in binary
    Builtin,
}

/// Information about an available theme
#[derive(Debug, Clone)]
pub struct ThemeInfo {
    /// Stable identifier (e.g., "default-dark", "my-custom-theme")
    pub id: String,
    /// Display name from YAML (e.g., "Default Dark")
    pub name: String,
    pub source: ThemeSource,
}

/// Load a theme from a YAML file
pub fn from_file(path: &Path) -> Result<Theme, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read theme file {}: {}", path.display(), e))?;
    Theme::from_yaml(&content)
}

/// Load theme by id with priority: user → builtin
pub fn load_theme(id: &str) -> Result<Theme, String> {
    if let Some(user_dir) = crate::config_paths::themes_dir() {
        let user_path = user_dir.join(format!("{}.yaml", id));
        if user_path.exists() {
            tracing::info!("Loading user theme from {}", user_path.display());
            return from_file(&user_path);
        }
    }

    tracing::info!("Loading builtin theme: {}", id);
    Theme::from_builtin(id)
}

/// List all available themes, user themes overriding builtins with the
/// same id
pub fn list_available_themes() -> Vec<ThemeInfo> {
    let mut themes = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    if let Some(user_dir) = crate::config_paths::themes_dir() {
        if let Ok(entries) = std::fs::read_dir(&user_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !path
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
                {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if seen_ids.insert(id.to_string()) {
                    let name = from_file(&path)
                        .map(|theme| theme.name)
                        .unwrap_or_else(|_| id.to_string());
                    themes.push(ThemeInfo {
                        id: id.to_string(),
                        name,
                        source: ThemeSource::User,
                    });
                }
            }
        }
    }

    for builtin in BUILTIN_THEMES {
        if seen_ids.insert(builtin.id.to_string()) {
            let name = Theme::from_yaml(builtin.yaml)
                .map(|t| t.name)
                .unwrap_or_else(|_| builtin.id.to_string());
            themes.push(ThemeInfo {
                id: builtin.id.to_string(),
                name,
                source: ThemeSource::Builtin,
            });
        }
    }

    themes
}

/// RGBA color (0-255 per channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color from RGB values (alpha defaults to 255)
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse from "#RRGGBB" or "#RRGGBBAA" hex string
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let hex = s.trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("Invalid color format: {}", s));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("Invalid color {}: {}", s, e))
        };
        match hex.len() {
            6 => Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Ok(Color::rgba(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => Err(format!("Invalid color format: {}", s)),
        }
    }

    /// `#RRGGBB`, or `#RRGGBBAA` when not opaque
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// 24-bit ANSI foreground escape for terminals
    pub fn ansi_fg(&self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }
}

/// Raw theme data as parsed from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeData {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub foreground: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    /// Highlight name → style, in file order
    #[serde(default)]
    pub syntax: serde_yaml::Mapping,
}

/// A syntax style as written in YAML: either a bare color or a full entry
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SyntaxStyleData {
    Color(String),
    Style {
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        bold: bool,
        #[serde(default)]
        italic: bool,
    },
}

/// Resolved theme with parsed colors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    /// Highlight names and their styles, in theme order
    pub syntax: Vec<(String, HighlightStyle)>,
}

impl Theme {
    /// Load theme from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let data: ThemeData =
            serde_yaml::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
        Self::from_data(data)
    }

    /// Load a built-in theme by id
    pub fn from_builtin(id: &str) -> Result<Self, String> {
        let entry = BUILTIN_THEMES
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| format!("Unknown theme id: {}", id))?;
        Theme::from_yaml(entry.yaml)
    }

    /// Convert raw theme data to resolved theme
    pub fn from_data(data: ThemeData) -> Result<Self, String> {
        let parse_color = |value: &Option<String>| value.as_deref().map(Color::from_hex).transpose();

        let mut syntax = Vec::with_capacity(data.syntax.len());
        for (key, value) in data.syntax {
            let name = key
                .as_str()
                .ok_or_else(|| format!("Syntax key must be a string: {:?}", key))?
                .to_string();
            let style: SyntaxStyleData = serde_yaml::from_value(value)
                .map_err(|e| format!("Invalid style for {}: {}", name, e))?;
            let style = match style {
                SyntaxStyleData::Color(color) => HighlightStyle {
                    color: Some(Color::from_hex(&color)?),
                    ..HighlightStyle::default()
                },
                SyntaxStyleData::Style {
                    color,
                    bold,
                    italic,
                } => HighlightStyle {
                    color: parse_color(&color)?,
                    bold,
                    italic,
                },
            };
            syntax.push((name, style));
        }

        Ok(Theme {
            name: data.name,
            foreground: parse_color(&data.foreground)?,
            background: parse_color(&data.background)?,
            syntax,
        })
    }

    /// Highlight table for this theme; ids follow the `syntax:` order
    pub fn highlight_table(&self) -> HighlightThemeTable {
        let mut table = HighlightThemeTable::new();
        for (name, style) in &self.syntax {
            table.insert(name.as_str(), *style);
        }
        table
    }

    /// Default dark theme, or an unstyled one if the embedded YAML is broken
    pub fn default_dark() -> Self {
        match Theme::from_yaml(DEFAULT_DARK_YAML) {
            Ok(theme) => theme,
            Err(e) => {
                tracing::error!("Builtin default-dark theme is invalid: {}", e);
                Theme {
                    name: "Default Dark".to_string(),
                    foreground: Some(Color::rgb(0xD4, 0xD4, 0xD4)),
                    background: Some(Color::rgb(0x1E, 0x1E, 0x1E)),
                    syntax: Vec::new(),
                }
            }
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_dark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(Color::from_hex("#FF8000").unwrap(), Color::rgb(255, 128, 0));
        assert_eq!(
            Color::from_hex("#FF800080").unwrap(),
            Color::rgba(255, 128, 0, 128)
        );
        assert!(Color::from_hex("#FFF").is_err());
        assert!(Color::from_hex("#GG0000").is_err());
        assert!(Color::from_hex("#ÿÿÿ").is_err());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(Color::rgb(1, 2, 255).to_hex(), "#0102FF");
        assert_eq!(Color::rgba(1, 2, 3, 4).to_hex(), "#01020304");
    }

    #[test]
    fn test_builtin_themes_parse() {
        for builtin in BUILTIN_THEMES {
            let theme = Theme::from_yaml(builtin.yaml)
                .unwrap_or_else(|e| panic!("{} failed: {}", builtin.id, e));
            assert!(!theme.syntax.is_empty(), "{}", builtin.id);
        }
    }

    #[test]
    fn test_syntax_order_fixes_highlight_ids() {
        let theme = Theme::from_yaml(
            r##"
version: 1
name: Test
syntax:
  keyword: "#C678DD"
  string:
    color: "#98C379"
    italic: true
  comment:
    italic: true
"##,
        )
        .unwrap();

        let table = theme.highlight_table();
        assert_eq!(table.name(crate::syntax::Highlight(0)), Some("keyword"));
        assert_eq!(table.name(crate::syntax::Highlight(1)), Some("string"));
        assert_eq!(table.name(crate::syntax::Highlight(2)), Some("comment"));

        let string = table.style(crate::syntax::Highlight(1));
        assert_eq!(string.color, Some(Color::rgb(0x98, 0xC3, 0x79)));
        assert!(string.italic);
        assert!(!string.bold);
        assert_eq!(table.style(crate::syntax::Highlight(2)).color, None);
    }

    #[test]
    fn test_invalid_color_is_an_error() {
        let err = Theme::from_yaml("version: 1\nname: Bad\nsyntax:\n  keyword: \"#XYZ\"\n")
            .unwrap_err();
        assert!(err.contains("XYZ"), "{err}");
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(Theme::from_builtin("no-such-theme").is_err());
    }
}
