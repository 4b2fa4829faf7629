use serde::{Deserialize, Serialize};
use dirs_next::home_dir;
use std::{fmt, fs, path::{Path, PathBuf}};
use thiserror::Error;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Asset {}: {reason}", path.display())]
    Asset { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ConfigError::Io { path: path.to_path_buf(), source }
    }
}

/// Theme file as written by the panel configurator.
///
/// Output geometry is deliberately absent, it always comes from the
/// device profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub display: DisplayTheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayTheme {
    pub background: BackgroundConfig,
    #[serde(default)]
    pub foreground: ForegroundConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub date: TextConfig,
    #[serde(default)]
    pub time: TextConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKind {
    Image,
    Gif,
    Video,
    ImageCollection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: BackgroundKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForegroundConfig {
    #[serde(default)]
    pub enabled: bool,
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self { enabled: false, path: None, position: Position::default(), alpha: default_alpha() }
    }
}

fn default_alpha() -> f32 { 1.0 }

/// Sensor readouts; names the host cannot read are skipped when drawing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub configs: Vec<MetricConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_metric_font")]
    pub font_size: u32,
    #[serde(default)]
    pub color: HexColor,
    #[serde(default = "default_format")]
    pub format_string: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_metric_font() -> u32 { 16 }
fn default_text_font() -> u32 { 20 }
fn default_format() -> String { "{label}{value}".to_string() }
fn default_true() -> bool { true }

/// Date or time overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_text_font")]
    pub font_size: u32,
    #[serde(default)]
    pub color: HexColor,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            position: Position::default(),
            font_size: default_text_font(),
            color: HexColor::default(),
        }
    }
}

/// `#RRGGBB` or `#RRGGBBAA`, opaque white by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub [u8; 4]);

impl Default for HexColor {
    fn default() -> Self { HexColor([255, 255, 255, 255]) }
}

impl HexColor {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let hex = s.trim().trim_start_matches('#');
        let bad = || ConfigError::Validation(format!("invalid hex colour '{}'", s));
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(bad());
        }
        let mut rgba = [255u8; 4];
        for (i, slot) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
            *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| bad())?;
        }
        Ok(HexColor(rgba))
    }

    pub fn rgb(&self) -> [u8; 3] { [self.0[0], self.0[1], self.0[2]] }
    pub fn alpha(&self) -> u8 { self.0[3] }
}

impl TryFrom<String> for HexColor {
    type Error = ConfigError;
    fn try_from(s: String) -> Result<Self, Self::Error> { HexColor::parse(&s) }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> String { c.to_string() }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
    }
}

/// Read, parse and validate a theme file.
///
/// Relative asset paths are resolved against the file's directory.
pub fn load(path: &Path) -> Result<ThemeConfig, ConfigError> {
    let mut cfg = read_yaml(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_paths(&mut cfg, base);
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
pub fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/trlcd/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/trlcd/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/trlcd.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["trlcd.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<ThemeConfig, ConfigError> {
    let s = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let cfg: ThemeConfig = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

fn resolve_paths(cfg: &mut ThemeConfig, base: &Path) {
    let anchor = |p: &Path| if p.is_relative() { base.join(p) } else { p.to_path_buf() };
    let display = &mut cfg.display;
    display.background.path = anchor(&display.background.path);
    if let Some(fg) = display.foreground.path.as_mut() {
        *fg = anchor(fg);
    }
}

fn validate(cfg: &ThemeConfig) -> Result<(), ConfigError> {
    let d = &cfg.display;
    if d.background.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("background path is empty".into()));
    }
    if d.foreground.enabled {
        if d.foreground.path.is_none() {
            return Err(ConfigError::Validation("foreground enabled without a path".into()));
        }
        if !(0.0..=1.0).contains(&d.foreground.alpha) {
            return Err(ConfigError::Validation(format!(
                "foreground alpha {} outside 0.0..=1.0", d.foreground.alpha
            )));
        }
    }
    for (name, text) in [("date", &d.date), ("time", &d.time)] {
        if text.enabled && text.font_size == 0 {
            return Err(ConfigError::Validation(format!("{} font_size must be > 0", name)));
        }
    }
    if let Some(m) = d.metrics.configs.iter().find(|m| m.font_size == 0) {
        return Err(ConfigError::Validation(format!("metric {} font_size must be > 0", m.name)));
    }
    Ok(())
}
