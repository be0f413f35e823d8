//! Configuration management.

use anyhow::{bail, Context, Result};
use decky_hw::Rotation;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::actions;
use crate::widgets;

/// Longest accepted widget `update_interval`, in seconds (one day).
pub const MAX_WIDGET_INTERVAL_SECS: f64 = 86_400.0;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Page shown at startup and after reconnects
    #[serde(default = "default_main_page")]
    pub main_page: String,

    /// Extra directories searched for icons and animations
    #[serde(default)]
    pub icon_dirs: Vec<String>,

    /// Device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Background worker cadences
    #[serde(default)]
    pub timing: TimingConfig,

    /// D-Bus settings
    #[serde(default)]
    pub dbus: DbusConfig,

    /// Named styles; `default` applies to every button
    #[serde(default)]
    pub styles: HashMap<String, StyleConfig>,

    /// Pages by name
    pub pages: BTreeMap<String, Page>,

    /// Directory of the loaded file, used for relative icon paths
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Device configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Backlight brightness in percent
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Key image rotation in degrees (0, 90, 180, 270)
    #[serde(default)]
    pub rotation: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            rotation: 0,
        }
    }
}

impl DeviceConfig {
    /// Brightness clamped to the device range.
    pub fn brightness(&self) -> u8 {
        self.brightness.min(100)
    }

    /// Parsed rotation. Validated at load time.
    pub fn rotation(&self) -> Rotation {
        Rotation::try_from(self.rotation).unwrap_or_default()
    }
}

/// Background worker cadences in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Health check interval while connected
    #[serde(default = "default_connection_check")]
    pub connection_check: u64,

    /// Reconnect attempt interval while disconnected
    #[serde(default = "default_reconnect")]
    pub reconnect: u64,

    /// Animation tick
    #[serde(default = "default_animation_tick")]
    pub animation_tick: u64,

    /// Screen lock poll interval
    #[serde(default = "default_lock_poll")]
    pub lock_poll: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connection_check: default_connection_check(),
            reconnect: default_reconnect(),
            animation_tick: default_animation_tick(),
            lock_poll: default_lock_poll(),
        }
    }
}

impl TimingConfig {
    pub fn connection_check(&self) -> Duration {
        Duration::from_millis(self.connection_check.max(1))
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect.max(1))
    }

    pub fn animation_tick(&self) -> Duration {
        Duration::from_millis(self.animation_tick.max(1))
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll.max(1))
    }
}

/// D-Bus bus selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbusBusType {
    /// Try session bus first, fall back to system bus
    #[default]
    Auto,
    Session,
    System,
    /// Do not export the control interface
    Off,
}

/// D-Bus configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbusConfig {
    #[serde(default)]
    pub bus: DbusBusType,
}

/// Vertical text placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    #[serde(alias = "middle")]
    Center,
    #[default]
    Bottom,
}

/// Horizontal text placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// One layer of the style cascade. Unset fields inherit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleConfig {
    pub font: Option<String>,
    pub font_size: Option<f32>,
    pub text_color: Option<String>,
    pub background_color: Option<String>,
    pub text_align: Option<VAlign>,
    pub text_halign: Option<HAlign>,
    pub padding: Option<u32>,
    pub text_offset: Option<i32>,
    pub border_size: Option<u32>,
    pub border_color: Option<String>,
}

/// A named set of key bindings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    /// Filled in from the table key after loading
    #[serde(skip)]
    pub name: String,

    /// Buttons by zero-based key index (one-based in the file)
    #[serde(default, deserialize_with = "deserialize_buttons")]
    pub buttons: BTreeMap<usize, ButtonSpec>,
}

impl Page {
    /// Button bound to `key`, if any.
    pub fn button(&self, key: usize) -> Option<&ButtonSpec> {
        self.buttons.get(&key)
    }
}

/// Declarative content and behaviour of one key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ButtonSpec {
    #[serde(default, alias = "label")]
    pub text: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    /// Named style from `[styles]`
    #[serde(default)]
    pub style: Option<String>,

    #[serde(default)]
    pub widget: Option<WidgetSpec>,

    #[serde(default)]
    pub action: Option<ActionSpec>,

    /// Multi-frame image (GIF) shown instead of a static icon
    #[serde(default)]
    pub animation: Option<String>,

    #[serde(default = "default_true", rename = "loop")]
    pub looping: bool,

    /// Inline style fields
    #[serde(flatten)]
    pub overrides: StyleConfig,
}

impl ButtonSpec {
    /// Image that drives this button's animation: an explicit `animation`,
    /// or an icon with a `.gif` extension.
    pub fn animation_source(&self) -> Option<&str> {
        self.animation.as_deref().or_else(|| {
            self.icon
                .as_deref()
                .filter(|icon| icon.to_lowercase().ends_with(".gif"))
        })
    }
}

/// Auto-updating text source.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetSpec {
    #[serde(rename = "type")]
    pub kind: String,

    /// Refresh interval in seconds
    #[serde(default)]
    pub update_interval: Option<f64>,

    /// Widget-specific parameters
    #[serde(flatten)]
    pub params: toml::Table,
}

impl WidgetSpec {
    /// String parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Boolean parameter.
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }

    /// Refresh interval: explicit `update_interval`, else derived from the
    /// widget type and, for clocks, the format string.
    pub fn interval(&self) -> Duration {
        let explicit = self
            .update_interval
            .filter(|&secs| valid_interval(secs))
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        if let Some(interval) = explicit {
            return interval;
        }
        match self.kind.as_str() {
            "datetime" | "clock" => {
                datetime_interval(self.param_str("format").unwrap_or(widgets::DEFAULT_TIME_FORMAT))
            }
            "cpu" | "network" => Duration::from_secs(2),
            "memory" => Duration::from_secs(5),
            "disk" => Duration::from_secs(30),
            _ => Duration::from_secs(60),
        }
    }
}

/// Positive, finite and at most [`MAX_WIDGET_INTERVAL_SECS`].
fn valid_interval(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0 && secs <= MAX_WIDGET_INTERVAL_SECS
}

/// Picks a refresh interval fine enough for the smallest unit a strftime
/// format shows.
pub fn datetime_interval(format: &str) -> Duration {
    if ["%S", "%s", "%T", "%X", "%r", "%c"]
        .iter()
        .any(|spec| format.contains(spec))
    {
        Duration::from_secs(1)
    } else if ["%M", "%H", "%I", "%p", "%R", "%k", "%l"]
        .iter()
        .any(|spec| format.contains(spec))
    {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(60)
    }
}

/// Button action binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,

    /// Action-specific parameters
    #[serde(flatten)]
    pub params: toml::Table,
}

impl ActionSpec {
    /// String parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Integer parameter.
    pub fn param_int(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_integer())
    }

    /// Target of a `page` action.
    pub fn page_target(&self) -> Option<&str> {
        if self.kind == "page" {
            self.param_str("page")
        } else {
            None
        }
    }
}

fn deserialize_buttons<'de, D>(deserializer: D) -> Result<BTreeMap<usize, ButtonSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, ButtonSpec>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, spec)| match key.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Ok((n - 1, spec)),
            _ => Err(serde::de::Error::custom(format!(
                "invalid button number '{}' (buttons are numbered from 1)",
                key
            ))),
        })
        .collect()
}

// Default value functions
fn default_main_page() -> String {
    "main".to_string()
}

fn default_brightness() -> u8 {
    100
}

fn default_connection_check() -> u64 {
    500
}

fn default_reconnect() -> u64 {
    2000
}

fn default_animation_tick() -> u64 {
    50
}

fn default_lock_poll() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).context("Failed to read configuration file")?;
        let base_dir = path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self::parse(&content, base_dir)
    }

    /// Parses and validates configuration text.
    pub fn parse(content: &str, base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.base_dir = base_dir;
        for (name, page) in config.pages.iter_mut() {
            page.name = name.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks cross references that serde cannot.
    fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            bail!("Configuration must define at least one page");
        }
        if !self.pages.contains_key(&self.main_page) {
            bail!("Main page '{}' is not defined", self.main_page);
        }
        if Rotation::try_from(self.device.rotation).is_err() {
            bail!(
                "Invalid rotation {} (expected 0, 90, 180 or 270)",
                self.device.rotation
            );
        }

        for page in self.pages.values() {
            for (key, button) in &page.buttons {
                let label = format!("page '{}' button {}", page.name, key + 1);

                if let Some(style) = &button.style {
                    if style != "default" && !self.styles.contains_key(style) {
                        warn!("{}: unknown style '{}', using defaults", label, style);
                    }
                }

                if let Some(action) = &button.action {
                    if !actions::is_registered(&action.kind) {
                        bail!("{}: unknown action type '{}'", label, action.kind);
                    }
                    if action.kind == "page" {
                        let target = action
                            .page_target()
                            .with_context(|| format!("{}: page action requires 'page'", label))?;
                        if !self.pages.contains_key(target) {
                            bail!("{}: page '{}' is not defined", label, target);
                        }
                    }
                }

                if let Some(widget) = &button.widget {
                    if !widgets::is_registered(&widget.kind) {
                        bail!("{}: unknown widget type '{}'", label, widget.kind);
                    }
                    if let Some(secs) = widget.update_interval {
                        if !valid_interval(secs) {
                            bail!(
                                "{}: update_interval {} must be between 0 and {} seconds",
                                label,
                                secs,
                                MAX_WIDGET_INTERVAL_SECS
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Looks up a page by name.
    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages.get(name)
    }

    /// Page names in sorted order.
    pub fn page_names(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DECKY_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".decky").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
main_page = "main"

[device]
brightness = 70

[styles.default]
font_size = 12
text_color = "#FFFFFF"

[styles.big]
font_size = 20
text_align = "middle"

[pages.main.buttons.1]
text = "Terminal"
style = "big"
action = { type = "command", command = "konsole" }

[pages.main.buttons.2]
label = "Settings"
font_size = 9
action = { type = "page", page = "settings" }

[pages.main.buttons.5]
icon = "spinner.gif"
loop = false

[pages.settings.buttons.1]
widget = { type = "datetime", format = "%H:%M:%S" }
action = { type = "page", page = "main" }
"##;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE, None).unwrap();
        assert_eq!(config.main_page, "main");
        assert_eq!(config.device.brightness(), 70);
        assert_eq!(config.device.rotation(), Rotation::Rot0);
        assert_eq!(config.timing.connection_check(), Duration::from_millis(500));
        assert_eq!(config.timing.reconnect(), Duration::from_millis(2000));
        assert_eq!(config.dbus.bus, DbusBusType::Auto);
        assert_eq!(config.page_names(), vec!["main", "settings"]);

        let main = config.page("main").unwrap();
        assert_eq!(main.name, "main");
        // One-based in the file, zero-based in memory
        let terminal = main.button(0).unwrap();
        assert_eq!(terminal.text.as_deref(), Some("Terminal"));
        assert_eq!(terminal.action.as_ref().unwrap().param_str("command"), Some("konsole"));

        let settings = main.button(1).unwrap();
        assert_eq!(settings.text.as_deref(), Some("Settings"));
        assert_eq!(settings.overrides.font_size, Some(9.0));
        assert_eq!(settings.action.as_ref().unwrap().page_target(), Some("settings"));

        let gif = main.button(4).unwrap();
        assert_eq!(gif.animation_source(), Some("spinner.gif"));
        assert!(!gif.looping);
        assert!(terminal.looping);

        assert_eq!(config.styles["big"].text_align, Some(VAlign::Center));
    }

    #[test]
    fn test_missing_main_page() {
        let err = Config::parse("main_page = \"home\"\n[pages.main]\n", None).unwrap_err();
        assert!(err.to_string().contains("home"));
    }

    #[test]
    fn test_dangling_page_action() {
        let toml = r#"
[pages.main.buttons.1]
action = { type = "page", page = "nowhere" }
"#;
        let err = Config::parse(toml, None).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_unknown_action_type() {
        let toml = r#"
[pages.main.buttons.1]
action = { type = "teleport" }
"#;
        assert!(Config::parse(toml, None).is_err());
    }

    #[test]
    fn test_zero_button_number_rejected() {
        let toml = r#"
[pages.main.buttons.0]
text = "nope"
"#;
        assert!(Config::parse(toml, None).is_err());
    }

    #[test]
    fn test_invalid_rotation_rejected() {
        let toml = "[device]\nrotation = 45\n[pages.main]\n";
        assert!(Config::parse(toml, None).is_err());
    }

    #[test]
    fn test_widget_intervals() {
        assert_eq!(datetime_interval("%H:%M:%S"), Duration::from_secs(1));
        assert_eq!(datetime_interval("%H:%M"), Duration::from_secs(10));
        assert_eq!(datetime_interval("%A %d"), Duration::from_secs(60));

        let config = Config::parse(SAMPLE, None).unwrap();
        let widget = config.page("settings").unwrap().button(0).unwrap().widget.clone().unwrap();
        assert_eq!(widget.interval(), Duration::from_secs(1));

        let explicit = WidgetSpec {
            kind: "cpu".to_string(),
            update_interval: Some(0.5),
            params: toml::Table::new(),
        };
        assert_eq!(explicit.interval(), Duration::from_millis(500));

        let huge = WidgetSpec {
            update_interval: Some(1e300),
            ..explicit
        };
        assert_eq!(huge.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_out_of_range_update_interval_rejected() {
        for value in ["1e300", "-1.0", "0.0", "100000.0"] {
            let toml = format!(
                "[pages.main.buttons.1]\nwidget = {{ type = \"cpu\", update_interval = {} }}\n",
                value
            );
            let err = Config::parse(&toml, None).unwrap_err();
            assert!(err.to_string().contains("update_interval"), "{}", value);
        }

        let toml = "[pages.main.buttons.1]\nwidget = { type = \"cpu\", update_interval = 86400.0 }\n";
        assert!(Config::parse(toml, None).is_ok());
    }

    #[test]
    fn test_shipped_example_config() {
        let config = Config::parse(include_str!("../../../config/example.toml"), None).unwrap();
        assert_eq!(config.page_names(), vec!["main", "tools"]);
        assert_eq!(config.dbus.bus, DbusBusType::Auto);

        let tools = config.page("tools").unwrap();
        assert_eq!(tools.button(0).unwrap().animation_source(), Some("loading.gif"));
        assert_eq!(
            tools.button(14).unwrap().action.as_ref().unwrap().page_target(),
            Some("main")
        );
    }
}
