use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::lcd::Timing;
use crate::pins::Pinout;

/// Shown once the panel is up, unless configured otherwise
pub const DEFAULT_GREETING: &str = "     \n     yeah Go!";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:7070";
pub const DEFAULT_HOLD_MS: u64 = 1000;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub lcd: Option<LcdConfig>,
    pub feed: Option<FeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LcdConfig {
    pub backend: Option<Backend>,
    pub pins: Option<Pinout>,       // BCM numbering
    pub toggle_us: Option<u32>,
    pub settle_us: Option<u32>,
    pub greeting: Option<String>,   // "" disables
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedConfig {
    pub listen: Option<String>,     // e.g. "0.0.0.0:7070"
    pub hold_ms: Option<u64>,
}

/// Where the pin bank comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// /sys/class/gpio
    #[default]
    Sysfs,
    /// /dev/gpiomem via rppal (needs the `rppal` feature)
    Rppal,
    /// record bus traffic in memory, no hardware
    Mock,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "lcdrelay", about = "Relay status text to a 2x16 character LCD", version)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// shorthand for --log-level debug
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,
    /// UDP address to receive status datagrams on
    #[arg(long)]
    pub listen: Option<String>,
    /// minimum time each text stays on the panel
    #[arg(long)]
    pub hold_ms: Option<u64>,
    /// text shown at startup, "" for none
    #[arg(long)]
    pub greeting: Option<String>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Defaults, then YAML, then CLI overrides, then validation
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    apply_cli_overrides(&mut cfg, cli);
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lcdrelay/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lcdrelay/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lcdrelay.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lcdrelay.yaml", "config.yaml", "config/lcdrelay.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    match (&mut dst.lcd, src.lcd) {
        (None, Some(c)) => dst.lcd = Some(c),
        (Some(d), Some(s)) => merge_lcd(d, s),
        _ => {}
    }
    match (&mut dst.feed, src.feed) {
        (None, Some(c)) => dst.feed = Some(c),
        (Some(d), Some(s)) => merge_feed(d, s),
        _ => {}
    }
}

fn merge_lcd(dst: &mut LcdConfig, src: LcdConfig) {
    if src.backend.is_some()    { dst.backend = src.backend; }
    if src.pins.is_some()       { dst.pins = src.pins; }
    if src.toggle_us.is_some()  { dst.toggle_us = src.toggle_us; }
    if src.settle_us.is_some()  { dst.settle_us = src.settle_us; }
    if src.greeting.is_some()   { dst.greeting = src.greeting; }
}

fn merge_feed(dst: &mut FeedConfig, src: FeedConfig) {
    if src.listen.is_some()     { dst.listen = src.listen; }
    if src.hold_ms.is_some()    { dst.hold_ms = src.hold_ms; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()       { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                     { cfg.log_level = Some("debug".to_string()); }

    if cli.backend.is_some() || cli.greeting.is_some() {
        let lcd = cfg.lcd.get_or_insert_with(LcdConfig::default);
        if cli.backend.is_some()     { lcd.backend = cli.backend; }
        if cli.greeting.is_some()    { lcd.greeting = cli.greeting.clone(); }
    }
    if cli.listen.is_some() || cli.hold_ms.is_some() {
        let feed = cfg.feed.get_or_insert_with(FeedConfig::default);
        if cli.listen.is_some()      { feed.listen = cli.listen.clone(); }
        if cli.hold_ms.is_some()     { feed.hold_ms = cli.hold_ms; }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    cfg.pinout()
        .validate()
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

    let timing = cfg.timing();
    if timing.toggle_us < Timing::MIN_TOGGLE_US {
        return Err(ConfigError::Validation(format!(
            "lcd toggle_us must be >= {}", Timing::MIN_TOGGLE_US
        )));
    }
    if timing.settle_us < Timing::MIN_SETTLE_US {
        return Err(ConfigError::Validation(format!(
            "lcd settle_us must be >= {}", Timing::MIN_SETTLE_US
        )));
    }

    cfg.listen_addr()?;
    Ok(())
}

impl Config {
    pub fn log_filter(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn backend(&self) -> Backend {
        self.lcd.as_ref().and_then(|l| l.backend).unwrap_or_default()
    }

    pub fn pinout(&self) -> Pinout {
        self.lcd.as_ref().and_then(|l| l.pins).unwrap_or_default()
    }

    pub fn timing(&self) -> Timing {
        let defaults = Timing::default();
        let lcd = self.lcd.as_ref();
        Timing {
            toggle_us: lcd.and_then(|l| l.toggle_us).unwrap_or(defaults.toggle_us),
            settle_us: lcd.and_then(|l| l.settle_us).unwrap_or(defaults.settle_us),
        }
    }

    pub fn greeting(&self) -> &str {
        self.lcd
            .as_ref()
            .and_then(|l| l.greeting.as_deref())
            .unwrap_or(DEFAULT_GREETING)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let listen = self
            .feed
            .as_ref()
            .and_then(|f| f.listen.as_deref())
            .unwrap_or(DEFAULT_LISTEN);
        listen.parse().map_err(|e| {
            ConfigError::Validation(format!("feed listen '{}' is not an address: {}", listen, e))
        })
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(
            self.feed.as_ref().and_then(|f| f.hold_ms).unwrap_or(DEFAULT_HOLD_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.backend(), Backend::Sysfs);
        assert_eq!(cfg.pinout(), Pinout::default());
        assert_eq!(cfg.timing(), Timing { toggle_us: 1, settle_us: 50 });
        assert_eq!(cfg.greeting(), DEFAULT_GREETING);
        assert_eq!(cfg.hold(), Duration::from_millis(1000));
        assert_eq!(cfg.listen_addr().unwrap().port(), 7070);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_yaml_parse() {
        let cfg = parse_yaml(
            "log_level: debug\n\
             lcd:\n  backend: mock\n  pins: { rs: 7, e: 8, d4: 9, d5: 10, d6: 11, d7: 12 }\n  settle_us: 80\n\
             feed:\n  listen: 127.0.0.1:9000\n  hold_ms: 250\n",
        )
        .unwrap();
        assert_eq!(cfg.log_filter(), "debug");
        assert_eq!(cfg.backend(), Backend::Mock);
        assert_eq!(cfg.pinout().rs, 7);
        assert_eq!(cfg.timing().settle_us, 80);
        assert_eq!(cfg.timing().toggle_us, 1);
        assert_eq!(cfg.hold(), Duration::from_millis(250));
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_cli_overrides_yaml() {
        let mut cfg = parse_yaml("lcd:\n  backend: sysfs\n  greeting: hi\n").unwrap();
        let cli = Cli {
            backend: Some(Backend::Mock),
            listen: Some("127.0.0.1:1234".to_string()),
            debug: true,
            ..Cli::default()
        };
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.backend(), Backend::Mock);
        assert_eq!(cfg.greeting(), "hi");
        assert_eq!(cfg.listen_addr().unwrap().port(), 1234);
        assert_eq!(cfg.log_filter(), "debug");
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut dst = parse_yaml("lcd:\n  settle_us: 60\n  greeting: a\n").unwrap();
        let src = parse_yaml("lcd:\n  greeting: b\n").unwrap();
        merge(&mut dst, src);
        assert_eq!(dst.timing().settle_us, 60);
        assert_eq!(dst.greeting(), "b");
    }

    #[test]
    fn test_validation_rejects_fast_timing() {
        let cfg = parse_yaml("lcd:\n  settle_us: 10\n").unwrap();
        assert!(matches!(validate(&cfg), Err(ConfigError::Validation(_))));
        let cfg = parse_yaml("lcd:\n  toggle_us: 0\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_pins() {
        let cfg = parse_yaml("lcd:\n  pins: { rs: 6, e: 6, d4: 25, d5: 24, d6: 23, d7: 17 }\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_listen() {
        let cfg = parse_yaml("feed:\n  listen: nowhere\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli { config: Some(PathBuf::from("/nonexistent/lcdrelay.yaml")), ..Cli::default() };
        assert!(matches!(load_with(&cli), Err(ConfigError::Validation(_))));
    }
}
