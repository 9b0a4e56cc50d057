//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Logger initialization
//! - Folder structure initialization

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, WriteStyle};
use log::kv::Key;
use std::io::Write;

use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

const DARK_GREY: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::BrightBlack)));
const CYAN: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan)));

/// Format the `duration` key-value as `12.34 ms`, padded to width 10.
fn format_duration(raw: &str) -> String {
    if let Some(idx) = raw.find(|c: char| c.is_alphabetic()) {
        let (num, unit) = (&raw[..idx], &raw[idx..]);
        if let Ok(val) = num.parse::<f32>() {
            // Insert space between number and unit
            return format!("{:.2} {}", val, unit);
        }
    }
    raw.to_string()
}

/// Initialize the logger. `RUST_LOG` overrides the default filters.
pub fn initialize_logger() {
    Builder::new()
        .write_style(WriteStyle::Auto)
        .format(|buf, record| {
            let ts = buf.timestamp();
            let level_style = buf.default_level_style(record.level());

            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| format_duration(&v.to_string()))
                .unwrap_or_default();

            // Right-align or pad the duration field to width 10
            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!("{CYAN}{:>10}{CYAN:#}", dur_raw)
            };

            writeln!(
                buf,
                "{DARK_GREY}{}{DARK_GREY:#} {level_style}{}{level_style:#} {DARK_GREY}{}{DARK_GREY:#}",
                ts,
                record.level(),
                record.target()
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        // Only show INFO+ globally, WARN+ for Rocket
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .filter(Some("_"), log::LevelFilter::Warn)
        .parse_env(Env::default())
        .init();
}

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create the uploads root and its staging directory.
pub fn initialize_folder(config: &AppConfig) -> Result<()> {
    std::fs::create_dir_all(config.incoming_dir()).context(format!(
        "failed to create uploads folder {:?}",
        config.uploads_root
    ))?;
    Ok(())
}
