use std::io::{BufWriter, Write};

use anyhow::Result;
use clap::Args;
use nscon::color::Rgb;
use owo_colors::OwoColorize;
use serde_json::json;

use super::Cli;

/// The colors Nintendo ships official controller variants in.
const PRESET_COLORS: [&str; 11] = [
    "#828282", "#0ab9e6", "#ff3c28", "#e6ff00", "#1edc00", "#ff3278", "#e10f00", "#4655f5",
    "#b400e6", "#faa005", "#ffffff",
];

/// List the factory preset colors.
#[derive(Args)]
pub struct PresetsCommand {}

impl PresetsCommand {
    pub fn execute(&self, root: &Cli) -> Result<()> {
        let mut stdout = BufWriter::new(anstream::stdout());

        if root.json {
            writeln!(stdout, "{}", json!(PRESET_COLORS)).unwrap();
            return Ok(());
        }

        for preset in PRESET_COLORS {
            let color: Rgb = preset.parse().unwrap();
            let [r, g, b] = color.bytes();
            writeln!(stdout, "{} {}", "██".truecolor(r, g, b), preset).unwrap();
        }

        stdout.flush().unwrap();

        Ok(())
    }
}
