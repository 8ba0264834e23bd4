use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use clap::Args;
use nscon::{
    color::{ColorSet, ColorType, Rgb},
    controller::{Controller, ControllerKind},
};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;

use super::Cli;
use crate::async_hid_impl::open_controller;

/// Detect the connected controller and view general information about it.
#[derive(Args)]
pub struct ProbeCommand {}

impl ProbeCommand {
    pub async fn execute(&self, root: &Cli) -> Result<()> {
        let device = open_controller().await?;
        let controller = Controller::connect(device)
            .await
            .context("could not establish a controller session")?;

        let probed = ProbedController {
            product_name: controller.product_name().to_owned(),
            kind: controller.kind(),
            mac_addr: controller.mac_addr().to_owned(),
            serial_number: controller.serial_number().to_owned(),
            firmware: controller.firmware().to_owned(),
            voltage: controller.voltage(),
            battery_percentage: (controller.battery_level() * 100.0).round() as u8,
            color_type: controller.color_type(),
            colors: controller.colors(),
        };

        let mut stdout = BufWriter::new(anstream::stdout());

        if root.json {
            writeln!(stdout, "{}", json!(probed)).unwrap();
            return Ok(());
        }

        writeln!(
            stdout,
            "{} ({}) ({})",
            probed.product_name,
            probed.kind.green(),
            probed.firmware.bright_black()
        )
        .unwrap();
        writeln!(stdout, " │").unwrap();
        writeln!(
            stdout,
            " ├─ MAC ADDRESS: {}",
            probed.mac_addr.bright_black()
        )
        .unwrap();
        writeln!(
            stdout,
            " ├─ SERIAL NUMBER: {}",
            probed.serial_number.bright_black()
        )
        .unwrap();

        let percentage = format!("{}%", probed.battery_percentage);
        let percentage = match probed.battery_percentage {
            50..=100 => percentage.green().into_styled(),
            20..=49 => percentage.yellow().into_styled(),
            _ => percentage.bright_red().into_styled(),
        };
        writeln!(
            stdout,
            " ├─ BATTERY: {} ({:.2} V)",
            percentage, probed.voltage
        )
        .unwrap();

        writeln!(stdout, " ╰─ COLORS ({:?}):", probed.color_type.bright_black()).unwrap();
        let colors = [
            ("BODY", probed.colors.body),
            ("BUTTON", probed.colors.button),
            ("LEFT GRIP", probed.colors.left_grip),
            ("RIGHT GRIP", probed.colors.right_grip),
        ];
        for (i, (label, color)) in colors.into_iter().enumerate() {
            writeln!(
                stdout,
                "    {} {} {}: {}",
                if i == colors.len() - 1 { "╰─" } else { "├─" },
                swatch(color),
                label,
                color.bright_black()
            )
            .unwrap();
        }

        stdout.flush().unwrap();

        Ok(())
    }
}

fn swatch(color: Rgb) -> String {
    let [r, g, b] = color.bytes();
    "●".truecolor(r, g, b).to_string()
}

#[derive(Serialize)]
struct ProbedController {
    product_name: String,
    kind: ControllerKind,
    mac_addr: String,
    serial_number: String,
    firmware: String,
    voltage: f64,
    battery_percentage: u8,
    color_type: ColorType,
    colors: ColorSet,
}
