use std::io::{BufWriter, Write};

use anyhow::{Context, Result, bail};
use clap::Args;
use nscon::{
    color::{ParseColorError, Rgb},
    controller::Controller,
};
use owo_colors::OwoColorize;
use serde_json::json;

use super::Cli;
use crate::async_hid_impl::open_controller;

/// Rewrite the persistent colors of the connected controller.
///
/// Only the passed fields are changed; everything else keeps the colors the
/// controller currently stores. The change survives reboots and re-pairing.
#[derive(Args)]
pub struct PaintCommand {
    /// The new body shell color (#rrggbb)
    #[arg(long, value_parser = parse_color)]
    body: Option<Rgb>,

    /// The new button color (#rrggbb)
    #[arg(long, value_parser = parse_color)]
    button: Option<Rgb>,

    /// The new left grip color (#rrggbb, Pro Controller only)
    #[arg(long, value_parser = parse_color)]
    left_grip: Option<Rgb>,

    /// The new right grip color (#rrggbb, Pro Controller only)
    #[arg(long, value_parser = parse_color)]
    right_grip: Option<Rgb>,
}

fn parse_color(src: &str) -> Result<Rgb, ParseColorError> {
    src.parse()
}

impl PaintCommand {
    pub async fn execute(&self, root: &Cli) -> Result<()> {
        if self.body.is_none()
            && self.button.is_none()
            && self.left_grip.is_none()
            && self.right_grip.is_none()
        {
            bail!("nothing to paint — pass at least one color option");
        }

        let device = open_controller().await?;
        let mut controller = Controller::connect(device)
            .await
            .context("could not establish a controller session")?;
        let before = controller.colors();

        let draft = controller.colors_mut();
        if let Some(color) = self.body {
            draft.body = color;
        }
        if let Some(color) = self.button {
            draft.button = color;
        }
        if let Some(color) = self.left_grip {
            draft.left_grip = color;
        }
        if let Some(color) = self.right_grip {
            draft.right_grip = color;
        }

        controller
            .submit_color()
            .await
            .context("could not write the new colors")?;
        let after = controller.colors();

        let mut stdout = BufWriter::new(anstream::stdout());

        if root.json {
            writeln!(stdout, "{}", json!({ "before": before, "after": after })).unwrap();
            return Ok(());
        }

        writeln!(
            stdout,
            "New colors written to {}:",
            controller.product_name()
        )
        .unwrap();
        let fields = [
            ("BODY", before.body, after.body),
            ("BUTTON", before.button, after.button),
            ("LEFT GRIP", before.left_grip, after.left_grip),
            ("RIGHT GRIP", before.right_grip, after.right_grip),
        ];
        for (i, (label, old, new)) in fields.into_iter().enumerate() {
            writeln!(
                stdout,
                " {} {}: {} {} -> {} {}",
                if i == fields.len() - 1 { "╰─" } else { "├─" },
                label,
                swatch(old),
                old.bright_black(),
                swatch(new),
                new
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
