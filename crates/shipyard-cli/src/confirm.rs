//! Interactive confirmation before deploying the local checkout.

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};

use shipyard_core::stamp::Stamp;

pub fn confirm_head_deploy(branch: Option<&str>, stamp: &Stamp) -> Result<bool> {
    let prompt = match branch {
        Some(branch) => format!(
            "Deploy branch {} at commit {}?",
            style(branch).green(),
            style(stamp).cyan()
        ),
        None => format!("Deploy detached HEAD at commit {}?", style(stamp).cyan()),
    };

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmed)
}
