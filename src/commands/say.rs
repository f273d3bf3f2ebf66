use anyhow::{Context, Result};

use ticketbox::platform::ChannelHandle;

use super::App;

pub fn run(app: &App, channel: &str, text: &str, attachments: &[String]) -> Result<String> {
    let privileged = app.service.is_privileged(&app.who.scope, &app.who.user);
    let id = app
        .platform
        .post(
            &ChannelHandle::new(channel),
            &app.who.user,
            &app.who.label,
            text,
            attachments,
            privileged,
        )
        .with_context(|| format!("Could not post in channel {}", channel))?;
    println!("Posted message {} in channel {}", id, channel);
    Ok(id)
}
