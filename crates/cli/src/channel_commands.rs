//! CLI subcommands for the sending channel.

use std::path::Path;

use {anyhow::Result, clap::Subcommand};

#[derive(Subcommand)]
pub enum ChannelAction {
    /// Resolve the sending channel (static id or discovery) and print it.
    Resolve,
}

pub async fn handle_channel(action: ChannelAction, config: Option<&Path>) -> Result<()> {
    let client = crate::build_client(config)?;
    match action {
        ChannelAction::Resolve => {
            let channel = client.channel().await?;
            println!("{}", serde_json::to_string_pretty(&channel)?);
            eprintln!("config status: {}", client.config_status().as_str());
        },
    }
    Ok(())
}
