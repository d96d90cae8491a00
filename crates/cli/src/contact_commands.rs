use std::path::Path;

use {
    anyhow::{Result, anyhow, bail},
    clap::Subcommand,
};

use wabridge_whatsapp::Contact;

#[derive(Subcommand)]
pub enum ContactAction {
    /// Look a contact up by phone number.
    Get { phone: String },
    /// Create the contact, or update it when the phone already exists.
    Upsert {
        phone: String,
        #[arg(long)]
        name: Option<String>,
        /// Custom variable as `key=value`; repeat for more.
        #[arg(long = "var")]
        variables: Vec<String>,
        /// Tag; repeat for more.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

pub async fn handle_contact(action: ContactAction, config: Option<&Path>) -> Result<()> {
    let client = crate::build_client(config)?;
    let contacts = client.contacts();

    match action {
        ContactAction::Get { phone } => {
            let Some(contact) = contacts.get(&phone).await? else {
                bail!("no contact with phone {phone}");
            };
            println!("{}", serde_json::to_string_pretty(&contact)?);
        },
        ContactAction::Upsert {
            phone,
            name,
            variables,
            tags,
        } => {
            let mut contact = Contact::new(phone);
            contact.name = name;
            contact.tags = tags;
            for raw in &variables {
                let (key, value) = parse_variable(raw)?;
                contact.variables.insert(key, value);
            }
            let saved = contacts.create_or_update(&contact).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        },
    }
    Ok(())
}

fn parse_variable(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("variable \"{raw}\" is not in key=value form"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("variable \"{raw}\" has an empty key");
    }
    Ok((key.to_string(), value.to_string()))
}
