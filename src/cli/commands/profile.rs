use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::{fail, output_record, output_success, parse_assignments};
use crate::cli::OutputFormat;
use crate::services::Services;

#[derive(Subcommand)]
pub enum ProfileCommands {
    #[command(about = "Show the signed-in user's profile")]
    Show,

    #[command(about = "Update profile fields")]
    Update {
        #[arg(required = true, help = "Fields as key=value")]
        fields: Vec<String>,
    },
}

pub async fn handle(cmd: ProfileCommands, services: &Services, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ProfileCommands::Show => match services.auth.get_user_profile(None).await {
            Some(profile) => output_record(&output_format, &Value::Object(profile.into_map())),
            None => fail(&output_format, "No profile available", "PROFILE_NOT_FOUND"),
        },
        ProfileCommands::Update { fields } => {
            let updates = parse_assignments(&fields)?;
            match services.auth.update_profile(updates).await {
                Ok(profile) => output_success(
                    &output_format,
                    "Profile updated",
                    Some(Value::Object(profile.into_map())),
                ),
                Err(e) => fail(&output_format, &e.to_string(), e.error_code()),
            }
        }
    }
}
