use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{fail, output_record, output_success, value_or_prompt};
use crate::cli::OutputFormat;
use crate::services::Services;
use crate::session::UserData;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Sign in with email and password")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Register a new staff account")]
    Register {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Full name")]
        full_name: String,
        #[arg(long, help = "Role, e.g. waiter or manager")]
        role: Option<String>,
        #[arg(long, help = "Restaurant id")]
        restaurant: Option<String>,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Sign out and forget the stored session")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show current user information")]
    Whoami,

    #[command(about = "Send a password reset email")]
    Reset {
        #[arg(help = "Email")]
        email: String,
    },
}

pub async fn handle(cmd: AuthCommands, services: &Services, output_format: OutputFormat) -> anyhow::Result<()> {
    let auth = &services.auth;

    match cmd {
        AuthCommands::Login { email, password } => {
            let password = value_or_prompt(password, "Password")?;
            match auth.sign_in(&email, &password).await {
                Ok(data) => output_success(
                    &output_format,
                    &format!(
                        "Signed in as {}",
                        data.user.as_ref().and_then(|u| u.email.as_deref()).unwrap_or(email.trim())
                    ),
                    Some(json!({ "user": data.user })),
                ),
                Err(e) => fail(&output_format, &e.to_string(), e.error_code()),
            }
        }
        AuthCommands::Register { email, full_name, role, restaurant, password } => {
            let password = value_or_prompt(password, "Password")?;
            let user_data = UserData {
                full_name,
                role,
                restaurant_id: restaurant,
            };
            match auth.sign_up(&email, &password, &user_data).await {
                Ok(data) => {
                    let message = if data.session.is_some() {
                        "Registered and signed in".to_string()
                    } else {
                        format!("Registered; check {} to confirm the account", email.trim())
                    };
                    output_success(&output_format, &message, Some(json!({ "user": data.user })))
                }
                Err(e) => fail(&output_format, &e.to_string(), e.error_code()),
            }
        }
        AuthCommands::Logout => match auth.sign_out().await {
            Ok(()) => output_success(&output_format, "Signed out", None),
            Err(e) => fail(&output_format, &e.to_string(), e.error_code()),
        },
        AuthCommands::Status => {
            let authenticated = auth.is_authenticated().await;
            let message = if authenticated { "Authenticated" } else { "Not authenticated" };
            output_success(&output_format, message, Some(json!({ "authenticated": authenticated })))
        }
        AuthCommands::Whoami => match auth.get_current_user().await {
            Some(user) => output_record(&output_format, &serde_json::to_value(&user)?),
            None => fail(&output_format, "Not authenticated", "NOT_AUTHENTICATED"),
        },
        AuthCommands::Reset { email } => match auth.reset_password(&email).await {
            Ok(result) => output_success(
                &output_format,
                &format!("Password reset email sent to {}", result.email),
                Some(serde_json::to_value(&result)?),
            ),
            Err(e) => fail(&output_format, &e.to_string(), e.error_code()),
        },
    }
}
