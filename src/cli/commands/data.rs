use serde_json::Value;

use crate::cli::utils::{fail, output_rows};
use crate::cli::OutputFormat;
use crate::queries::{self, MENU_ITEMS, TABS};
use crate::services::Services;

fn field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("-")
}

pub async fn tabs(services: &Services, output_format: OutputFormat) -> anyhow::Result<()> {
    let Some(user) = services.auth.get_current_user().await else {
        return fail(&output_format, "Not authenticated", "NOT_AUTHENTICATED");
    };

    match queries::user_tabs(&services.data, &user.id).await {
        Ok(rows) => output_rows(&output_format, TABS, &rows, |row| {
            format!("{}  {}  {}", field(row, "id"), field(row, "status"), field(row, "created_at"))
        }),
        Err(e) => fail(&output_format, &e.to_string(), "QUERY_FAILED"),
    }
}

pub async fn menu(restaurant_id: &str, services: &Services, output_format: OutputFormat) -> anyhow::Result<()> {
    match queries::menu_items(&services.data, restaurant_id).await {
        Ok(rows) => output_rows(&output_format, MENU_ITEMS, &rows, |row| {
            let price = row.get("price").map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
            format!("{}  {}  {}", field(row, "id"), field(row, "name"), price)
        }),
        Err(e) => fail(&output_format, &e.to_string(), "QUERY_FAILED"),
    }
}
