// Data reads used by the waiter and menu screens

use serde_json::Value;

use crate::client::DataClient;
use crate::pipeline::PipelineError;

pub const TABS: &str = "tabs";
pub const MENU_ITEMS: &str = "menu_items";

/// Tabs opened by `user_id`, newest first
pub async fn user_tabs(client: &DataClient, user_id: &str) -> Result<Vec<Value>, PipelineError> {
    client
        .from(TABS)
        .select("*")
        .eq("opened_by", user_id)
        .order("created_at", false)
        .execute()
        .await?
        .rows()
}

/// Menu items of a restaurant that are currently available
pub async fn menu_items(client: &DataClient, restaurant_id: &str) -> Result<Vec<Value>, PipelineError> {
    client
        .from(MENU_ITEMS)
        .select("*")
        .eq("restaurant_id", restaurant_id)
        .eq("is_available", true)
        .execute()
        .await?
        .rows()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::pipeline::InterceptorPipeline;
    use serde_json::json;
    use std::sync::Arc;

    fn client_with(backend: Arc<MemoryBackend>) -> DataClient {
        DataClient::new(backend, Arc::new(InterceptorPipeline::new()))
    }

    #[tokio::test]
    async fn test_user_tabs_newest_first() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_rows(
            TABS,
            vec![
                json!({"id": "t1", "opened_by": "w1", "created_at": "2024-05-01T10:00:00Z"}),
                json!({"id": "t2", "opened_by": "w2", "created_at": "2024-05-01T11:00:00Z"}),
                json!({"id": "t3", "opened_by": "w1", "created_at": "2024-05-01T12:00:00Z"}),
            ],
        );

        let tabs = user_tabs(&client_with(backend), "w1").await.unwrap();
        let ids: Vec<_> = tabs.iter().map(|t| t["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["t3", "t1"]);
    }

    #[tokio::test]
    async fn test_menu_items_only_available() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_rows(
            MENU_ITEMS,
            vec![
                json!({"id": "m1", "restaurant_id": "r1", "is_available": true}),
                json!({"id": "m2", "restaurant_id": "r1", "is_available": false}),
                json!({"id": "m3", "restaurant_id": "r2", "is_available": true}),
            ],
        );

        let items = menu_items(&client_with(backend), "r1").await.unwrap();
        assert_eq!(items, vec![json!({"id": "m1", "restaurant_id": "r1", "is_available": true})]);
    }
}
