//! In-memory pantry inventory tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mcp::context::ExecutionContext;
use crate::mcp::handler::{get_f64_arg, get_optional_string_arg, get_string_arg, ToolHandler};
use crate::mcp::protocol::{Arguments, Tool};

/// One inventory entry.
#[derive(Debug, Clone, Serialize)]
pub struct PantryItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: String,
    pub location: String,
    pub reorder_point: f64,
    pub last_updated: DateTime<Utc>,
}

impl PantryItem {
    fn is_low(&self) -> bool {
        self.quantity <= self.reorder_point
    }
}

/// Tracks household inventory. State lives for the life of the process.
#[derive(Default)]
pub struct PantryTrackerTool {
    inventory: Arc<RwLock<BTreeMap<String, PantryItem>>>,
}

impl PantryTrackerTool {
    pub fn new() -> Self {
        Self::default()
    }

    async fn add_item(&self, args: &Arguments) -> Result<Value> {
        let name = get_string_arg(args, "item_name")?;
        let quantity = get_f64_arg(args, "quantity", 1.0);
        let mut inventory = self.inventory.write().await;

        let reorder_point = inventory
            .get(&name)
            .map(|existing| existing.reorder_point)
            .unwrap_or_else(|| (quantity * 0.2).max(1.0));

        let item = PantryItem {
            name: name.clone(),
            quantity,
            unit: get_optional_string_arg(args, "unit").unwrap_or_else(|| "piece".to_string()),
            category: get_optional_string_arg(args, "category").unwrap_or_else(|| "other".to_string()),
            location: get_optional_string_arg(args, "location").unwrap_or_else(|| "pantry".to_string()),
            reorder_point,
            last_updated: Utc::now(),
        };

        let response = json!({
            "success": true,
            "item_added": item.name,
            "current_quantity": item.quantity,
            "location": item.location,
        });
        inventory.insert(name, item);
        Ok(response)
    }

    async fn remove_item(&self, args: &Arguments) -> Result<Value> {
        let name = get_string_arg(args, "item_name")?;
        let consumed = get_f64_arg(args, "quantity", 1.0);
        let mut inventory = self.inventory.write().await;

        let item = inventory.get_mut(&name).ok_or_else(|| {
            Error::ToolExecutionFailed(format!("Item {} not found in inventory", name))
        })?;

        item.quantity = (item.quantity - consumed).max(0.0);
        item.last_updated = Utc::now();

        if item.quantity == 0.0 {
            inventory.remove(&name);
            return Ok(json!({
                "success": true,
                "item_consumed": name,
                "remaining_quantity": 0,
                "item_depleted": true,
                "reorder_suggested": true,
            }));
        }

        let low = item.is_low();
        Ok(json!({
            "success": true,
            "item_consumed": name,
            "consumed_quantity": consumed,
            "remaining_quantity": item.quantity,
            "low_stock_warning": low,
            "reorder_suggested": low,
        }))
    }

    async fn update_quantity(&self, args: &Arguments) -> Result<Value> {
        let name = get_string_arg(args, "item_name")?;
        let quantity = args
            .get("quantity")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::InvalidParams("Missing required argument: quantity".to_string()))?;

        let mut inventory = self.inventory.write().await;
        let item = inventory
            .get_mut(&name)
            .ok_or_else(|| Error::ToolExecutionFailed(format!("Item {} not found", name)))?;

        let old = item.quantity;
        item.quantity = quantity;
        item.last_updated = Utc::now();

        Ok(json!({
            "success": true,
            "item_updated": name,
            "old_quantity": old,
            "new_quantity": quantity,
            "change": quantity - old,
        }))
    }

    async fn get_inventory(&self) -> Result<Value> {
        let inventory = self.inventory.read().await;
        let low: Vec<&str> = inventory
            .values()
            .filter(|i| i.is_low())
            .map(|i| i.name.as_str())
            .collect();

        Ok(json!({
            "success": true,
            "total_items": inventory.len(),
            "inventory": &*inventory,
            "low_stock_items": low,
        }))
    }

    async fn check_low_stock(&self) -> Result<Value> {
        let inventory = self.inventory.read().await;
        let low: Vec<Value> = inventory
            .values()
            .filter(|i| i.is_low())
            .map(|i| {
                json!({
                    "name": i.name,
                    "quantity": i.quantity,
                    "reorder_point": i.reorder_point,
                    "unit": i.unit,
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "low_stock_count": low.len(),
            "low_stock_items": low,
        }))
    }
}

#[async_trait]
impl ToolHandler for PantryTrackerTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "pantry_tracker".to_string(),
            description: "Track pantry inventory and low-stock items".to_string(),
            input_schema: crate::tool_schema!(
                required: ["action"],
                "action": {
                    "type": "string",
                    "enum": ["add_item", "remove_item", "update_quantity", "get_inventory", "check_low_stock"]
                },
                "item_name": { "type": "string" },
                "quantity": { "type": "number", "minimum": 0 },
                "unit": { "type": "string" },
                "location": { "type": "string", "enum": ["pantry", "fridge", "freezer"] },
                "category": { "type": "string" }
            ),
        }
    }

    async fn execute(&self, args: Arguments, ctx: ExecutionContext) -> Result<Value> {
        let action = get_string_arg(&args, "action")?;
        debug!("pantry_tracker {} (session {})", action, ctx.session_id);

        match action.as_str() {
            "add_item" => self.add_item(&args).await,
            "remove_item" => self.remove_item(&args).await,
            "update_quantity" => self.update_quantity(&args).await,
            "get_inventory" => self.get_inventory().await,
            "check_low_stock" => self.check_low_stock().await,
            other => Err(Error::InvalidParams(format!("Unknown action: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn run(tool: &PantryTrackerTool, value: Value) -> Result<Value> {
        tool.execute(args(value), ExecutionContext::default()).await
    }

    #[tokio::test]
    async fn test_add_and_get_inventory() {
        let tool = PantryTrackerTool::new();
        let added = run(&tool, json!({"action": "add_item", "item_name": "milk", "quantity": 2, "location": "fridge"}))
            .await
            .unwrap();
        assert_eq!(added["item_added"], "milk");
        assert_eq!(added["location"], "fridge");

        let inventory = run(&tool, json!({"action": "get_inventory"})).await.unwrap();
        assert_eq!(inventory["total_items"], 1);
        assert_eq!(inventory["inventory"]["milk"]["unit"], "piece");
        assert_eq!(inventory["inventory"]["milk"]["reorder_point"], 1.0);
    }

    #[tokio::test]
    async fn test_remove_to_low_stock_then_depleted() {
        let tool = PantryTrackerTool::new();
        run(&tool, json!({"action": "add_item", "item_name": "eggs", "quantity": 3})).await.unwrap();

        let removed = run(&tool, json!({"action": "remove_item", "item_name": "eggs", "quantity": 2}))
            .await
            .unwrap();
        assert_eq!(removed["remaining_quantity"], 1.0);
        assert_eq!(removed["low_stock_warning"], true);

        let low = run(&tool, json!({"action": "check_low_stock"})).await.unwrap();
        assert_eq!(low["low_stock_count"], 1);

        let depleted = run(&tool, json!({"action": "remove_item", "item_name": "eggs", "quantity": 5}))
            .await
            .unwrap();
        assert_eq!(depleted["item_depleted"], true);

        let inventory = run(&tool, json!({"action": "get_inventory"})).await.unwrap();
        assert_eq!(inventory["total_items"], 0);
    }

    #[tokio::test]
    async fn test_update_quantity() {
        let tool = PantryTrackerTool::new();
        run(&tool, json!({"action": "add_item", "item_name": "rice", "quantity": 1})).await.unwrap();

        let updated = run(&tool, json!({"action": "update_quantity", "item_name": "rice", "quantity": 4}))
            .await
            .unwrap();
        assert_eq!(updated["change"], 3.0);
    }

    #[tokio::test]
    async fn test_missing_item_is_error() {
        let tool = PantryTrackerTool::new();
        let err = run(&tool, json!({"action": "remove_item", "item_name": "caviar"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("caviar"));
    }
}
