// Runtime and Console domain command implementations
//
// Object graph inspection and global evaluation.

use crate::client::InspectorClient;
use crate::protocol::InspectorResult;
use crate::types::{
    CollectionEntry, EvaluateResult, InternalPropertyDescriptor, PropertyDescriptor,
    RemoteObjectId,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Result of a property fetch: displayable properties plus any
/// engine-internal ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectProperties {
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub internal_properties: Vec<InternalPropertyDescriptor>,
}

impl InspectorClient {
    /// Enable the Runtime domain (Runtime.enable)
    pub async fn runtime_enable(&self) -> InspectorResult<()> {
        self.request("Runtime.enable", Value::Null).await?;
        Ok(())
    }

    /// Enable the Console domain (Console.enable)
    pub async fn console_enable(&self) -> InspectorResult<()> {
        self.request("Console.enable", Value::Null).await?;
        Ok(())
    }

    /// Fetch an object's user-facing and internal properties, paginated
    /// (Runtime.getDisplayableProperties)
    pub async fn get_displayable_properties(
        &self,
        object_id: &RemoteObjectId,
        fetch_start: i64,
        fetch_count: i64,
    ) -> InspectorResult<ObjectProperties> {
        let result = self
            .request(
                "Runtime.getDisplayableProperties",
                json!({
                    "objectId": object_id,
                    "fetchStart": fetch_start,
                    "fetchCount": fetch_count,
                    "generatePreview": true,
                }),
            )
            .await?;
        Self::decode("Runtime.getDisplayableProperties", result)
    }

    /// Fetch entries of a Map/Set-like collection, paginated
    /// (Runtime.getCollectionEntries)
    pub async fn get_collection_entries(
        &self,
        object_id: &RemoteObjectId,
        fetch_start: i64,
        fetch_count: i64,
    ) -> InspectorResult<Vec<CollectionEntry>> {
        let result = self
            .request(
                "Runtime.getCollectionEntries",
                json!({
                    "objectId": object_id,
                    "fetchStart": fetch_start,
                    "fetchCount": fetch_count,
                }),
            )
            .await?;

        #[derive(Deserialize)]
        struct Entries {
            #[serde(default)]
            entries: Vec<CollectionEntry>,
        }
        let decoded: Entries = Self::decode("Runtime.getCollectionEntries", result)?;
        Ok(decoded.entries)
    }

    /// Evaluate an expression in the global scope (Runtime.evaluate)
    pub async fn evaluate(&self, expression: &str) -> InspectorResult<EvaluateResult> {
        let result = self
            .request(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "generatePreview": true,
                }),
            )
            .await?;
        Self::decode("Runtime.evaluate", result)
    }
}
