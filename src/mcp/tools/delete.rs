//! delete_context - remove an entry everywhere

use anyhow::Result;
use serde_json::Value;

use super::super::server::VaultServer;
use super::super::types::DeleteContextArgs;
use super::text_content;

pub(crate) fn tool_delete(server: &VaultServer, arguments: Value) -> Result<Value> {
    let args: DeleteContextArgs = serde_json::from_value(arguments)?;
    crate::capture::delete_entry(&server.store, &args.id)?;
    text_content(&serde_json::json!({ "deleted": true }))
}
