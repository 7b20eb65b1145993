//! Tool argument validation
//!
//! Each tool advertises a JSON schema for its arguments. Schemas are compiled
//! once per session and checked before any `tools/call` is sent.

use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::mcp::protocol::Tool;
use crate::{DobbError, Result};

/// Compiled input schemas keyed by tool name
pub struct ToolValidator {
    schemas: HashMap<String, JSONSchema>,
}

impl ToolValidator {
    /// Compile the schemas of every tool.
    ///
    /// A schema that does not compile is skipped with a warning; the server
    /// remains the final judge for that tool.
    #[inline]
    pub fn new(tools: &[Tool]) -> Self {
        let mut schemas = HashMap::with_capacity(tools.len());
        for tool in tools {
            match JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&tool.input_schema)
            {
                Ok(compiled) => {
                    schemas.insert(tool.name.clone(), compiled);
                }
                Err(e) => warn!(
                    "Input schema of tool '{}' does not compile, skipping validation: {}",
                    tool.name, e
                ),
            }
        }
        debug!("Compiled {} tool schemas", schemas.len());
        Self { schemas }
    }

    /// Check `arguments` against the tool's schema
    #[inline]
    pub fn validate(&self, tool: &str, arguments: &Map<String, Value>) -> Result<()> {
        let Some(schema) = self.schemas.get(tool) else {
            return Ok(());
        };

        let instance = Value::Object(arguments.clone());
        if let Err(errors) = schema.validate(&instance) {
            let error_messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();

            return Err(DobbError::Validation(format!(
                "Invalid arguments for tool '{}': {}",
                tool,
                error_messages.join("; ")
            )));
        }

        Ok(())
    }
}
