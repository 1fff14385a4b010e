pub mod builder;
pub mod database;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ToolError;

/// Trait for tools the model may request during a Decide step.
///
/// Results are JSON values so they can be fed back into the message
/// history and persisted verbatim.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Static dispatch table of available tools, built at configuration time.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<&dyn Tool> {
        self.tools.values().map(|t| t.as_ref()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one call. An unregistered name is a configuration error
    /// that fails the run, never a retry condition.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(ToolError::Unknown(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase a string"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            let text = args.get("text").and_then(|t| t.as_str()).unwrap_or("");
            Ok(json!({"text": text.to_uppercase()}))
        }
    }

    #[tokio::test]
    async fn execute_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(UpperTool));

        let result = registry.execute("upper", json!({"text": "abc"})).await.unwrap();
        assert_eq!(result, json!({"text": "ABC"}));
    }

    #[tokio::test]
    async fn unknown_tool_is_dispatch_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Unknown(name) if name == "missing"));
    }

    #[test]
    fn list_and_get() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(UpperTool));
        assert_eq!(registry.list().len(), 1);
        assert!(registry.get("upper").is_some());
        assert!(registry.get("lower").is_none());
    }
}
