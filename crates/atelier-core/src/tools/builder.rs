//! Tools available to the builder agent: requirements analysis,
//! architecture generation, and component code generation.
//!
//! The payloads are illustrative; the interesting part is the contract
//! (JSON in, JSON out) the control loop dispatches against.

use async_trait::async_trait;
use serde_json::json;

use crate::error::ToolError;
use crate::tools::Tool;

/// Extract key information from a natural-language application request.
pub struct AnalyzeRequirementsTool;

#[async_trait]
impl Tool for AnalyzeRequirementsTool {
    fn name(&self) -> &str {
        "analyze_requirements"
    }

    fn description(&self) -> &str {
        "Analyze a user's application request and extract the app type, core features, and complexity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "string",
                    "description": "The user's application request"
                }
            },
            "required": ["request"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let request = args
            .get("request")
            .and_then(|r| r.as_str())
            .ok_or_else(|| ToolError::Failed {
                tool: self.name().to_string(),
                message: "missing 'request' argument".into(),
            })?;

        Ok(json!({
            "request": request,
            "app_type": "web_application",
            "features": ["user_authentication", "data_management", "api_integration"],
            "tech_stack": "auto",
            "complexity": "medium"
        }))
    }
}

/// Produce an application architecture from analyzed requirements.
pub struct GenerateArchitectureTool;

#[async_trait]
impl Tool for GenerateArchitectureTool {
    fn name(&self) -> &str {
        "generate_architecture"
    }

    fn description(&self) -> &str {
        "Design an application architecture (frontend, backend, storage, deployment) from requirements."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "requirements": {
                    "type": "object",
                    "description": "Requirements analysis output"
                }
            },
            "required": ["requirements"]
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(json!({
            "frontend": "React + TypeScript",
            "backend": "Node.js + Express",
            "database": "PostgreSQL",
            "deployment": "Docker",
            "estimated_time": "2-3 weeks"
        }))
    }
}

/// Generate component source code from a component specification.
pub struct GenerateComponentCodeTool;

#[async_trait]
impl Tool for GenerateComponentCodeTool {
    fn name(&self) -> &str {
        "generate_component_code"
    }

    fn description(&self) -> &str {
        "Generate source code for a UI component from its specification."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "component": {
                    "type": "object",
                    "description": "Component specification (name, props, behavior)"
                }
            },
            "required": ["component"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = args
            .pointer("/component/name")
            .and_then(|n| n.as_str())
            .unwrap_or("MyComponent");

        Ok(json!({
            "language": "tsx",
            "name": format!("{name}.tsx"),
            "code": format!(
                "import React from 'react';\n\nexport const {name}: React.FC = () => {{\n    return <div>Hello from {name}</div>;\n}};\n"
            )
        }))
    }
}
