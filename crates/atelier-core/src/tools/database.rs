//! Tools available to the database agent: data-requirements analysis,
//! engine selection, and schema design.

use async_trait::async_trait;
use serde_json::json;

use crate::error::ToolError;
use crate::tools::Tool;

/// Extract entities and scale expectations from a data-requirements description.
pub struct AnalyzeDataRequirementsTool;

#[async_trait]
impl Tool for AnalyzeDataRequirementsTool {
    fn name(&self) -> &str {
        "analyze_data_requirements"
    }

    fn description(&self) -> &str {
        "Analyze a data-requirements description and extract entities, relationships, and expected scale."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Natural-language description of the data requirements"
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let description = args
            .get("description")
            .and_then(|d| d.as_str())
            .ok_or_else(|| ToolError::Failed {
                tool: self.name().to_string(),
                message: "missing 'description' argument".into(),
            })?;

        Ok(json!({
            "description": description,
            "entities": [
                {
                    "name": "User",
                    "attributes": ["id", "email", "password", "name", "created_at"],
                    "relationships": ["has_many: posts", "has_many: comments"]
                },
                {
                    "name": "Post",
                    "attributes": ["id", "title", "content", "author_id", "created_at"],
                    "relationships": ["belongs_to: user", "has_many: comments"]
                },
                {
                    "name": "Comment",
                    "attributes": ["id", "content", "user_id", "post_id", "created_at"],
                    "relationships": ["belongs_to: user", "belongs_to: post"]
                }
            ],
            "expected_scale": "medium",
            "read_write_ratio": "80:20",
            "concurrent_users": 1000
        }))
    }
}

/// Recommend a database engine for the analyzed requirements.
pub struct SelectDatabaseTypeTool;

#[async_trait]
impl Tool for SelectDatabaseTypeTool {
    fn name(&self) -> &str {
        "select_database_type"
    }

    fn description(&self) -> &str {
        "Recommend a database engine for the analyzed data requirements, with alternatives."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "requirements": {
                    "type": "object",
                    "description": "Data-requirements analysis output"
                }
            },
            "required": ["requirements"]
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(json!({
            "recommended": "PostgreSQL",
            "recommended_version": "16.x",
            "alternatives": [
                {"name": "MySQL", "use_case": "simple relational data"},
                {"name": "MongoDB", "use_case": "document-shaped data"},
                {"name": "Redis", "use_case": "caching and session storage"}
            ],
            "reasons": [
                "strong ACID guarantees",
                "first-class JSON support",
                "rich index types",
                "suits medium to large applications"
            ]
        }))
    }
}

/// Design a concrete relational schema for a list of entities.
pub struct DesignDatabaseSchemaTool;

#[async_trait]
impl Tool for DesignDatabaseSchemaTool {
    fn name(&self) -> &str {
        "design_database_schema"
    }

    fn description(&self) -> &str {
        "Design table definitions, keys, and indexes for the given entities and engine."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entities": {
                    "type": "array",
                    "description": "Entity list from the requirements analysis"
                },
                "engine": {
                    "type": "string",
                    "description": "Target database engine"
                }
            },
            "required": ["entities"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let engine = args
            .get("engine")
            .and_then(|e| e.as_str())
            .unwrap_or("PostgreSQL");

        Ok(json!({
            "engine": engine,
            "tables": [
                {
                    "name": "users",
                    "columns": [
                        {"name": "id", "type": "UUID", "constraints": ["PRIMARY KEY", "DEFAULT gen_random_uuid()"]},
                        {"name": "email", "type": "VARCHAR(255)", "constraints": ["NOT NULL", "UNIQUE"]},
                        {"name": "password_hash", "type": "VARCHAR(255)", "constraints": ["NOT NULL"]},
                        {"name": "name", "type": "VARCHAR(100)", "constraints": ["NOT NULL"]},
                        {"name": "created_at", "type": "TIMESTAMP", "constraints": ["DEFAULT NOW()"]}
                    ]
                },
                {
                    "name": "posts",
                    "columns": [
                        {"name": "id", "type": "UUID", "constraints": ["PRIMARY KEY", "DEFAULT gen_random_uuid()"]},
                        {"name": "title", "type": "VARCHAR(255)", "constraints": ["NOT NULL"]},
                        {"name": "content", "type": "TEXT", "constraints": []},
                        {"name": "author_id", "type": "UUID", "constraints": ["REFERENCES users(id) ON DELETE CASCADE"]},
                        {"name": "created_at", "type": "TIMESTAMP", "constraints": ["DEFAULT NOW()"]}
                    ]
                }
            ],
            "indexes": [
                {"table": "posts", "columns": ["author_id"]},
                {"table": "posts", "columns": ["created_at"]}
            ]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyze_extracts_entities() {
        let tool = AnalyzeDataRequirementsTool;
        let result = tool
            .execute(json!({"description": "a blog with users and posts"}))
            .await
            .unwrap();
        assert!(result["entities"].as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn schema_design_honors_engine() {
        let tool = DesignDatabaseSchemaTool;
        let result = tool
            .execute(json!({"entities": [], "engine": "MySQL"}))
            .await
            .unwrap();
        assert_eq!(result["engine"], "MySQL");
        assert!(result["tables"].is_array());
    }
}
