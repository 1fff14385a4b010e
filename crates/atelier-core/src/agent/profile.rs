use crate::tools::builder::{
    AnalyzeRequirementsTool, GenerateArchitectureTool, GenerateComponentCodeTool,
};
use crate::tools::database::{
    AnalyzeDataRequirementsTool, DesignDatabaseSchemaTool, SelectDatabaseTypeTool,
};
use crate::tools::ToolRegistry;

/// A named agent configuration: the agent-type tag stamped onto sessions,
/// the system preamble, and the static table of tools the model may call.
pub struct AgentProfile {
    pub agent_type: String,
    pub preamble: String,
    pub tools: ToolRegistry,
}

impl AgentProfile {
    pub fn new(agent_type: &str, preamble: &str, tools: ToolRegistry) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            preamble: preamble.to_string(),
            tools,
        }
    }

    /// Application-building agent: requirements, architecture, component code.
    pub fn builder() -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(AnalyzeRequirementsTool));
        tools.register(Box::new(GenerateArchitectureTool));
        tools.register(Box::new(GenerateComponentCodeTool));
        Self::new(
            "builder",
            "You are an application-building assistant. Analyze the user's request, \
             design an architecture, and generate component code using the available \
             tools. Answer with a concise summary when the work is done.",
            tools,
        )
    }

    /// Database design agent: data requirements, engine selection, schema design.
    pub fn database() -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(AnalyzeDataRequirementsTool));
        tools.register(Box::new(SelectDatabaseTypeTool));
        tools.register(Box::new(DesignDatabaseSchemaTool));
        Self::new(
            "database",
            "You are a database design assistant. Analyze the data requirements, \
             recommend an engine, and design a schema using the available tools. \
             Answer with the finished design when the work is done.",
            tools,
        )
    }

    /// Look up a built-in profile by its agent-type tag.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "builder" => Some(Self::builder()),
            "database" => Some(Self::database()),
            _ => None,
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["builder", "database"]
    }
}
