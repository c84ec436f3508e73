use agentify_llm::Tool;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::session::ToolInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub server_id: String,
    pub server_name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Tool name to owning server, merged across a user's live connections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server's tools. Servers must be merged in connection order:
    /// on a name collision the later server wins.
    pub fn merge(&mut self, server_id: &str, server_name: &str, tools: Vec<ToolInfo>) {
        for tool in tools {
            let entry = CatalogEntry {
                server_id: server_id.to_string(),
                server_name: server_name.to_string(),
                description: tool.description,
                input_schema: tool.input_schema,
            };
            if let Some(shadowed) = self.entries.insert(tool.name.clone(), entry) {
                if shadowed.server_id != server_id {
                    tracing::warn!(
                        tool = %tool.name,
                        shadowed_server = %shadowed.server_id,
                        server_id,
                        "Tool name collision, later connection wins"
                    );
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Function-calling definitions for the LLM request.
    pub fn to_llm_tools(&self) -> Vec<Tool> {
        self.entries
            .iter()
            .map(|(name, entry)| Tool::function(name.clone(), entry.description.clone(), entry.input_schema.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolInfo {
        ToolInfo { name: name.into(), description: None, input_schema: json!({"type": "object"}) }
    }

    #[test]
    fn later_server_shadows_earlier() {
        let mut catalog = ToolCatalog::new();
        catalog.merge("s1", "first", vec![tool("search"), tool("fetch")]);
        catalog.merge("s2", "second", vec![tool("search")]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("search").unwrap().server_id, "s2");
        assert_eq!(catalog.get("fetch").unwrap().server_id, "s1");
    }

    #[test]
    fn llm_tools_carry_schema() {
        let mut catalog = ToolCatalog::new();
        catalog.merge("s1", "first", vec![tool("search")]);
        let tools = catalog.to_llm_tools();
        assert_eq!(tools[0].name(), "search");
        assert_eq!(tools[0].function.parameters, json!({"type": "object"}));
    }
}
