//! Tool registry: name -> implementation, with fail-fast duplicate detection.
//!
//! Registration happens once at container construction; afterwards the rest of
//! the system sees a read-only view behind `Arc<ToolRegistry>`.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ToolError;
use crate::tools::{Tool, ToolCallContent, ToolSpec};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. Registering the same name twice is a wiring bug and
    /// fails immediately.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::InvalidArguments(format!(
                "tool already registered: {name}"
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// All registered specs, sorted by name for stable listings.
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Specs for a subset of names, preserving the requested order. Unknown
    /// names are skipped (withheld tools simply don't exist for that agent).
    pub fn specs_for(&self, names: &[&str]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|n| self.tools.get(*n).map(|t| t.spec()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<ToolCallContent, ToolError> {
        match self.tools.get(name) {
            Some(tool) => tool.call(args).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Dummy(&'static str);

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.0.to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }
        }
        async fn call(&self, _args: Value) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent::json(serde_json::json!({"ok": true})))
        }
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(Dummy("send_email"))).unwrap();
        let err = reg.register(Box::new(Dummy("send_email"))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(m) if m.contains("send_email")));
    }

    #[test]
    fn list_is_sorted_and_specs_for_preserves_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(Dummy("zeta"))).unwrap();
        reg.register(Box::new(Dummy("alpha"))).unwrap();

        let names: Vec<String> = reg.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        let subset: Vec<String> = reg
            .specs_for(&["zeta", "ghost", "alpha"])
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(subset, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let reg = ToolRegistry::new();
        let err = reg.call("ghost", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(n) if n == "ghost"));
    }
}
