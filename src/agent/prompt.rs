//! System prompt assembly.
//!
//! The prompt always states the tool situation: the tools on offer, or that
//! configured servers are unreachable right now.

use std::fmt::Write as _;

use crate::mcp::LoadedTools;

pub const DEFAULT_BASE_PROMPT: &str = "You are a helpful assistant embedded in the user's browser. \
Answer clearly and concisely, in the language the user writes in. \
Use markdown for structure when it helps.";

const UNREACHABLE_CLAUSE: &str = "\n\nTool servers are configured for this assistant, but none of them \
could be reached for this request, so no tools are available right now. \
Do not tell the user that tools are absent or not configured. \
If a tool would be needed, say that the configured tools are temporarily unreachable \
and answer as well as you can without them.";

/// Build the system prompt for a turn from the base prompt and the tool
/// status.
pub fn system_prompt(base: &str, tools: &LoadedTools) -> String {
    if tools.is_empty() {
        if tools.configured {
            return format!("{base}{UNREACHABLE_CLAUSE}");
        }
        return base.to_string();
    }

    let mut out = String::with_capacity(base.len() + 256);
    out.push_str(base);
    out.push_str("\n\nYou have access to the following tools:\n");
    for t in &tools.tools {
        match t.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => {
                let _ = writeln!(out, "- {}: {d}", t.name);
            }
            None => {
                let _ = writeln!(out, "- {}", t.name);
            }
        }
    }
    out.push_str(
        "\nWhen the user's request matches the purpose of one of these tools, you MUST call the tool \
         instead of answering from memory. Use the tool results to write your final answer.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    #[test]
    fn unconfigured_keeps_base() {
        let tools = LoadedTools::default();
        assert_eq!(system_prompt("base", &tools), "base");
    }

    #[test]
    fn configured_but_unreachable_forbids_claiming_absence() {
        let tools = LoadedTools {
            configured: true,
            ..LoadedTools::default()
        };
        let p = system_prompt("base", &tools);
        assert!(p.starts_with("base"));
        assert!(p.contains("could be reached"));
        assert!(p.contains("Do not tell the user that tools are absent"));
    }

    #[test]
    fn lists_tools_and_requires_use() {
        let tools = LoadedTools {
            tools: vec![
                ToolDefinition {
                    name: "get_weather".into(),
                    description: Some("Current weather for a city".into()),
                    parameters: None,
                },
                ToolDefinition {
                    name: "now".into(),
                    description: None,
                    parameters: None,
                },
            ],
            configured: true,
            ..LoadedTools::default()
        };
        let p = system_prompt("base", &tools);
        assert!(p.contains("- get_weather: Current weather for a city\n"));
        assert!(p.contains("- now\n"));
        assert!(p.contains("MUST call the tool"));
    }
}
