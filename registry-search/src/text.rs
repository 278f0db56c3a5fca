//! Embedding text builders (spec §4.C8): deterministic, reproducible
//! byte-for-byte for a given snapshot, so [`registry_vector::VectorIndex`]
//! can skip re-embedding when nothing changed.

use registry_types::{Agent, Server};
use std::collections::BTreeMap;

fn metadata_section(metadata: &BTreeMap<String, serde_json::Value>) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let kv = metadata
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\nMetadata:\n{kv}")
}

/// `"Name: …\nDescription: …\nTags: …\nTools:\n…\nMetadata:\n…"` (spec
/// §4.C8 "Server text"), metadata section omitted entirely when empty.
pub fn server_embedding_text(server: &Server) -> String {
    let tags = server.tags.iter().cloned().collect::<Vec<_>>().join(", ");
    let tools = server
        .tool_list
        .iter()
        .map(|t| {
            format!(
                "Tool: {}. Description: {}. Args: {}",
                t.name, t.description, t.parsed_description.args
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Name: {}\nDescription: {}\nTags: {}\nTools:\n{}{}",
        server.name,
        server.description,
        tags,
        tools,
        metadata_section(&server.metadata)
    )
}

/// `"Name:…\nDescription:…\nSkills: …\nSkill Details: …\nTags:…\nMetadata:\n…"`
/// (spec §4.C8 "Agent text"), the skill-details line omitted when the agent
/// has no skills.
pub fn agent_embedding_text(agent: &Agent) -> String {
    let skill_names = agent
        .skills
        .iter()
        .map(|s| s.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let tags = agent.tags.iter().cloned().collect::<Vec<_>>().join(", ");

    let skill_details = if agent.skills.is_empty() {
        String::new()
    } else {
        let details = agent
            .skills
            .iter()
            .map(|s| format!("Skill: {}. Description: {}.", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nSkill Details: {details}")
    };

    format!(
        "Name: {}\nDescription: {}\nSkills: {}{}\nTags: {}{}",
        agent.name,
        agent.description,
        skill_names,
        skill_details,
        tags,
        metadata_section(&agent.metadata)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_types::{ParsedDescription, Tool};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_server() -> Server {
        Server {
            path: "/demo".into(),
            name: "demo".into(),
            description: "a demo server".into(),
            proxy_url: "http://localhost:9000".into(),
            tags: BTreeSet::from(["docs".to_string()]),
            tool_list: vec![Tool {
                name: "lookup".into(),
                description: "looks things up".into(),
                parsed_description: ParsedDescription {
                    main: "looks things up".into(),
                    args: "query: str".into(),
                },
                schema: serde_json::json!({}),
            }],
            auth_provider: None,
            auth_type: None,
            supported_transports: BTreeSet::new(),
            headers: BTreeMap::new(),
            ratings: Default::default(),
            metadata: BTreeMap::new(),
            tool_list_json: String::new(),
            registered_by: "alice".into(),
            registered_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            is_enabled: true,
        }
    }

    #[test]
    fn server_text_is_reproducible() {
        let s = sample_server();
        assert_eq!(server_embedding_text(&s), server_embedding_text(&s));
        assert!(server_embedding_text(&s).contains("Tool: lookup"));
    }

    #[test]
    fn server_text_omits_metadata_section_when_empty() {
        let s = sample_server();
        assert!(!server_embedding_text(&s).contains("Metadata:"));
    }

    #[test]
    fn server_text_includes_metadata_when_present() {
        let mut s = sample_server();
        s.metadata.insert("region".into(), serde_json::json!("us-east"));
        assert!(server_embedding_text(&s).contains("Metadata:\nregion:"));
    }
}
