//! Skill-based agent discovery (spec §4.C8, non-semantic): ranks agents by
//! exact skill/tag overlap against a requested skill set, not by embedding
//! similarity.

use registry_types::Agent;

#[derive(Debug, Clone)]
pub struct DiscoveryMatch<'a> {
    pub agent: &'a Agent,
    pub relevance: f64,
}

fn lowercase_set<'a>(items: impl Iterator<Item = &'a str>) -> std::collections::BTreeSet<String> {
    items.map(|s| s.to_lowercase()).collect()
}

/// Ranks `agents` by overlap with `required_skills` (and, if given,
/// `tags_filter`), skipping any agent with zero skill overlap (spec
/// §4.C8 "Skill-based agent discovery").
pub fn discover<'a>(
    agents: impl IntoIterator<Item = &'a Agent>,
    required_skills: &[String],
    tags_filter: Option<&[String]>,
) -> Vec<DiscoveryMatch<'a>> {
    if required_skills.is_empty() {
        return Vec::new();
    }
    let required: std::collections::BTreeSet<String> =
        required_skills.iter().map(|s| s.to_lowercase()).collect();
    let tags_filter_lower =
        tags_filter.map(|tags| lowercase_set(tags.iter().map(|t| t.as_str())));

    let mut matches = Vec::new();
    for agent in agents {
        let agent_skill_terms: std::collections::BTreeSet<String> = agent
            .skills
            .iter()
            .flat_map(|s| [s.id.to_lowercase(), s.name.to_lowercase()])
            .collect();

        let skill_overlap = required.intersection(&agent_skill_terms).count();
        if skill_overlap == 0 {
            continue;
        }
        let skill_score = skill_overlap as f64 / required.len() as f64;

        let tag_score = match &tags_filter_lower {
            Some(filter) if !filter.is_empty() => {
                let agent_tags = lowercase_set(agent.tags.iter().map(|t| t.as_str()));
                let overlap = filter.intersection(&agent_tags).count();
                overlap as f64 / filter.len() as f64
            }
            _ => 0.0,
        };

        let trust_boost = agent.trust_level.trust_boost();

        matches.push(DiscoveryMatch {
            agent,
            relevance: round_to_two(0.6 * skill_score + 0.2 * tag_score + 0.2 * trust_boost),
        });
    }

    matches.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

fn round_to_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_types::{Skill, TrustLevel, Visibility};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_agent(name: &str, skills: &[&str], tags: &[&str], trust: TrustLevel) -> Agent {
        Agent {
            path: format!("/{name}"),
            protocol_version: "0.3".into(),
            name: name.into(),
            description: String::new(),
            url: "http://localhost".into(),
            version: "1.0".into(),
            capabilities: Default::default(),
            default_input_modes: vec!["text/plain".into()],
            default_output_modes: vec!["text/plain".into()],
            skills: skills
                .iter()
                .map(|s| Skill {
                    id: s.to_lowercase(),
                    name: s.to_string(),
                    description: String::new(),
                    tags: vec![],
                    examples: None,
                    input_modes: None,
                    output_modes: None,
                    security: None,
                })
                .collect(),
            preferred_transport: "JSONRPC".into(),
            provider: None,
            security_schemes: BTreeMap::new(),
            visibility: Visibility::Public,
            allowed_groups: BTreeSet::new(),
            trust_level: trust,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            license: "N/A".into(),
            num_stars: 0.0,
            ratings: Default::default(),
            metadata: BTreeMap::new(),
            registered_by: "alice".into(),
            registered_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            signature: None,
            is_enabled: true,
        }
    }

    #[test]
    fn skips_agents_with_no_skill_overlap() {
        let a = sample_agent("trip-planner", &["book-flight"], &[], TrustLevel::Trusted);
        let matches = discover([&a], &["translate".to_string()], None);
        assert!(matches.is_empty());
    }

    #[test]
    fn ranks_by_skill_tag_and_trust() {
        let trusted = sample_agent("a", &["book-flight"], &["travel"], TrustLevel::Trusted);
        let unverified = sample_agent("b", &["book-flight"], &["travel"], TrustLevel::Unverified);

        let matches = discover(
            [&unverified, &trusted],
            &["book-flight".to_string()],
            Some(&["travel".to_string()]),
        );
        assert_eq!(matches[0].agent.name, "a");
        assert_eq!(matches[0].relevance, 1.0);
        assert!((matches[1].relevance - 0.8).abs() < 1e-9);
    }
}
