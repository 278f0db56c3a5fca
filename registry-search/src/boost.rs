//! Keyword boost and tool/skill extraction (spec §4.C8), transliterated
//! from `_calculate_keyword_boost` / `_extract_matching_tools`.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// The closed stopword set (spec glossary).
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "to", "of",
    "in", "on", "at", "by", "for", "with", "about", "as", "into", "through", "from", "what",
    "when", "where", "who", "which", "how", "why", "get", "set", "put",
];

static SPLIT_RE: OnceLock<Regex> = OnceLock::new();

fn split_re() -> &'static Regex {
    SPLIT_RE.get_or_init(|| Regex::new(r"\W+").expect("valid tokenizer regex"))
}

/// Splits on non-word characters, lowercases, drops tokens with length ≤ 2
/// and stopwords (spec §4.C8 "Keyword boost").
pub fn tokenize(text: &str) -> Vec<String> {
    split_re()
        .split(&text.to_lowercase())
        .filter(|t| !t.is_empty() && t.chars().count() > 2)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Input to the keyword boost formula: the minimum an entity needs to
/// expose, shared between servers (tool names) and agents (skill names).
pub struct BoostInput<'a> {
    pub name: &'a str,
    pub tags: &'a [String],
    pub item_names: &'a [String],
    pub description: &'a str,
}

/// `1.0` (no boost) to `2.0` (maximum), additive per spec §4.C8.
pub fn keyword_boost(tokens: &[String], input: &BoostInput) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }

    let token_set: BTreeSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
    let mut boost = 1.0_f64;

    let name_lower = input.name.to_lowercase();
    if token_set.iter().any(|t| name_lower.contains(t)) {
        boost += 0.5;
    }

    let item_matches = input
        .item_names
        .iter()
        .filter(|n| {
            let lower = n.to_lowercase();
            token_set.iter().any(|t| lower.contains(t))
        })
        .count();
    boost += (item_matches as f64 * 0.3).min(0.6);

    let tag_matches = input
        .tags
        .iter()
        .filter(|tag| {
            let lower = tag.to_lowercase();
            token_set.iter().any(|t| lower.contains(t))
        })
        .count();
    boost += (tag_matches as f64 * 0.2).min(0.4);

    let description_lower = input.description.to_lowercase();
    if !description_lower.is_empty() {
        let desc_matches = token_set
            .iter()
            .filter(|t| description_lower.contains(*t))
            .count();
        boost += (desc_matches as f64 / tokens.len() as f64) * 0.2;
    }

    boost.min(2.0)
}

/// One tool (or skill) surfaced by [`extract_matching_tools`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolMatch {
    pub name: String,
    pub description: String,
    pub raw_score: f64,
}

/// Input describing a server's searchable tools for extraction.
pub struct ToolSource<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub args: &'a str,
}

/// Spec §4.C8 "Tool extraction": per-tool weighted coverage score, or a
/// base score of `0.5` for every tool when the server name itself matched,
/// top 5 by `raw_score` descending.
pub fn extract_matching_tools<'a>(
    query_tokens: &[String],
    server_name: &str,
    tools: impl Iterator<Item = ToolSource<'a>>,
) -> Vec<ToolMatch> {
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let server_name_lower = server_name.to_lowercase();
    let server_name_tokens: Vec<String> = split_re()
        .split(&server_name_lower)
        .filter(|t| !t.is_empty() && t.chars().count() > 2)
        .map(str::to_string)
        .collect();

    let server_name_match = query_tokens.iter().any(|token| {
        server_name_lower.contains(token.as_str())
            || server_name_tokens
                .iter()
                .any(|snt| snt.contains(token.as_str()) || token.contains(snt.as_str()))
    });

    let mut matches = Vec::new();
    for tool in tools {
        let searchable = format!("{} {} {}", tool.name, tool.description, tool.args).to_lowercase();
        if searchable.trim().is_empty() {
            continue;
        }

        let tool_name_lower = tool.name.to_lowercase();
        let name_matches = query_tokens
            .iter()
            .filter(|t| tool_name_lower.contains(t.as_str()))
            .count();
        let desc_lower = tool.description.to_lowercase();
        let args_lower = tool.args.to_lowercase();
        let desc_matches = query_tokens
            .iter()
            .filter(|t| desc_lower.contains(t.as_str()) || args_lower.contains(t.as_str()))
            .count();

        let weighted = (name_matches as f64 * 2.0) + desc_matches as f64;
        let max_possible = query_tokens.len() as f64 * 2.0;

        if weighted == 0.0 {
            if server_name_match {
                matches.push(ToolMatch {
                    name: tool.name.to_string(),
                    description: tool.description.to_string(),
                    raw_score: 0.5,
                });
            }
            continue;
        }

        let coverage = (weighted / max_possible).min(1.0);
        matches.push(ToolMatch {
            name: tool.name.to_string(),
            description: tool.description.to_string(),
            raw_score: coverage,
        });
    }

    matches.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(5);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_short_tokens_and_stopwords() {
        let tokens = tokenize("What is the Context7 docs tool?");
        assert_eq!(tokens, vec!["context7".to_string(), "docs".to_string(), "tool".to_string()]);
    }

    #[test]
    fn tokenize_empty_when_only_stopwords() {
        assert!(tokenize("the is of").is_empty());
    }

    #[test]
    fn no_tokens_means_no_boost() {
        let input = BoostInput {
            name: "context7",
            tags: &[],
            item_names: &[],
            description: "",
        };
        assert_eq!(keyword_boost(&[], &input), 1.0);
    }

    #[test]
    fn name_match_adds_half() {
        let tokens = tokenize("context7 documentation");
        let input = BoostInput {
            name: "context7",
            tags: &[],
            item_names: &[],
            description: "",
        };
        assert!((keyword_boost(&tokens, &input) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn boost_is_capped_at_two() {
        let tokens = tokenize("context7 lookup resolve docs library documentation");
        let input = BoostInput {
            name: "context7",
            tags: &["documentation".to_string(), "library".to_string()],
            item_names: &["resolve-library-id".to_string(), "lookup-docs".to_string()],
            description: "resolve library documentation lookup",
        };
        assert_eq!(keyword_boost(&tokens, &input), 2.0);
    }

    #[test]
    fn server_name_match_includes_all_tools_at_base_score() {
        let tokens = tokenize("use context7 please");
        let tools = vec![ToolSource {
            name: "unrelated-tool",
            description: "does something else entirely",
            args: "",
        }];
        let matches = extract_matching_tools(&tokens, "context7", tools.into_iter());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].raw_score, 0.5);
    }

    #[test]
    fn tool_name_match_outranks_base_score() {
        let tokens = tokenize("resolve library documentation");
        let tools = vec![
            ToolSource {
                name: "unrelated",
                description: "",
                args: "",
            },
            ToolSource {
                name: "resolve-library-id",
                description: "resolves a library documentation id",
                args: "",
            },
        ];
        let matches = extract_matching_tools(&tokens, "context7", tools.into_iter());
        assert_eq!(matches[0].name, "resolve-library-id");
        assert!(matches[0].raw_score > 0.5);
    }

    #[test]
    fn truncates_to_top_five() {
        let tokens = tokenize("lookup");
        let tools: Vec<ToolSource> = (0..8)
            .map(|_| ToolSource {
                name: "lookup",
                description: "",
                args: "",
            })
            .collect();
        let matches = extract_matching_tools(&tokens, "demo", tools.into_iter());
        assert_eq!(matches.len(), 5);
    }
}
