//! Access Filter (spec §4.C9): per-entity visibility rules applied ahead
//! of search/listing results, plus the permission-vocabulary check used by
//! mutating operations.

use registry_types::{Agent, EntityKind, Server, UserContext, Visibility};

/// The minimum view the filter needs of an entity, regardless of kind.
pub struct FilterableEntity<'a> {
    pub kind: EntityKind,
    pub path: &'a str,
    pub registered_by: &'a str,
    pub visibility: Visibility,
    pub allowed_groups: Vec<String>,
}

impl<'a> FilterableEntity<'a> {
    pub fn for_server(server: &'a Server) -> Self {
        // Servers have no visibility model of their own in spec §3.1; they
        // behave as always-public for the purposes of this filter.
        Self {
            kind: EntityKind::McpServer,
            path: &server.path,
            registered_by: &server.registered_by,
            visibility: Visibility::Public,
            allowed_groups: Vec::new(),
        }
    }
}

/// Applies the ordered rules of spec §4.C9 to a single entity.
pub fn is_accessible(entity: &FilterableEntity, user: &UserContext) -> bool {
    if user.is_admin() {
        return true;
    }

    if entity.kind == EntityKind::A2aAgent && !user.can_reach_agent(entity.path) {
        return false;
    }

    match entity.visibility {
        Visibility::Public => true,
        Visibility::Private => entity.registered_by == user.username,
        Visibility::GroupRestricted => entity
            .allowed_groups
            .iter()
            .any(|g| user.groups.contains(g)),
    }
}

/// Filters a full entity list down to the ones `user` may see.
pub fn filter_entities<'a>(
    entities: impl IntoIterator<Item = FilterableEntity<'a>>,
    user: &UserContext,
) -> Vec<FilterableEntity<'a>> {
    entities
        .into_iter()
        .filter(|e| is_accessible(e, user))
        .collect()
}

impl<'a> From<&'a Agent> for FilterableEntity<'a> {
    fn from(agent: &'a Agent) -> Self {
        Self {
            kind: EntityKind::A2aAgent,
            path: &agent.path,
            registered_by: &agent.registered_by,
            visibility: agent.visibility,
            allowed_groups: agent.allowed_groups.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn user(username: &str, groups: &[&str], is_admin: bool) -> UserContext {
        UserContext {
            username: username.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            is_admin,
            ..Default::default()
        }
    }

    #[test]
    fn admin_sees_everything() {
        let entity = FilterableEntity {
            kind: EntityKind::McpServer,
            path: "/x",
            registered_by: "alice",
            visibility: Visibility::Private,
            allowed_groups: Vec::new(),
        };
        assert!(is_accessible(&entity, &user("mallory", &[], true)));
    }

    #[test]
    fn private_entity_only_visible_to_owner() {
        let entity = FilterableEntity {
            kind: EntityKind::McpServer,
            path: "/x",
            registered_by: "alice",
            visibility: Visibility::Private,
            allowed_groups: Vec::new(),
        };
        assert!(is_accessible(&entity, &user("alice", &[], false)));
        assert!(!is_accessible(&entity, &user("bob", &[], false)));
    }

    #[test]
    fn group_restricted_requires_group_overlap() {
        let groups = vec!["eng".to_string()];
        let entity = FilterableEntity {
            kind: EntityKind::McpServer,
            path: "/x",
            registered_by: "alice",
            visibility: Visibility::GroupRestricted,
            allowed_groups: groups.clone(),
        };
        assert!(is_accessible(&entity, &user("bob", &["eng"], false)));
        assert!(!is_accessible(&entity, &user("bob", &["sales"], false)));
    }

    #[test]
    fn agent_visibility_gate_rejects_unreachable_agent() {
        let entity = FilterableEntity {
            kind: EntityKind::A2aAgent,
            path: "/trip-planner",
            registered_by: "alice",
            visibility: Visibility::Public,
            allowed_groups: Vec::new(),
        };
        let mut bob = user("bob", &[], false);
        bob.accessible_agents = vec!["/other-agent".to_string()];
        assert!(!is_accessible(&entity, &bob));

        bob.accessible_agents = vec!["all".to_string()];
        assert!(is_accessible(&entity, &bob));
    }
}
