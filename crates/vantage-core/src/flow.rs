//! User flow graphs built from page-to-page transition counts.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowNode {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowEdge>,
}

/// Transitions split by direction: `ascending` holds edges whose source sorts
/// before the target, `descending` the rest. A round trip A→B→A therefore
/// shows up once in each graph and neither graph contains that cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserFlow {
    pub ascending: FlowGraph,
    pub descending: FlowGraph,
}

/// Keep the first edge per `(source, target)`. Input arrives sorted by
/// value descending, so the heaviest duplicate survives.
pub fn dedupe_edges(edges: Vec<FlowEdge>) -> Vec<FlowEdge> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(edges.len());
    edges
        .into_iter()
        .filter(|edge| seen.insert((edge.source.clone(), edge.target.clone())))
        .collect()
}

fn graph_from(links: Vec<FlowEdge>) -> FlowGraph {
    let ids: BTreeSet<&str> = links
        .iter()
        .flat_map(|edge| [edge.source.as_str(), edge.target.as_str()])
        .collect();
    let nodes = ids
        .into_iter()
        .map(|id| FlowNode { id: id.to_string() })
        .collect();
    FlowGraph { nodes, links }
}

pub fn build_user_flow(edges: Vec<FlowEdge>) -> UserFlow {
    let (ascending, descending): (Vec<FlowEdge>, Vec<FlowEdge>) = dedupe_edges(edges)
        .into_iter()
        .partition(|edge| edge.source < edge.target);

    UserFlow {
        ascending: graph_from(ascending),
        descending: graph_from(descending),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: &str, target: &str, value: i64) -> FlowEdge {
        FlowEdge {
            source: source.to_string(),
            target: target.to_string(),
            value,
        }
    }

    #[test]
    fn dedupe_keeps_first_edge_per_pair() {
        let out = dedupe_edges(vec![edge("A", "B", 5), edge("A", "B", 3), edge("B", "C", 2)]);
        assert_eq!(out, vec![edge("A", "B", 5), edge("B", "C", 2)]);
    }

    #[test]
    fn edges_split_by_direction() {
        let flow = build_user_flow(vec![
            edge("/", "/pricing", 10),
            edge("/pricing", "/", 4),
            edge("/pricing", "/signup", 3),
        ]);
        assert_eq!(
            flow.ascending.links,
            vec![edge("/", "/pricing", 10), edge("/pricing", "/signup", 3)]
        );
        assert_eq!(flow.descending.links, vec![edge("/pricing", "/", 4)]);

        let ids: Vec<&str> = flow.ascending.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["/", "/pricing", "/signup"]);
        assert_eq!(flow.descending.nodes.len(), 2);
    }

    #[test]
    fn no_transitions_give_two_empty_graphs() {
        let flow = build_user_flow(Vec::new());
        assert!(flow.ascending.nodes.is_empty());
        assert!(flow.descending.links.is_empty());
    }
}
