//! Prerequisite graph for one subject.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::engine::types::PrerequisiteEdge;

#[derive(Debug, Clone, Default)]
pub struct SkillGraph {
    nodes: BTreeSet<String>,
    /// target -> sources, sorted and deduplicated
    parents: HashMap<String, Vec<String>>,
    /// source -> targets, sorted and deduplicated
    children: HashMap<String, Vec<String>>,
}

impl SkillGraph {
    pub fn from_edges(edges: &[PrerequisiteEdge]) -> Self {
        let mut graph = Self::default();
        for edge in edges {
            graph.add_edge(&edge.source, &edge.target);
        }
        graph
    }

    /// Adds skills that have no edges (isolated lessons).
    pub fn with_nodes<'a>(mut self, nodes: impl IntoIterator<Item = &'a str>) -> Self {
        for node in nodes {
            self.nodes.insert(node.to_string());
        }
        self
    }

    fn add_edge(&mut self, source: &str, target: &str) {
        self.nodes.insert(source.to_string());
        self.nodes.insert(target.to_string());

        let parents = self.parents.entry(target.to_string()).or_default();
        if let Err(pos) = parents.binary_search_by(|p| p.as_str().cmp(source)) {
            parents.insert(pos, source.to_string());
        }
        let children = self.children.entry(source.to_string()).or_default();
        if let Err(pos) = children.binary_search_by(|c| c.as_str().cmp(target)) {
            children.insert(pos, target.to_string());
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, skill_id: &str) -> bool {
        self.nodes.contains(skill_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct prerequisites of a skill.
    pub fn parents(&self, skill_id: &str) -> &[String] {
        self.parents
            .get(skill_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Direct successors of a skill.
    pub fn children(&self, skill_id: &str) -> &[String] {
        self.children
            .get(skill_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Kahn's algorithm with a min-heap so ties resolve by lexicographic id.
    /// Nodes left over by a cycle are appended in id order.
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for (target, sources) in &self.parents {
            if let Some(degree) = in_degree.get_mut(target.as_str()) {
                *degree += sources.len();
            }
        }

        let mut heap: BinaryHeap<Reverse<&str>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node)) = heap.pop() {
            order.push(node.to_string());
            for child in self.children(node) {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        heap.push(Reverse(child.as_str()));
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: BTreeSet<&str> = order.iter().map(|s| s.as_str()).collect();
            let residual: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| !placed.contains(n.as_str()))
                .cloned()
                .collect();
            tracing::warn!(
                residual = residual.len(),
                "Prerequisite graph has a cycle, appending residual skills by id"
            );
            order.extend(residual);
        }

        order
    }

    pub fn chapters(&self) -> Vec<u32> {
        let chapters: BTreeSet<u32> = self.nodes.iter().filter_map(|n| chapter_of(n)).collect();
        chapters.into_iter().collect()
    }

    pub fn nodes_in_chapters(&self, chapters: &[u32]) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter(|n| chapter_of(n).is_some_and(|c| chapters.contains(&c)))
            .cloned()
            .collect()
    }
}

/// Chapter number encoded in a skill id: `"3.2"` -> 3, `"Chg4_intro"` -> 4.
pub fn chapter_of(skill_id: &str) -> Option<u32> {
    let digits: String = skill_id.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() && skill_id[digits.len()..].starts_with('.') {
        return digits.parse().ok();
    }

    let pos = skill_id.find("Chg")?;
    let digits: String = skill_id[pos + 3..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
