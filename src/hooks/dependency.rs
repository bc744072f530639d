// Callback dependency graph and ordering
use petgraph::Graph;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Declared "must run before me" edges between callback ids.
///
/// Edges are stored both ways: `dependents` maps a dependency to the ids
/// waiting on it, `dependencies` keeps each id's declarations in order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents: HashMap<String, BTreeSet<String>>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &str, dependencies: &[String]) {
        for dependency in dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.dependencies
            .insert(id.to_string(), dependencies.to_vec());
    }

    /// Drop an id's own declarations; edges other ids declared on it stay
    pub fn remove(&mut self, id: &str) {
        if let Some(dependencies) = self.dependencies.remove(id) {
            for dependency in dependencies {
                if let Some(dependents) = self.dependents.get_mut(&dependency) {
                    dependents.remove(id);
                    if dependents.is_empty() {
                        self.dependents.remove(&dependency);
                    }
                }
            }
        }
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.dependents
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Order `selected` so every dependency precedes its dependents.
    ///
    /// `selected` is expected in priority order; it is used as the root order
    /// and dependencies outside it are ignored. On a cycle the path is returned,
    /// starting and ending with the same id.
    pub fn order(&self, selected: &[String]) -> Result<Vec<String>, Vec<String>> {
        let in_scope: HashSet<&str> = selected.iter().map(String::as_str).collect();
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(selected.len());
        let mut ordered = Vec::with_capacity(selected.len());

        for root in selected {
            if marks.contains_key(root.as_str()) {
                continue;
            }
            marks.insert(root.as_str(), Mark::Visiting);
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let dependencies = self.dependencies_of(node);

                if frame.1 >= dependencies.len() {
                    marks.insert(node, Mark::Done);
                    ordered.push(node.to_string());
                    stack.pop();
                    continue;
                }

                let dependency = dependencies[frame.1].as_str();
                frame.1 += 1;
                if !in_scope.contains(dependency) {
                    continue;
                }

                match marks.get(dependency) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        let start = stack
                            .iter()
                            .position(|(id, _)| *id == dependency)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|(id, _)| id.to_string()).collect();
                        cycle.push(dependency.to_string());
                        return Err(cycle);
                    }
                    None => {
                        marks.insert(dependency, Mark::Visiting);
                        stack.push((dependency, 0));
                    }
                }
            }
        }

        Ok(ordered)
    }

    /// Every cycle among `ids`, via strongly connected components
    pub fn detect_cycles(&self, ids: &[String]) -> Vec<Vec<String>> {
        let mut pg = Graph::<String, ()>::new();
        let mut node_indices = HashMap::new();

        for id in ids {
            let idx = pg.add_node(id.clone());
            node_indices.insert(id.as_str(), idx);
        }

        for id in ids {
            for dependency in self.dependencies_of(id) {
                if let (Some(&from_idx), Some(&to_idx)) = (
                    node_indices.get(dependency.as_str()),
                    node_indices.get(id.as_str()),
                ) {
                    pg.add_edge(from_idx, to_idx, ());
                }
            }
        }

        let mut cycles = Vec::new();
        for component in petgraph::algo::tarjan_scc(&pg) {
            let self_loop = component.len() == 1 && pg.contains_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                let mut members: Vec<String> = component.iter().map(|&idx| pg[idx].clone()).collect();
                members.sort();
                cycles.push(members);
            }
        }
        cycles.sort();
        cycles
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let mut graph = DependencyGraph::new();
        graph.add("render", &ids(&["physics"]));
        graph.add("physics", &ids(&["load"]));
        graph.add("load", &[]);

        let order = graph.order(&ids(&["render", "physics", "load"])).unwrap();
        assert_eq!(order, ids(&["load", "physics", "render"]));
    }

    #[test]
    fn test_independent_ids_keep_given_order() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &[]);
        graph.add("b", &[]);
        graph.add("c", &ids(&["a"]));

        let order = graph.order(&ids(&["b", "c", "a"])).unwrap();
        assert_eq!(order, ids(&["b", "a", "c"]));
    }

    #[test]
    fn test_out_of_scope_dependencies_are_ignored() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &ids(&["elsewhere"]));
        assert_eq!(graph.order(&ids(&["a"])).unwrap(), ids(&["a"]));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &ids(&["b"]));
        graph.add("b", &ids(&["c"]));
        graph.add("c", &ids(&["a"]));

        let cycle = graph.order(&ids(&["a", "b", "c"])).unwrap_err();
        assert_eq!(cycle, ids(&["a", "b", "c", "a"]));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &ids(&["a"]));
        assert_eq!(graph.order(&ids(&["a"])).unwrap_err(), ids(&["a", "a"]));
        assert_eq!(graph.detect_cycles(&ids(&["a"])), vec![ids(&["a"])]);
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut graph = DependencyGraph::new();
        let chain: Vec<String> = (0..10_000).map(|n| format!("cb-{n}")).collect();
        for window in chain.windows(2) {
            graph.add(&window[1], &[window[0].clone()]);
        }
        graph.add(&chain[0], &[]);

        let mut reversed = chain.clone();
        reversed.reverse();
        assert_eq!(graph.order(&reversed).unwrap(), chain);
    }

    #[test]
    fn test_detect_cycles_finds_every_component() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &ids(&["b"]));
        graph.add("b", &ids(&["a"]));
        graph.add("x", &ids(&["y"]));
        graph.add("y", &ids(&["x"]));
        graph.add("free", &ids(&["a"]));

        let cycles = graph.detect_cycles(&ids(&["a", "b", "x", "y", "free"]));
        assert_eq!(cycles, vec![ids(&["a", "b"]), ids(&["x", "y"])]);
    }

    #[test]
    fn test_remove_drops_edges() {
        let mut graph = DependencyGraph::new();
        graph.add("a", &ids(&["b"]));
        assert_eq!(graph.dependents_of("b"), ids(&["a"]));

        graph.remove("a");
        assert!(graph.dependents_of("b").is_empty());
        assert!(graph.is_empty());
    }
}
