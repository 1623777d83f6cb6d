use std::collections::HashMap;

/// Forward task graph: task id → ids of the tasks that depend on it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph(pub HashMap<String, Vec<String>>);

impl DependencyGraph {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build the forward graph from `(task id, depends_on)` pairs. Dependents
    /// are listed in declaration order.
    pub fn from_dependencies<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();
        let mut graph: HashMap<String, Vec<String>> = nodes
            .iter()
            .map(|(id, _)| (id.to_string(), Vec::new()))
            .collect();
        for (id, depends_on) in &nodes {
            for dependency in depends_on.iter() {
                graph
                    .entry(dependency.clone())
                    .or_default()
                    .push(id.to_string());
            }
        }
        Self(graph)
    }

    pub fn get_dependents(&self, task_id: &str) -> &[String] {
        self.0.get(task_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<HashMap<String, Vec<String>>> for DependencyGraph {
    fn from(graph: HashMap<String, Vec<String>>) -> Self {
        Self(graph)
    }
}
