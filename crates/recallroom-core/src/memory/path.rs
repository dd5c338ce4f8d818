//! Prerequisite-aware ordering of target concepts into study sessions.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{KnowledgeState, SessionType, UserLearningProfile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub minutes_per_concept: u32,
    /// Load assumed for a concept the learner has never seen.
    pub unseen_concept_load: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            minutes_per_concept: 5,
            unseen_concept_load: 0.7,
        }
    }
}

/// A concept slotted into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptPlan {
    pub concept_id: String,
    pub estimated_load: f64,
    pub current_state: KnowledgeState,
    /// `1 - strength`; 1.0 for unseen concepts.
    pub priority: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub session_type: SessionType,
    pub concepts: Vec<ConceptPlan>,
    pub estimated_duration_min: u32,
    pub cognitive_load: f64,
}

/// A prerequisite edge ignored to break a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEdge {
    pub concept: String,
    pub prerequisite: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub sessions: Vec<SessionPlan>,
    pub dropped_edges: Vec<DroppedEdge>,
}

impl LearningPath {
    /// Concept ids in study order.
    pub fn concept_order(&self) -> Vec<&str> {
        self.sessions
            .iter()
            .flat_map(|s| s.concepts.iter().map(|c| c.concept_id.as_str()))
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

pub struct LearningPathPlanner {
    config: PlannerConfig,
}

impl Default for LearningPathPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LearningPathPlanner {
    pub fn new() -> Self {
        Self {
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Prerequisites of each target, restricted to the target set.
    ///
    /// An edge counts whether it was recorded on the concept itself
    /// (`prerequisites`) or on its prerequisite (`dependents`).
    fn dependency_graph<'t>(
        profile: &UserLearningProfile,
        targets: &[&'t str],
    ) -> HashMap<&'t str, Vec<&'t str>> {
        let in_targets: HashMap<&str, &'t str> = targets.iter().map(|t| (*t, *t)).collect();
        let mut graph: HashMap<&'t str, Vec<&'t str>> =
            targets.iter().map(|t| (*t, Vec::new())).collect();

        let add = |graph: &mut HashMap<&'t str, Vec<&'t str>>, concept: &'t str, prereq: &'t str| {
            if concept == prereq {
                return;
            }
            if let Some(list) = graph.get_mut(concept) {
                if !list.contains(&prereq) {
                    list.push(prereq);
                }
            }
        };

        for &target in targets {
            let Some(memory) = profile.concept(target) else {
                continue;
            };
            for p in &memory.prerequisites {
                if let Some(&prereq) = in_targets.get(p.as_str()) {
                    add(&mut graph, target, prereq);
                }
            }
            for d in &memory.dependents {
                if let Some(&dependent) = in_targets.get(d.as_str()) {
                    add(&mut graph, dependent, target);
                }
            }
        }
        graph
    }

    /// Depth-first topological order; back edges are dropped and reported.
    fn topological_order<'t>(
        targets: &[&'t str],
        graph: &HashMap<&'t str, Vec<&'t str>>,
    ) -> (Vec<&'t str>, Vec<DroppedEdge>) {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(targets.len());
        let mut order = Vec::with_capacity(targets.len());
        let mut dropped = Vec::new();

        for &root in targets {
            if marks.contains_key(root) {
                continue;
            }
            marks.insert(root, Mark::Visiting);
            let mut stack: Vec<(&'t str, usize)> = vec![(root, 0)];

            while let Some((node, next)) = stack.last_mut() {
                let prereqs = graph.get(*node).map(Vec::as_slice).unwrap_or(&[]);
                if let Some(&prereq) = prereqs.get(*next) {
                    *next += 1;
                    match marks.get(prereq).copied() {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => {
                            warn!(concept = *node, prerequisite = prereq, "dependency cycle, edge dropped");
                            dropped.push(DroppedEdge {
                                concept: node.to_string(),
                                prerequisite: prereq.to_string(),
                            });
                        }
                        None => {
                            marks.insert(prereq, Mark::Visiting);
                            stack.push((prereq, 0));
                        }
                    }
                } else {
                    let finished = *node;
                    stack.pop();
                    marks.insert(finished, Mark::Done);
                    order.push(finished);
                }
            }
        }
        (order, dropped)
    }

    /// Order `target_concepts` so prerequisites come first and pack them
    /// into sessions bounded by the learner's cognitive load capacity.
    pub fn optimize(&self, profile: &UserLearningProfile, target_concepts: &[String]) -> LearningPath {
        let mut seen = HashSet::new();
        let targets: Vec<&str> = target_concepts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .collect();

        let graph = Self::dependency_graph(profile, &targets);
        let (order, dropped_edges) = Self::topological_order(&targets, &graph);

        let capacity = profile.current_cognitive_load;
        let mut sessions = Vec::new();
        let mut current: Vec<ConceptPlan> = Vec::new();
        let mut current_load = 0.0;

        for concept_id in order {
            let plan = match profile.concept(concept_id).filter(|m| m.is_studied()) {
                Some(m) => ConceptPlan {
                    concept_id: concept_id.to_string(),
                    estimated_load: (1.0 - m.memory_strength) * m.difficulty_adjustment,
                    current_state: m.knowledge_state,
                    priority: 1.0 - m.memory_strength,
                },
                None => ConceptPlan {
                    concept_id: concept_id.to_string(),
                    estimated_load: self.config.unseen_concept_load,
                    current_state: KnowledgeState::Unknown,
                    priority: 1.0,
                },
            };

            if !current.is_empty() && current_load + plan.estimated_load > capacity {
                sessions.push(self.session(std::mem::take(&mut current), current_load));
                current_load = 0.0;
            }
            current_load += plan.estimated_load;
            current.push(plan);
        }
        if !current.is_empty() {
            sessions.push(self.session(current, current_load));
        }

        LearningPath {
            sessions,
            dropped_edges,
        }
    }

    fn session(&self, concepts: Vec<ConceptPlan>, load: f64) -> SessionPlan {
        let count = u32::try_from(concepts.len()).unwrap_or(u32::MAX);
        SessionPlan {
            session_type: SessionType::Study,
            estimated_duration_min: count.saturating_mul(self.config.minutes_per_concept),
            cognitive_load: load,
            concepts,
        }
    }
}
