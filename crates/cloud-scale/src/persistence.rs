//! Persistence tracking across a scale stack.
//!
//! Builds a [`LevelGraph`] whose edges record how many samples two
//! regions at adjacent scales share, relabels every level so physically
//! persistent regions keep stable label values, and extracts explicit
//! birth/death [`Component`] records.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::labeling::UNLABELED;
use crate::level_graph::LevelGraph;
use crate::scale_stack::ScaleStack;

/// The tracked lifetime of one persistent region.
///
/// A component is born at the level where its chain starts and records
/// the region label it occupies at every consecutive level it lives,
/// never skipping a level: `death_level == birth_level + len - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    birth_level: usize,
    labels: Vec<i32>,
}

impl Component {
    /// The level at which this component appears.
    #[must_use]
    pub fn birth_level(&self) -> usize {
        self.birth_level
    }

    /// The last level at which this component is alive.
    #[must_use]
    pub fn death_level(&self) -> usize {
        self.birth_level + self.labels.len() - 1
    }

    /// Number of levels lived.
    #[must_use]
    pub fn lifetime(&self) -> usize {
        self.labels.len()
    }

    /// The region label this component occupies at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is outside `[birth_level, death_level]`.
    #[must_use]
    pub fn label_at(&self, level: usize) -> i32 {
        self.labels[level - self.birth_level]
    }

    /// Region labels from birth to death.
    #[must_use]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// The sample ids belonging to this component at `level`, resolved
    /// through the (relabeled) stack.
    ///
    /// # Panics
    ///
    /// Panics if `level` is outside `[birth_level, death_level]`.
    #[must_use]
    pub fn samples_at(&self, stack: &ScaleStack, level: usize) -> Vec<u32> {
        stack.labeling(level).samples_of(self.label_at(level))
    }
}

/// Builds the level graph of a scale stack: one node per region per
/// level carrying `population` and `scale` attributes, and one weighted
/// edge per pair of adjacent-scale regions sharing samples.
///
/// # Panics
///
/// Panics if any level of the stack is not compact
/// ([`crate::Labeling::is_full`]); persistence tracking indexes nodes
/// densely by label.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn build_level_graph(stack: &ScaleStack) -> LevelGraph {
    let mut graph = LevelGraph::new();

    for (level, (scale, labeling)) in stack.iter().enumerate() {
        assert!(
            labeling.is_full(),
            "level {level} is not compact; call make_full before tracking"
        );
        graph.add_level();
        let region_count = labeling.label_sup() as usize;
        let mut populations = Vec::with_capacity(region_count);
        for label in 0..labeling.label_sup() {
            graph.add_node(level);
            populations.push(labeling.population(label) as f64);
        }
        graph.set_node_attribute("population", level, populations);
        graph.set_node_attribute("scale", level, vec![scale; region_count]);
    }

    // One edge per (coarse region, fine region) pair with shared samples,
    // weighted by how many samples the two regions share.
    for mid in 0..stack.level_count().saturating_sub(1) {
        let fine = stack.labeling(mid);
        let coarse = stack.labeling(mid + 1);
        let mut edge_ids: HashMap<(i32, i32), u32> = HashMap::new();
        for sample in 0..stack.sample_count() as u32 {
            let fine_label = fine.label_of(sample);
            let coarse_label = coarse.label_of(sample);
            if fine_label == UNLABELED || coarse_label == UNLABELED {
                continue;
            }
            let id = *edge_ids
                .entry((coarse_label, fine_label))
                .or_insert_with(|| {
                    graph.add_edge(mid, coarse_label as u32, fine_label as u32, 0.0)
                });
            graph.add_edge_weight(mid, id, 1.0);
        }
    }

    debug_assert!(graph.is_consistent());
    graph
}

/// Relabels every level so persistent regions keep stable identities.
///
/// Phase 1 sorts the coarsest level by descending population, so the
/// most populous coarse region becomes label 0. Phase 2 walks the
/// remaining levels coarse to fine: every child region is claimed by the
/// father maximizing `edge_weight / father_population` (ties to the
/// lower-ranked father), then fathers emit their claimed children in
/// descending relative weight, unclaimed children last in prior order.
/// The resulting permutation is applied to the graph (node swaps) and
/// the stack (label rewriting).
///
/// This is a greedy, local, single-pass heuristic: a persistent region
/// *tends* to keep its label across scales, with no global-optimum
/// guarantee. Re-running on an already-reorganized pair is a no-op.
///
/// # Panics
///
/// Panics if `graph` was not built from `stack`.
pub fn reorganize(stack: &mut ScaleStack, graph: &mut LevelGraph) {
    let level_count = stack.level_count();
    assert_eq!(level_count, graph.level_count());
    if level_count == 0 {
        return;
    }

    // Phase 1: coarsest level by descending population.
    let top = level_count - 1;
    let populations: Vec<f64> = region_populations(stack, top);
    let mut order: Vec<u32> = (0..populations.len() as u32).collect();
    order.sort_by(|&a, &b| populations[b as usize].total_cmp(&populations[a as usize]));
    apply_level_order(stack, graph, top, &order);

    // Phase 2: each level from coarsest-but-one down.
    for level in (0..top).rev() {
        let order = rank_children(stack, graph, level);
        apply_level_order(stack, graph, level, &order);
    }

    debug_assert!(graph.is_consistent());
    info!(levels = level_count, "scale stack reorganized");
}

#[allow(clippy::cast_precision_loss)]
fn region_populations(stack: &ScaleStack, level: usize) -> Vec<f64> {
    let labeling = stack.labeling(level);
    (0..labeling.label_sup())
        .map(|label| labeling.population(label) as f64)
        .collect()
}

/// Ranks the nodes of `level` by walking the already-ranked fathers at
/// `level + 1`. Returns `order` with `order[rank] = current node index`.
#[allow(clippy::cast_possible_truncation)]
fn rank_children(stack: &ScaleStack, graph: &LevelGraph, level: usize) -> Vec<u32> {
    let child_count = graph.node_count(level);
    let father_count = graph.node_count(level + 1);
    let father_populations = region_populations(stack, level + 1);

    // Claim each child for the father with the highest relative weight.
    let mut claim: Vec<Option<(u32, f64)>> = vec![None; child_count];
    for id in 0..graph.edge_count(level) as u32 {
        let edge = graph.edge(level, id);
        let relative = edge.weight / father_populations[edge.source as usize];
        let current = &mut claim[edge.target as usize];
        let better = match *current {
            None => true,
            Some((father, weight)) => {
                relative > weight || (relative == weight && edge.source < father)
            }
        };
        if better {
            *current = Some((edge.source, relative));
        }
    }

    let mut order: Vec<u32> = Vec::with_capacity(child_count);
    let mut placed = vec![false; child_count];
    for father in 0..father_count as u32 {
        let mut owned: Vec<(u32, f64)> = claim
            .iter()
            .enumerate()
            .filter_map(|(child, entry)| match *entry {
                Some((f, weight)) if f == father => Some((child as u32, weight)),
                _ => None,
            })
            .collect();
        owned.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for (child, _) in owned {
            order.push(child);
            placed[child as usize] = true;
        }
    }
    // Children with no father keep their prior relative order at the end.
    for child in 0..child_count as u32 {
        if !placed[child as usize] {
            order.push(child);
        }
    }
    order
}

/// Physically realizes `order` (`order[rank] = current index`) on one
/// graph level via node swaps and rewrites the stack's labels.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn apply_level_order(stack: &mut ScaleStack, graph: &mut LevelGraph, level: usize, order: &[u32]) {
    let n = order.len();
    debug_assert_eq!(n, graph.node_count(level));

    // new_of_old[old index] = rank.
    let mut new_of_old = vec![0u32; n];
    for (rank, &old) in order.iter().enumerate() {
        new_of_old[old as usize] = rank as u32;
    }

    // Realize as a sequence of same-level swaps, tracking positions.
    let mut position = vec![0u32; n]; // position[original index] = current slot
    let mut occupant: Vec<u32> = (0..n as u32).collect(); // occupant[slot] = original index
    for (i, slot) in position.iter_mut().enumerate() {
        *slot = i as u32;
    }
    for rank in 0..n as u32 {
        let wanted = order[rank as usize];
        let from = position[wanted as usize];
        if from != rank {
            graph.swap_nodes(level, from, rank);
            let displaced = occupant[rank as usize];
            occupant.swap(from as usize, rank as usize);
            position[wanted as usize] = rank;
            position[displaced as usize] = from;
        }
    }

    let relabeling: Vec<i32> = new_of_old.iter().map(|&v| v as i32).collect();
    stack.labeling_mut(level).apply_relabeling(&relabeling);
}

/// Extracts per-region birth/death component records from a reorganized
/// level graph.
///
/// Identity across levels follows graph adjacency at weight-maximizing
/// edges, not label values: a region survives into its *primary father*
/// (the adjacent coarser region sharing the most samples) exactly when
/// it is that father's *dominant child* (the finer region the father
/// shares the most samples with). Chains under this mutual-best rule
/// partition all nodes, so every region of every level belongs to
/// exactly one component.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn extract_components(graph: &LevelGraph) -> Vec<Component> {
    let level_count = graph.level_count();
    if level_count == 0 {
        return Vec::new();
    }

    // survivor[mid][father] = the father's dominant child, if any.
    let mut dominant_child: Vec<Vec<Option<u32>>> = Vec::with_capacity(level_count - 1);
    // primary_father[mid][child] = the child's heaviest father, if any.
    let mut primary_father: Vec<Vec<Option<u32>>> = Vec::with_capacity(level_count - 1);

    for mid in 0..level_count - 1 {
        let mut best_child: Vec<Option<(u32, f64)>> = vec![None; graph.node_count(mid + 1)];
        let mut best_father: Vec<Option<(u32, f64)>> = vec![None; graph.node_count(mid)];
        for id in 0..graph.edge_count(mid) as u32 {
            let edge = graph.edge(mid, id);
            update_best(&mut best_child[edge.source as usize], edge.target, edge.weight);
            update_best(&mut best_father[edge.target as usize], edge.source, edge.weight);
        }
        dominant_child.push(best_child.into_iter().map(|b| b.map(|(n, _)| n)).collect());
        primary_father.push(best_father.into_iter().map(|b| b.map(|(n, _)| n)).collect());
    }

    // A child continues into its primary father iff it is also that
    // father's dominant child.
    let continues = |level: usize, child: u32| -> Option<u32> {
        let father = primary_father[level][child as usize]?;
        (dominant_child[level][father as usize] == Some(child)).then_some(father)
    };

    let mut components = Vec::new();
    for birth_level in 0..level_count {
        for node in 0..graph.node_count(birth_level) as u32 {
            // Chain starts: nodes not continued into by a finer region.
            let continued_into = birth_level > 0
                && dominant_child[birth_level - 1][node as usize]
                    .is_some_and(|child| continues(birth_level - 1, child) == Some(node));
            if continued_into {
                continue;
            }
            let mut labels = vec![node as i32];
            let mut level = birth_level;
            let mut current = node;
            while level + 1 < level_count {
                match continues(level, current) {
                    Some(father) => {
                        labels.push(father as i32);
                        current = father;
                        level += 1;
                    }
                    None => break,
                }
            }
            components.push(Component {
                birth_level,
                labels,
            });
        }
    }

    debug!(components = components.len(), "components extracted");
    components
}

fn update_best(slot: &mut Option<(u32, f64)>, node: u32, weight: f64) {
    let better = match *slot {
        None => true,
        Some((current, w)) => weight > w || (weight == w && node < current),
    };
    if better {
        *slot = Some((node, weight));
    }
}

/// Convenience driver: build the level graph, reorganize the stack, and
/// extract components in one pass.
pub fn track_persistence(stack: &mut ScaleStack) -> (LevelGraph, Vec<Component>) {
    let mut graph = build_level_graph(stack);
    reorganize(stack, &mut graph);
    let components = extract_components(&graph);
    (graph, components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::Labeling;

    /// 100 samples, three levels with region counts [5, 3, 1]:
    /// level 1 regions hold 50/30/20 samples and split at level 0 into
    /// 30+20 / 20+10 / 20; everything merges at level 2.
    fn funnel_stack() -> ScaleStack {
        let mut fine = Labeling::new(100);
        for _ in 0..5 {
            fine.new_label();
        }
        let mut mid = Labeling::new(100);
        for _ in 0..3 {
            mid.new_label();
        }
        let mut coarse = Labeling::new(100);
        coarse.new_label();

        for i in 0..100u32 {
            let fine_label = match i {
                0..=29 => 0,
                30..=49 => 1,
                50..=69 => 2,
                70..=79 => 3,
                _ => 4,
            };
            let mid_label = match i {
                0..=49 => 0,
                50..=79 => 1,
                _ => 2,
            };
            fine.set_label(i, fine_label);
            mid.set_label(i, mid_label);
            coarse.set_label(i, 0);
        }

        let mut stack = ScaleStack::new();
        stack.push(1.0, fine).unwrap();
        stack.push(2.0, mid).unwrap();
        stack.push(4.0, coarse).unwrap();
        stack
    }

    #[test]
    fn graph_has_one_node_per_region() {
        let stack = funnel_stack();
        let graph = build_level_graph(&stack);

        assert_eq!(graph.level_count(), 3);
        let total: usize = (0..3).map(|l| graph.node_count(l)).sum();
        assert_eq!(total, 9);
        assert_eq!(graph.node_attribute("scale", 2), Some(&[4.0][..]));
        assert_eq!(
            graph.node_attribute("population", 1),
            Some(&[50.0, 30.0, 20.0][..])
        );
    }

    #[test]
    fn edge_weights_count_shared_samples() {
        let stack = funnel_stack();
        let graph = build_level_graph(&stack);

        // Level 0 region 0 (30 samples) lies entirely inside level 1
        // region 0.
        let id = graph.find_edge(0, 0, 0).unwrap();
        approx::assert_relative_eq!(graph.edge(0, id).weight, 30.0);
        // Level 1 regions all flow into the single coarse region.
        assert_eq!(graph.edge_count(1), 3);
        assert_eq!(graph.edge_count(0), 5);
    }

    #[test]
    fn unlabeled_samples_produce_no_edges() {
        let mut fine = Labeling::new(4);
        fine.new_label();
        fine.set_label(0, 0);
        fine.set_label(1, 0);
        fine.make_full();
        let mut coarse = Labeling::new(4);
        coarse.new_label();
        for i in 0..4 {
            coarse.set_label(i, 0);
        }

        let mut stack = ScaleStack::new();
        stack.push(1.0, fine).unwrap();
        stack.push(2.0, coarse).unwrap();
        let graph = build_level_graph(&stack);

        let id = graph.find_edge(0, 0, 0).unwrap();
        approx::assert_relative_eq!(graph.edge(0, id).weight, 2.0);
    }

    #[test]
    fn reorganize_puts_most_populous_coarse_region_first() {
        let mut stack = funnel_stack();
        // Make the coarse level less trivial: two coarse regions, the
        // second one bigger.
        let mut coarse = Labeling::new(100);
        coarse.new_label();
        coarse.new_label();
        // Label 0 gets the small half so phase 1 has to swap.
        for i in 0..100u32 {
            coarse.set_label(i, i32::from(i >= 30));
        }
        *stack.labeling_mut(2) = coarse;

        let mut graph = build_level_graph(&stack);
        reorganize(&mut stack, &mut graph);

        let populations = graph.node_attribute("population", 2).unwrap();
        approx::assert_relative_eq!(populations[0], 70.0);
        assert_eq!(stack.labeling(2).population(0), 70);
    }

    #[test]
    fn reorganize_orders_children_by_relative_weight() {
        let mut stack = funnel_stack();
        let mut graph = build_level_graph(&stack);
        reorganize(&mut stack, &mut graph);

        // Mid level: regions ranked 50, 30, 20 — already in that order.
        assert_eq!(
            graph.node_attribute("population", 1),
            Some(&[50.0, 30.0, 20.0][..])
        );
        // Fine level: father 0's children (30, 20) first, then father
        // 1's (20, 10), then father 2's (20).
        assert_eq!(
            graph.node_attribute("population", 0),
            Some(&[30.0, 20.0, 20.0, 10.0, 20.0][..])
        );
        // Stack labels were rewritten to match.
        assert_eq!(stack.labeling(0).population(0), 30);
        assert_eq!(stack.labeling(0).population(3), 10);
    }

    #[test]
    fn reorganize_is_idempotent() {
        let mut stack = funnel_stack();
        let mut graph = build_level_graph(&stack);
        reorganize(&mut stack, &mut graph);

        let stack_once = stack.clone();
        let graph_once = graph.clone();
        reorganize(&mut stack, &mut graph);
        assert_eq!(stack, stack_once);
        assert_eq!(graph, graph_once);
    }

    #[test]
    fn funnel_yields_exactly_one_spanning_component() {
        let mut stack = funnel_stack();
        let (graph, components) = track_persistence(&mut stack);

        assert_eq!(graph.level_count(), 3);
        let spanning: Vec<&Component> = components
            .iter()
            .filter(|c| c.birth_level() == 0 && c.death_level() == 2)
            .collect();
        assert_eq!(spanning.len(), 1);
        // The spanning chain is the dominant one: labels 0 at every level.
        assert_eq!(spanning[0].labels(), &[0, 0, 0]);

        // Every node belongs to exactly one component.
        let covered: usize = components.iter().map(Component::lifetime).sum();
        assert_eq!(covered, 9);
    }

    #[test]
    fn component_invariants_hold() {
        let mut stack = funnel_stack();
        let (_, components) = track_persistence(&mut stack);

        for component in &components {
            assert!(component.lifetime() >= 1);
            assert_eq!(
                component.death_level(),
                component.birth_level() + component.lifetime() - 1
            );
        }
    }

    #[test]
    fn component_samples_resolve_through_stack() {
        let mut stack = funnel_stack();
        let (_, components) = track_persistence(&mut stack);

        let spanning = components
            .iter()
            .find(|c| c.birth_level() == 0 && c.death_level() == 2)
            .unwrap();
        assert_eq!(spanning.samples_at(&stack, 0).len(), 30);
        assert_eq!(spanning.samples_at(&stack, 1).len(), 50);
        assert_eq!(spanning.samples_at(&stack, 2).len(), 100);
    }

    #[test]
    fn single_level_stack_yields_one_component_per_region() {
        let mut labeling = Labeling::new(10);
        labeling.new_label();
        labeling.new_label();
        for i in 0..10u32 {
            labeling.set_label(i, i32::from(i >= 5));
        }
        let mut stack = ScaleStack::new();
        stack.push(1.0, labeling).unwrap();

        let (_, components) = track_persistence(&mut stack);
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.lifetime() == 1));
    }
}
