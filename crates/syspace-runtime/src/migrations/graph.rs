//! The revision graph: validation, target resolution and path planning.

use std::collections::{BTreeSet, HashMap, VecDeque};

use super::error::{Direction, MigrationError, Result};
use super::revision::{MigrationScript, Revision, RevisionId};
use super::target::Target;

const RESERVED_LABELS: &[&str] = &["head", "heads", "base"];

/// Registry of migration scripts, ordered parent before child.
///
/// Built once from a script set and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct RevisionGraph {
    /// Scripts in topological order; positions double as node handles.
    scripts: Vec<MigrationScript>,
    index: HashMap<RevisionId, usize>,
    children: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    labels: HashMap<String, usize>,
}

/// One revision to run, with the marker to record once it has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub revision: RevisionId,
    pub marker_after: BTreeSet<RevisionId>,
}

/// Ordered revisions between the current marker and a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub direction: Direction,
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl RevisionGraph {
    /// Validate a script set and build the graph.
    pub fn new(scripts: Vec<MigrationScript>) -> Result<Self> {
        let mut positions: HashMap<RevisionId, usize> = HashMap::with_capacity(scripts.len());
        for (i, script) in scripts.iter().enumerate() {
            if script.id().as_str().is_empty() {
                return Err(MigrationError::InvalidGraph("empty revision id".into()));
            }
            if positions.insert(script.id().clone(), i).is_some() {
                return Err(MigrationError::InvalidGraph(format!(
                    "duplicate revision id {}",
                    script.id()
                )));
            }
        }

        let mut labels: HashMap<String, RevisionId> = HashMap::new();
        for script in &scripts {
            for label in &script.revision.branch_labels {
                if RESERVED_LABELS.contains(&label.as_str())
                    || label.starts_with(|c: char| c == '+' || c == '-')
                    || label.contains('@')
                {
                    return Err(MigrationError::InvalidGraph(format!(
                        "branch label '{}' on {} is reserved",
                        label,
                        script.id()
                    )));
                }
                if positions.contains_key(label.as_str()) {
                    return Err(MigrationError::InvalidGraph(format!(
                        "branch label '{}' on {} collides with a revision id",
                        label,
                        script.id()
                    )));
                }
                if let Some(other) = labels.insert(label.clone(), script.id().clone()) {
                    return Err(MigrationError::InvalidGraph(format!(
                        "branch label '{}' is used by both {} and {}",
                        label,
                        other,
                        script.id()
                    )));
                }
            }
            for required in script.revision.requirements() {
                if !positions.contains_key(required) {
                    return Err(MigrationError::InvalidGraph(format!(
                        "revision {} refers to unknown revision {}",
                        script.id(),
                        required
                    )));
                }
            }
        }

        let order = topological_order(&scripts, &positions)?;

        let mut slots: Vec<Option<MigrationScript>> = scripts.into_iter().map(Some).collect();
        let scripts: Vec<MigrationScript> =
            order.iter().filter_map(|&i| slots[i].take()).collect();

        let index: HashMap<RevisionId, usize> = scripts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id().clone(), i))
            .collect();

        let mut children = vec![Vec::new(); scripts.len()];
        let mut dependents = vec![Vec::new(); scripts.len()];
        for (i, script) in scripts.iter().enumerate() {
            for parent in &script.revision.down_revisions {
                if let Some(&p) = index.get(parent) {
                    if !children[p].contains(&i) {
                        children[p].push(i);
                    }
                }
            }
            for dep in &script.revision.depends_on {
                if let Some(&d) = index.get(dep) {
                    if !dependents[d].contains(&i) {
                        dependents[d].push(i);
                    }
                }
            }
        }

        let labels = labels
            .into_iter()
            .filter_map(|(label, id)| index.get(&id).map(|&i| (label, i)))
            .collect();

        Ok(Self {
            scripts,
            index,
            children,
            dependents,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Get a script by exact revision id.
    pub fn get(&self, id: &str) -> Option<&MigrationScript> {
        self.index.get(id).map(|&i| &self.scripts[i])
    }

    /// All scripts, parent before child.
    pub fn scripts(&self) -> impl DoubleEndedIterator<Item = &MigrationScript> {
        self.scripts.iter()
    }

    /// Lazy parent-to-child walk over the revisions.
    ///
    /// Every call starts a fresh walk; reverse it for newest-first output.
    pub fn history(&self) -> History<'_> {
        History {
            scripts: &self.scripts,
            front: 0,
            back: self.scripts.len(),
        }
    }

    /// Revisions no other revision names as a parent.
    pub fn heads(&self) -> Vec<RevisionId> {
        self.ids_where(|i| self.children[i].is_empty())
    }

    /// Revisions without parents.
    pub fn bases(&self) -> Vec<RevisionId> {
        self.ids_where(|i| self.scripts[i].revision.is_base())
    }

    /// Revisions with more than one child.
    pub fn branch_points(&self) -> Vec<RevisionId> {
        self.ids_where(|i| self.children[i].len() > 1)
    }

    /// Direct children of a revision.
    pub fn children_of(&self, id: &str) -> Vec<RevisionId> {
        self.index
            .get(id)
            .map(|&i| self.ids(self.children[i].iter().copied()))
            .unwrap_or_default()
    }

    fn ids_where(&self, pred: impl Fn(usize) -> bool) -> Vec<RevisionId> {
        self.ids((0..self.scripts.len()).filter(|&i| pred(i)))
    }

    fn ids(&self, positions: impl IntoIterator<Item = usize>) -> Vec<RevisionId> {
        positions
            .into_iter()
            .map(|i| self.scripts[i].id().clone())
            .collect()
    }

    fn position(&self, id: &RevisionId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| MigrationError::UnknownRevision(id.to_string()))
    }

    /// Resolve an id, branch label, or unique id prefix.
    pub fn resolve_id(&self, name: &str) -> Result<RevisionId> {
        self.lookup(name).map(|i| self.scripts[i].id().clone())
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        if let Some(&i) = self.index.get(name) {
            return Ok(i);
        }
        if let Some(&i) = self.labels.get(name) {
            return Ok(i);
        }
        if name.is_empty() {
            return Err(MigrationError::UnknownRevision(String::new()));
        }

        let matches: Vec<usize> = self
            .scripts
            .iter()
            .enumerate()
            .filter(|(_, s)| s.id().as_str().starts_with(name))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => Err(MigrationError::UnknownRevision(name.to_string())),
            [one] => Ok(*one),
            many => Err(MigrationError::AmbiguousRevision {
                prefix: name.to_string(),
                candidates: self.ids(many.iter().copied()),
            }),
        }
    }

    /// Resolve a target to the set of revisions it names. Empty means base.
    ///
    /// `current` is the recorded marker, used by relative targets.
    pub fn resolve(
        &self,
        target: &Target,
        current: &BTreeSet<RevisionId>,
    ) -> Result<BTreeSet<RevisionId>> {
        match target {
            Target::Base => Ok(BTreeSet::new()),
            Target::Heads => Ok(self.heads().into_iter().collect()),
            Target::Head => {
                let heads = self.heads();
                if heads.len() > 1 {
                    return Err(MigrationError::AmbiguousHead {
                        target: target.to_string(),
                        heads,
                    });
                }
                Ok(heads.into_iter().collect())
            }
            Target::Revision(name) => {
                let i = self.lookup(name)?;
                Ok(BTreeSet::from([self.scripts[i].id().clone()]))
            }
            Target::BranchHead(name) => {
                let start = self.lookup(name)?;
                let heads: Vec<usize> = self
                    .reachable(&[start], false)
                    .into_iter()
                    .filter(|&i| self.children[i].is_empty())
                    .collect();
                match heads.as_slice() {
                    [one] => Ok(BTreeSet::from([self.scripts[*one].id().clone()])),
                    many => Err(MigrationError::AmbiguousHead {
                        target: target.to_string(),
                        heads: self.ids(many.iter().copied()),
                    }),
                }
            }
            Target::Relative(n) => self.relative(target, *n, current),
        }
    }

    fn relative(
        &self,
        target: &Target,
        n: i64,
        current: &BTreeSet<RevisionId>,
    ) -> Result<BTreeSet<RevisionId>> {
        if current.len() > 1 {
            return Err(MigrationError::AmbiguousHead {
                target: target.to_string(),
                heads: current.iter().cloned().collect(),
            });
        }

        let start = match current.iter().next() {
            Some(id) => Some(self.position(id)?),
            None => None,
        };
        let mut cur = start;

        if n >= 0 {
            for _ in 0..n {
                let next: Vec<usize> = match cur {
                    Some(i) => self.children[i].clone(),
                    None => (0..self.scripts.len())
                        .filter(|&i| self.scripts[i].revision.is_base())
                        .collect(),
                };
                cur = match next.as_slice() {
                    [] => {
                        return Err(MigrationError::NoPath {
                            direction: Direction::Upgrade,
                            from: describe_marker(current),
                            to: target.to_string(),
                            reason: "not enough revisions ahead".into(),
                        })
                    }
                    [one] => Some(*one),
                    many => {
                        return Err(MigrationError::AmbiguousHead {
                            target: target.to_string(),
                            heads: self.ids(many.iter().copied()),
                        })
                    }
                };
            }
        } else {
            for _ in 0..n.unsigned_abs() {
                let Some(i) = cur else {
                    return Err(MigrationError::NoPath {
                        direction: Direction::Downgrade,
                        from: describe_marker(current),
                        to: target.to_string(),
                        reason: "not enough revisions below".into(),
                    });
                };
                let parents = &self.scripts[i].revision.down_revisions;
                cur = match parents.as_slice() {
                    [] => None,
                    [one] => Some(self.position(one)?),
                    many => {
                        return Err(MigrationError::AmbiguousHead {
                            target: target.to_string(),
                            heads: many.to_vec(),
                        })
                    }
                };
            }
        }

        Ok(cur
            .map(|i| self.scripts[i].id().clone())
            .into_iter()
            .collect())
    }

    /// Positions reachable from `start` (inclusive), either through
    /// requirements or through child links.
    fn reachable(&self, start: &[usize], towards_parents: bool) -> BTreeSet<usize> {
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut queue: VecDeque<usize> = start.iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if !seen.insert(i) {
                continue;
            }
            if towards_parents {
                for required in self.scripts[i].revision.requirements() {
                    if let Some(&p) = self.index.get(required) {
                        queue.push_back(p);
                    }
                }
            } else {
                queue.extend(self.children[i].iter().copied());
            }
        }
        seen
    }

    /// Everything applied when the marker records `heads`.
    fn applied(&self, heads: &BTreeSet<RevisionId>) -> Result<BTreeSet<usize>> {
        let start = heads
            .iter()
            .map(|id| self.position(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.reachable(&start, true))
    }

    /// Everything that must be reverted before any of `start` can be.
    fn builds_on(&self, start: &[usize]) -> BTreeSet<usize> {
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut queue: VecDeque<usize> = start.iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if !seen.insert(i) {
                continue;
            }
            queue.extend(self.children[i].iter().copied());
            queue.extend(self.dependents[i].iter().copied());
        }
        seen
    }

    /// The marker rows describing an applied set: applied revisions with no
    /// applied child.
    fn marker(&self, applied: &BTreeSet<usize>) -> BTreeSet<RevisionId> {
        applied
            .iter()
            .filter(|&&i| !self.children[i].iter().any(|c| applied.contains(c)))
            .map(|&i| self.scripts[i].id().clone())
            .collect()
    }

    /// Ancestors of `id` (requirements, transitively), parent before child.
    pub fn ancestors(&self, id: &RevisionId) -> Result<Vec<RevisionId>> {
        let i = self.position(id)?;
        let mut set = self.reachable(&[i], true);
        set.remove(&i);
        Ok(self.ids(set))
    }

    /// Plan an upgrade from the marker `current` to `target`.
    pub fn upgrade_plan(
        &self,
        current: &BTreeSet<RevisionId>,
        target: &BTreeSet<RevisionId>,
    ) -> Result<MigrationPlan> {
        let mut applied = self.applied(current)?;
        let wanted = self.applied(target)?;

        for id in target {
            let i = self.position(id)?;
            if applied.contains(&i) && !current.contains(id) {
                return Err(MigrationError::NoPath {
                    direction: Direction::Upgrade,
                    from: describe_marker(current),
                    to: id.to_string(),
                    reason: "target is below the current revision".into(),
                });
            }
        }

        let pending: Vec<usize> = wanted.difference(&applied).copied().collect();
        let mut steps = Vec::with_capacity(pending.len());
        for i in pending {
            applied.insert(i);
            steps.push(PlanStep {
                revision: self.scripts[i].id().clone(),
                marker_after: self.marker(&applied),
            });
        }

        Ok(MigrationPlan {
            direction: Direction::Upgrade,
            steps,
        })
    }

    /// Plan a downgrade from the marker `current` to `target`.
    ///
    /// Only revisions that build on the target are reverted; other applied
    /// branches stay in place.
    pub fn downgrade_plan(
        &self,
        current: &BTreeSet<RevisionId>,
        target: &BTreeSet<RevisionId>,
    ) -> Result<MigrationPlan> {
        let mut applied = self.applied(current)?;

        let reverting: BTreeSet<usize> = if target.is_empty() {
            applied.clone()
        } else {
            let mut start = Vec::with_capacity(target.len());
            for id in target {
                let i = self.position(id)?;
                if !applied.contains(&i) {
                    return Err(MigrationError::NoPath {
                        direction: Direction::Downgrade,
                        from: describe_marker(current),
                        to: id.to_string(),
                        reason: "target is not applied".into(),
                    });
                }
                start.push(i);
            }
            let mut later = self.builds_on(&start);
            for i in &start {
                later.remove(i);
            }
            later.intersection(&applied).copied().collect()
        };

        let mut steps = Vec::with_capacity(reverting.len());
        for &i in reverting.iter().rev() {
            applied.remove(&i);
            steps.push(PlanStep {
                revision: self.scripts[i].id().clone(),
                marker_after: self.marker(&applied),
            });
        }

        Ok(MigrationPlan {
            direction: Direction::Downgrade,
            steps,
        })
    }
}

/// Kahn's algorithm; ready revisions keep their input order.
fn topological_order(
    scripts: &[MigrationScript],
    positions: &HashMap<RevisionId, usize>,
) -> Result<Vec<usize>> {
    let n = scripts.len();
    let mut indegree = vec![0usize; n];
    let mut unlocks: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, script) in scripts.iter().enumerate() {
        let required: BTreeSet<usize> = script
            .revision
            .requirements()
            .filter_map(|r| positions.get(r).copied())
            .collect();
        indegree[i] = required.len();
        for r in required {
            unlocks[r].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &next in &unlocks[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != n {
        let stuck: Vec<&str> = (0..n)
            .filter(|&i| indegree[i] > 0)
            .map(|i| scripts[i].id().as_str())
            .collect();
        return Err(MigrationError::InvalidGraph(format!(
            "cycle involving {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

/// Human form of a marker: `base` or the comma-separated heads.
pub fn describe_marker(marker: &BTreeSet<RevisionId>) -> String {
    if marker.is_empty() {
        "base".to_string()
    } else {
        marker
            .iter()
            .map(RevisionId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Iterator over revisions, parent before child.
#[derive(Debug, Clone)]
pub struct History<'a> {
    scripts: &'a [MigrationScript],
    front: usize,
    back: usize,
}

impl<'a> Iterator for History<'a> {
    type Item = &'a Revision;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let rev = &self.scripts[self.front].revision;
        self.front += 1;
        Some(rev)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for History<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(&self.scripts[self.back].revision)
    }
}

impl ExactSizeIterator for History<'_> {}
