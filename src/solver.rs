// src/solver.rs

//! Action solver
//!
//! Turns a goal (install, remove, upgrade everything) into a validated,
//! ordered action plan, given the installed-state baseline and the binary
//! index. Solving never mutates state: a failed solve aborts with no side
//! effects and a plan only takes effect once the applier executes it.
//!
//! The pipeline is: selection (prefer the installed version of a dependency
//! when it satisfies the constraint, otherwise the highest indexed version
//! that does), conflict check over everything that would end up installed,
//! diff against the installed state, then a deterministic topological sort.

use crate::error::{Error, Result};
use crate::index::{BinaryIndex, DepEntry, Package};
use crate::state::{InstalledEntry, InstalledState};
use crate::version::{Version, VersionConstraint};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// What the caller wants done
#[derive(Debug, Clone)]
pub enum Goal {
    /// Install a package satisfying a version constraint
    Install {
        name: String,
        constraint: VersionConstraint,
    },
    /// Remove an installed package
    Remove { name: String },
    /// Upgrade every installed package to the highest indexed version
    UpgradeAll,
}

/// Explicit solver options, passed into every solve
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveOptions {
    /// Allow removal to cascade over installed reverse dependents instead
    /// of refusing when one would break
    pub cascade_remove: bool,
}

/// An atomic state transition
///
/// Install and Upgrade borrow the package record from the index that
/// produced the plan; a plan must not outlive its index.
#[derive(Debug, Clone)]
pub enum Action<'a> {
    Install {
        pkg: &'a Package,
    },
    Upgrade {
        pkg: &'a Package,
        /// The superseded installed version
        replaces: Version,
    },
    Remove {
        name: String,
        version: Version,
    },
}

impl Action<'_> {
    /// The package name this action targets
    pub fn name(&self) -> &str {
        match self {
            Action::Install { pkg } => &pkg.name,
            Action::Upgrade { pkg, .. } => &pkg.name,
            Action::Remove { name, .. } => name,
        }
    }
}

impl fmt::Display for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Install { pkg } => write!(f, "install {} ({})", pkg.name, pkg.version),
            Action::Upgrade { pkg, replaces } => {
                write!(f, "upgrade {} ({} -> {})", pkg.name, replaces, pkg.version)
            }
            Action::Remove { name, version } => write!(f, "remove {} ({})", name, version),
        }
    }
}

/// An ordered, validated sequence of actions
///
/// For every dependency edge "A depends on B": B's install/upgrade precedes
/// A's, and A's removal precedes B's.
#[derive(Debug, Default)]
pub struct ActionPlan<'a> {
    pub actions: Vec<Action<'a>>,
}

impl<'a> ActionPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action<'a>> {
        self.actions.iter()
    }
}

/// Solve a goal into an action plan
pub fn solve<'a>(
    goal: &Goal,
    installed: &InstalledState,
    index: &'a BinaryIndex,
    options: &SolveOptions,
) -> Result<ActionPlan<'a>> {
    let plan = match goal {
        Goal::Install { name, constraint } => solve_install(name, constraint, installed, index)?,
        Goal::Remove { name } => solve_remove(name, installed, options)?,
        Goal::UpgradeAll => solve_upgrade_all(installed, index)?,
    };
    debug!("Solved {:?}: {} actions", goal, plan.len());
    Ok(plan)
}

fn solve_install<'a>(
    name: &str,
    constraint: &VersionConstraint,
    installed: &InstalledState,
    index: &'a BinaryIndex,
) -> Result<ActionPlan<'a>> {
    if index.find_by_name(name).is_empty() && !installed.contains(name) {
        return Err(Error::NotFound(format!(
            "package '{}' in any configured repository",
            name
        )));
    }

    let mut selection = Selection::new(index, installed);
    selection.require(name, constraint, "command line")?;

    check_conflicts(&selection.chosen, installed)?;
    let actions = diff_forward(&selection.chosen, installed);
    order_forward(actions)
}

fn solve_upgrade_all<'a>(
    installed: &InstalledState,
    index: &'a BinaryIndex,
) -> Result<ActionPlan<'a>> {
    let mut selection = Selection::new(index, installed);

    for entry in installed.iter() {
        let candidates = index.find_by_name(&entry.name);
        let Some(latest) = candidates.first() else {
            // Not published by any configured repository: leave it alone
            continue;
        };
        if latest.version > entry.version {
            selection.require(
                &entry.name,
                &VersionConstraint::GreaterOrEqual(latest.version.clone()),
                "upgrade",
            )?;
        }
    }

    check_conflicts(&selection.chosen, installed)?;
    let actions = diff_forward(&selection.chosen, installed);
    order_forward(actions)
}

/// Dependency-closure selection state
struct Selection<'a, 'b> {
    index: &'a BinaryIndex,
    installed: &'b InstalledState,
    /// Packages that need an install or upgrade action
    chosen: BTreeMap<String, &'a Package>,
    /// Names whose installed version already satisfies every demand
    satisfied: BTreeSet<String>,
    /// Every constraint demanded of a name, with the demanding party
    demands: BTreeMap<String, Vec<(VersionConstraint, String)>>,
}

impl<'a, 'b> Selection<'a, 'b> {
    fn new(index: &'a BinaryIndex, installed: &'b InstalledState) -> Self {
        Self {
            index,
            installed,
            chosen: BTreeMap::new(),
            satisfied: BTreeSet::new(),
            demands: BTreeMap::new(),
        }
    }

    /// Demand that `name` end up present at a version satisfying `constraint`
    fn require(
        &mut self,
        name: &str,
        constraint: &VersionConstraint,
        required_by: &str,
    ) -> Result<()> {
        self.demands
            .entry(name.to_string())
            .or_default()
            .push((constraint.clone(), required_by.to_string()));

        if let Some(existing) = self.chosen.get(name) {
            if constraint.satisfies(&existing.version) {
                return Ok(());
            }
            // A later edge rejects the already-selected version; there is
            // no backtracking over earlier picks
            return Err(Error::Unsatisfiable(format!(
                "'{}' requires {} {}, but version {} was already selected",
                required_by, name, constraint, existing.version
            )));
        }

        if self.satisfied.contains(name) {
            let entry = self.installed.get(name).expect("satisfied name is installed");
            if constraint.satisfies(&entry.version) {
                return Ok(());
            }
            // The installed version no longer satisfies every demand:
            // promote to an indexed selection (an upgrade)
            self.satisfied.remove(name);
            return self.choose_from_index(name);
        }

        if let Some(entry) = self.installed.get(name) {
            if constraint.satisfies(&entry.version) {
                // Keep the installed version: minimizes churn
                self.satisfied.insert(name.to_string());
                return Ok(());
            }
        }

        self.choose_from_index(name)
    }

    /// Pick the highest indexed version satisfying every recorded demand,
    /// then require its own dependencies
    fn choose_from_index(&mut self, name: &str) -> Result<()> {
        let demands = self.demands.get(name).cloned().unwrap_or_default();
        let pick: Option<&'a Package> = self
            .index
            .find_by_name(name)
            .into_iter()
            .find(|p| demands.iter().all(|(c, _)| c.satisfies(&p.version)));

        let Some(pkg) = pick else {
            let (constraint, required_by) = demands
                .last()
                .cloned()
                .unwrap_or((VersionConstraint::Any, "command line".to_string()));
            return Err(Error::Unsatisfiable(format!(
                "no indexed version of '{}' satisfies '{}' (required by {})",
                name, constraint, required_by
            )));
        };

        self.chosen.insert(name.to_string(), pkg);
        for dep in &pkg.depends {
            self.require(&dep.name, &dep.constraint, &pkg.name)?;
        }
        Ok(())
    }
}

/// Verify that nothing in the post-plan state declares a conflict against
/// anything else in it
///
/// The active set is the chosen packages plus every installed package not
/// being replaced by a choice.
fn check_conflicts(
    chosen: &BTreeMap<String, &Package>,
    installed: &InstalledState,
) -> Result<()> {
    let mut active: BTreeMap<&str, (&Version, &[DepEntry])> = BTreeMap::new();
    for entry in installed.iter() {
        if !chosen.contains_key(&entry.name) {
            active.insert(&entry.name, (&entry.version, entry.conflicts.as_slice()));
        }
    }
    for pkg in chosen.values() {
        active.insert(&pkg.name, (&pkg.version, pkg.conflicts.as_slice()));
    }

    for (name, (version, conflicts)) in &active {
        for conflict in *conflicts {
            if conflict.name == *name {
                continue;
            }
            if let Some(&(other_version, _)) = active.get(conflict.name.as_str()) {
                if conflict.constraint.satisfies(other_version) {
                    return Err(Error::Conflict {
                        first: format!("{} ({})", name, version),
                        second: format!("{} ({})", conflict.name, other_version),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Diff the chosen set against the installed state into unordered actions
fn diff_forward<'a>(
    chosen: &BTreeMap<String, &'a Package>,
    installed: &InstalledState,
) -> Vec<Action<'a>> {
    let mut actions = Vec::new();
    for pkg in chosen.values().copied() {
        match installed.get(&pkg.name) {
            None => actions.push(Action::Install { pkg }),
            Some(entry) if entry.version == pkg.version && entry.sumsha == pkg.sumsha => {
                // Already present with the same identity: nothing to do
            }
            Some(entry) => actions.push(Action::Upgrade {
                pkg,
                replaces: entry.version.clone(),
            }),
        }
    }
    actions
}

/// Topologically order install/upgrade actions, dependencies first
///
/// Kahn's algorithm; ties among independent actions are broken by name so
/// plans are deterministic. A dependency cycle among the actions makes the
/// ordering invariant unsatisfiable.
fn order_forward(actions: Vec<Action<'_>>) -> Result<ActionPlan<'_>> {
    let mut by_name: BTreeMap<String, Action<'_>> = actions
        .into_iter()
        .map(|a| (a.name().to_string(), a))
        .collect();

    let mut in_degree: BTreeMap<String, usize> =
        by_name.keys().map(|n| (n.clone(), 0)).collect();
    let mut dependents_of: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, action) in &by_name {
        let pkg = match action {
            Action::Install { pkg } | Action::Upgrade { pkg, .. } => pkg,
            Action::Remove { .. } => unreachable!("forward ordering never sees removals"),
        };
        let dep_targets: BTreeSet<&str> = pkg
            .depends
            .iter()
            .map(|d| d.name.as_str())
            .filter(|t| *t != name.as_str() && by_name.contains_key(*t))
            .collect();
        for target in dep_targets {
            dependents_of
                .entry(target.to_string())
                .or_default()
                .push(name.clone());
            *in_degree.get_mut(name).expect("counted name") += 1;
        }
    }

    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| n.clone())
        .collect();
    let mut ordered_names = Vec::with_capacity(by_name.len());

    while let Some(name) = ready.pop_first() {
        if let Some(dependents) = dependents_of.get(&name) {
            for dependent in dependents {
                let degree = in_degree.get_mut(dependent).expect("counted dependent");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent.clone());
                }
            }
        }
        ordered_names.push(name);
    }

    if ordered_names.len() != by_name.len() {
        let stuck: Vec<String> = by_name
            .keys()
            .filter(|n| !ordered_names.contains(*n))
            .cloned()
            .collect();
        return Err(Error::Unsatisfiable(format!(
            "dependency cycle among: {}",
            stuck.join(", ")
        )));
    }

    let actions = ordered_names
        .into_iter()
        .map(|n| by_name.remove(&n).expect("ordered name"))
        .collect();
    Ok(ActionPlan { actions })
}

fn solve_remove<'a>(
    name: &str,
    installed: &InstalledState,
    options: &SolveOptions,
) -> Result<ActionPlan<'a>> {
    let target = installed
        .get(name)
        .ok_or_else(|| Error::NotFound(format!("package '{}' is not installed", name)))?;

    // Grow the removal set until no remaining installed package loses a
    // satisfied dependency; without cascading removal, any loss aborts.
    let mut removal: BTreeSet<String> = BTreeSet::from([target.name.clone()]);
    loop {
        let mut grew = false;
        for entry in installed.iter() {
            if removal.contains(&entry.name) {
                continue;
            }
            let broken = entry.depends.iter().find(|dep| {
                removal.contains(&dep.name)
                    && installed
                        .get(&dep.name)
                        .is_some_and(|provider| dep.constraint.satisfies(&provider.version))
            });
            if let Some(dep) = broken {
                if !options.cascade_remove {
                    return Err(Error::Unsatisfiable(format!(
                        "removing '{}' would leave installed package '{}' with unsatisfied dependency '{}' (pass --cascade to remove dependents as well)",
                        name, entry.name, dep
                    )));
                }
                removal.insert(entry.name.clone());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    order_removals(&removal, installed)
}

/// Order removals so dependents go before their dependencies
///
/// Mutually dependent packages being removed together fall back to name
/// order among themselves.
fn order_removals<'a>(
    removal: &BTreeSet<String>,
    installed: &InstalledState,
) -> Result<ActionPlan<'a>> {
    // in-degree of r = number of packages in the set that depend on r
    let mut in_degree: BTreeMap<&str, usize> =
        removal.iter().map(|n| (n.as_str(), 0)).collect();
    let mut depended_on_by: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for name in removal {
        let entry = installed.get(name).expect("removal set is installed");
        let dep_targets: BTreeSet<&str> = entry
            .depends
            .iter()
            .map(|d| d.name.as_str())
            .filter(|t| *t != name.as_str() && removal.contains(*t))
            .collect();
        for target in dep_targets {
            depended_on_by.entry(name.as_str()).or_default().push(target);
            *in_degree.get_mut(target).expect("counted target") += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut ordered: Vec<&str> = Vec::with_capacity(removal.len());

    while let Some(name) = ready.pop_first() {
        if let Some(targets) = depended_on_by.get(name) {
            for target in targets {
                let degree = in_degree.get_mut(target).expect("counted target");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*target);
                }
            }
        }
        ordered.push(name);
    }

    // Leftovers are a dependency cycle: removing them together is fine,
    // order among them by name
    for name in removal {
        if !ordered.contains(&name.as_str()) {
            ordered.push(name);
        }
    }

    let actions = ordered
        .into_iter()
        .map(|n| {
            let entry = installed.get(n).expect("removal set is installed");
            Action::Remove {
                name: entry.name.clone(),
                version: entry.version.clone(),
            }
        })
        .collect();
    Ok(ActionPlan { actions })
}
