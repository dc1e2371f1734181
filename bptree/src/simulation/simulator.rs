//! Main simulator harness for deterministic simulation testing.
//!
//! Runs a seeded workload of inserts, deletes and searches against a tree on
//! simulated storage and compares every answer with an in-memory model.
//!
//! When an operation fails with an injected fault its effect is uncertain:
//! the relocation journal either completes it on the next call or it never
//! happened. The simulator lifts faults, lets the tree recover, observes
//! which of the two outcomes is on disk and updates the model to match.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::TreeConfig;
use crate::key;
use crate::storage::btree::{BPlusTree, NodePath, TreeError};
use crate::types::{Key, Locator};

use super::invariants::{InvariantChecker, InvariantViolation, ViolationKind};
use super::storage::{FaultConfig, FaultInjectingStore, MemoryStore};

/// Root directory of the simulated tree.
const SIMULATED_ROOT: &str = "/sim/tree";

/// Text attributes used as the second key component.
const TAGS: [&str; 4] = ["amber", "basalt", "cobalt", "dune"];

type SimulatedTree = BPlusTree<FaultInjectingStore<MemoryStore>>;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Tree order; small orders give deep trees quickly.
    pub order: usize,
    /// Number of distinct first key components.
    pub key_space: i64,
    /// Fault injection configuration.
    pub fault_config: FaultConfig,
    /// Run the invariant checker every this many operations.
    pub check_interval: usize,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            order: 2,
            key_space: 64,
            fault_config: FaultConfig::default(),
            check_interval: 25,
        }
    }

    /// Set the fault configuration.
    #[must_use]
    pub const fn with_fault_config(mut self, config: FaultConfig) -> Self {
        self.fault_config = config;
        self
    }

    /// Set the tree order.
    #[must_use]
    pub const fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Set the number of distinct first key components.
    #[must_use]
    pub const fn with_key_space(mut self, key_space: i64) -> Self {
        self.key_space = key_space;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of operations issued.
    pub operations: u64,
    /// Number of operations that succeeded.
    pub successful_operations: u64,
    /// Number of operations that failed with an injected fault.
    pub failed_operations: u64,
    /// Keys in the model when the run ended.
    pub final_keys: usize,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether the simulation ran to the end.
    pub completed_successfully: bool,
    /// Error message if simulation failed.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

/// One workload step.
#[derive(Debug, Clone)]
enum Operation {
    Insert(Key, Locator),
    Delete(Key),
    Search(Key),
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    model: BTreeMap<Key, Vec<Locator>>,
    checker: InvariantChecker,
    operations: u64,
    successful_operations: u64,
    failed_operations: u64,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            checker: InvariantChecker::new(config.order),
            config,
            model: BTreeMap::new(),
            operations: 0,
            successful_operations: 0,
            failed_operations: 0,
        }
    }

    /// Run `operation_count` operations against a fresh tree.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        let error = self.run_workload(operation_count).err();
        if let Some(e) = &error {
            debug!(seed = self.config.seed, error = %e, "simulation aborted");
        }
        SimulationResult {
            seed: self.config.seed,
            operations: self.operations,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            final_keys: self.model.len(),
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: error.is_none(),
            error: error.map(|e| e.to_string()),
        }
    }

    fn run_workload(&mut self, operation_count: usize) -> Result<(), TreeError> {
        let tree_config = TreeConfig {
            order: self.config.order,
            sync_writes: false,
        };
        let store = FaultInjectingStore::new(
            MemoryStore::new(),
            self.config.seed,
            FaultConfig::no_faults(),
        );
        let mut tree = BPlusTree::open_with_store(store, SIMULATED_ROOT, &tree_config)?;
        tree.store_mut()
            .set_fault_config(self.config.fault_config.clone());

        for index in 0..operation_count {
            let operation = self.next_operation();
            self.operations += 1;
            self.apply(&mut tree, &operation, index)?;

            if (index + 1) % self.config.check_interval.max(1) == 0 {
                self.check_structure(&mut tree, index);
            }
        }

        tree.store_mut().heal();
        self.check_structure(&mut tree, operation_count);
        self.compare_all(&mut tree, operation_count)
    }

    fn next_operation(&mut self) -> Operation {
        let first = self.rng.random_range(0..self.config.key_space.max(1));
        let tag = TAGS[self.rng.random_range(0..TAGS.len())];
        let key = key![first, tag];
        match self.rng.random_range(0..10) {
            0..=4 => {
                let locator = Locator::new(self.rng.random(), self.rng.random());
                Operation::Insert(key, locator)
            }
            5..=7 => Operation::Delete(key),
            8 => Operation::Search(key),
            _ => Operation::Search(key![first]),
        }
    }

    fn apply(
        &mut self,
        tree: &mut SimulatedTree,
        operation: &Operation,
        index: usize,
    ) -> Result<(), TreeError> {
        match operation {
            Operation::Insert(key, locator) => match tree.insert(key.clone(), *locator) {
                Ok(()) => {
                    self.successful_operations += 1;
                    self.model.entry(key.clone()).or_default().push(*locator);
                    self.expect_key(tree, key, index)
                }
                Err(e) => {
                    self.failed_operations += 1;
                    let before = self.model.get(key).cloned();
                    let mut after = before.clone().unwrap_or_default();
                    after.push(*locator);
                    self.resolve(tree, key, before, Some(after), &e, index)
                }
            },
            Operation::Delete(key) => match tree.delete(key) {
                Ok(removed) => {
                    self.successful_operations += 1;
                    let expected = self.model.remove(key);
                    if removed != expected {
                        self.mismatch(index, key, expected.as_deref(), removed.as_deref());
                    }
                    self.expect_key(tree, key, index)
                }
                Err(e) => {
                    self.failed_operations += 1;
                    let before = self.model.get(key).cloned();
                    self.resolve(tree, key, before, None, &e, index)
                }
            },
            Operation::Search(key) => {
                match tree.search(key) {
                    Ok(found) => {
                        self.successful_operations += 1;
                        let expected = self.model_search(key);
                        if found != expected {
                            self.mismatch(index, key, expected.as_deref(), found.as_deref());
                        }
                    }
                    Err(_) => self.failed_operations += 1,
                }
                Ok(())
            }
        }
    }

    /// Settle a failed mutation: recover with faults lifted and accept either
    /// the state before or the state after the operation.
    fn resolve(
        &mut self,
        tree: &mut SimulatedTree,
        key: &Key,
        before: Option<Vec<Locator>>,
        after: Option<Vec<Locator>>,
        error: &TreeError,
        index: usize,
    ) -> Result<(), TreeError> {
        debug!(operation = index, key = %key, error = %error, "operation failed");
        // A crash happens once; the restarted tree keeps only random faults.
        let mut faults = tree.store().fault_config().clone();
        faults.crash_after = None;
        tree.store_mut().heal();
        let observed = tree.search(key);
        tree.store_mut().set_fault_config(faults);
        let observed = observed?;

        if observed == after {
            match after {
                Some(locators) => self.model.insert(key.clone(), locators),
                None => self.model.remove(key),
            };
        } else if observed != before {
            self.mismatch(index, key, after.as_deref(), observed.as_deref());
        }
        Ok(())
    }

    /// Verify one key right after a successful mutation.
    fn expect_key(
        &mut self,
        tree: &mut SimulatedTree,
        key: &Key,
        index: usize,
    ) -> Result<(), TreeError> {
        let faults = tree.store().fault_config().clone();
        tree.store_mut().heal();
        let found = tree.search(key);
        tree.store_mut().set_fault_config(faults);
        let found = found?;

        let expected = self.model.get(key).cloned();
        if found != expected {
            self.mismatch(index, key, expected.as_deref(), found.as_deref());
        }
        Ok(())
    }

    /// Locators the model holds for a full key or a prefix.
    fn model_search(&self, probe: &Key) -> Option<Vec<Locator>> {
        let mut found = Vec::new();
        let mut matched = false;
        for (key, locators) in self.model.range(probe.clone()..) {
            if !key.starts_with(probe) {
                break;
            }
            matched = true;
            found.extend_from_slice(locators);
        }
        matched.then_some(found)
    }

    fn check_structure(&mut self, tree: &mut SimulatedTree, index: usize) {
        let root = tree.root_location().to_path_buf();
        self.checker
            .check_tree(tree.store_mut().inner_mut(), &root, index);
    }

    /// Compare every model key, and every first-component prefix, with the
    /// tree.
    fn compare_all(&mut self, tree: &mut SimulatedTree, index: usize) -> Result<(), TreeError> {
        let keys: Vec<Key> = self.model.keys().cloned().collect();
        for key in &keys {
            let found = tree.search(key)?;
            let expected = self.model.get(key).cloned();
            if found != expected {
                self.mismatch(index, key, expected.as_deref(), found.as_deref());
            }
        }
        for first in 0..self.config.key_space {
            let prefix = key![first];
            let found = tree.search(&prefix)?;
            let expected = self.model_search(&prefix);
            if found != expected {
                self.mismatch(index, &prefix, expected.as_deref(), found.as_deref());
            }
        }
        Ok(())
    }

    fn mismatch(
        &mut self,
        index: usize,
        key: &Key,
        expected: Option<&[Locator]>,
        found: Option<&[Locator]>,
    ) {
        self.checker.add_violation(InvariantViolation {
            kind: ViolationKind::ModelMismatch,
            node: NodePath::root(),
            description: format!(
                "key {key}: expected {expected:?}, tree returned {found:?}"
            ),
            operation_index: index,
        });
    }

    /// Get the invariant checker.
    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }

    /// The model's view of the tree.
    #[must_use]
    pub const fn model(&self) -> &BTreeMap<Key, Vec<Locator>> {
        &self.model
    }
}

/// Run one seeded simulation with default settings.
#[must_use]
pub fn simulate(seed: u64, operation_count: usize) -> SimulationResult {
    Simulator::new(SimulatorConfig::new(seed)).run(operation_count)
}
