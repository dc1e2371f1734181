//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the tree with:
//! - In-memory node storage with fault injection and crash points
//! - Reproducible random workloads checked against a model
//! - Structural invariant checking of the stored tree
//!
//! # Design Principles
//!
//! 1. All I/O goes through `NodeStore` and can be simulated
//! 2. All randomness is seeded for reproducibility
//! 3. Faults can be injected at any I/O boundary
//! 4. Given the same seed, execution is identical
//!
//! # Usage
//!
//! ```
//! use bptree::simulation::{FaultConfig, Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345).with_fault_config(FaultConfig::low_faults());
//! let mut sim = Simulator::new(config);
//! let result = sim.run(200);
//!
//! assert!(result.passed(), "{:?}", result.invariant_violations);
//! ```

mod invariants;
mod simulator;
mod storage;

pub use invariants::{InvariantChecker, InvariantViolation, ViolationKind, check};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig, simulate};
pub use storage::{FaultConfig, FaultInjectingStore, FaultStats, MemoryStore};
