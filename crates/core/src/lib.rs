//! IEC 60730 Class-B program counter self-test.
//!
//! Three probe routines are linked at widely separated addresses. The
//! verifier jumps to each one and checks that the address it reports is the
//! address it was placed at; a stuck or corrupted PC shows up as a FAIL.

#![cfg_attr(not(test), no_std)]

pub mod build_config;
pub mod fault;
pub mod placement;
pub mod probe;
pub mod verdict;
pub mod verifier;


/// Code address as seen by the program counter.
pub type Address = usize;

pub use placement::{FlashWindow, PlacementSource, PlacementTable, SeparationError, WindowError};
pub use probe::{FixedProbe, NativeProbe, Probe, ProbeId};
pub use verdict::{Verdict, PC_TEST_FAIL, PC_TEST_PASS};
pub use verifier::{run_pc_test, PcVerifier, ProbeReading};
