//! Program counter fault model.
//!
//! Lets host tooling and tests inject the faults the PC test is meant to
//! catch and measure how many of them a placement table detects.

use crate::placement::PlacementTable;
use crate::probe::{FixedProbe, Probe, ProbeId};
use crate::verifier::PcVerifier;
use crate::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum PcFault {
    /// One PC bit always reads 0.
    StuckAtZero(u32),
    /// One PC bit always reads 1.
    StuckAtOne(u32),
    /// The PC always reads the same value.
    Frozen(Address),
    /// A jump to `from` lands on `to` instead.
    Aliased { from: Address, to: Address },
}

impl PcFault {
    /// The address observed when the intended target is `address`.
    pub const fn apply(self, address: Address) -> Address {
        match self {
            PcFault::StuckAtZero(bit) => address & !bit_mask(bit),
            PcFault::StuckAtOne(bit) => address | bit_mask(bit),
            PcFault::Frozen(value) => value,
            PcFault::Aliased { from, to } => {
                if address == from {
                    to
                } else {
                    address
                }
            }
        }
    }
}

const fn bit_mask(bit: u32) -> Address {
    match (1 as Address).checked_shl(bit) {
        Some(mask) => mask,
        None => 0,
    }
}

/// Wraps a probe and reports what a faulty PC would have fetched.
#[derive(Debug, Clone, Copy)]
pub struct FaultyProbe<P> {
    inner: P,
    fault: PcFault,
}

impl<P: Probe> FaultyProbe<P> {
    pub const fn new(inner: P, fault: PcFault) -> Self {
        Self { inner, fault }
    }

    pub const fn fault(&self) -> PcFault {
        self.fault
    }
}

impl<P: Probe> Probe for FaultyProbe<P> {
    fn self_address(&self) -> Address {
        self.fault.apply(self.inner.self_address())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CoverageReport {
    pub injected: usize,
    pub detected: usize,
    pub first_escape: Option<PcFault>,
}

impl CoverageReport {
    pub const fn escaped(&self) -> usize {
        self.injected - self.detected
    }

    pub const fn is_complete(&self) -> bool {
        self.injected == self.detected
    }

    pub fn ratio(&self) -> f64 {
        if self.injected == 0 {
            return 1.0;
        }
        self.detected as f64 / self.injected as f64
    }

    fn record(&mut self, fault: PcFault, detected: bool) {
        self.injected += 1;
        if detected {
            self.detected += 1;
        } else if self.first_escape.is_none() {
            self.first_escape = Some(fault);
        }
    }
}

/// Runs the verifier against `table` with every stuck-at fault on the
/// bits of `mask`, plus a frozen PC at each table address.
pub fn fault_coverage(table: &PlacementTable, mask: Address) -> CoverageReport {
    let mut report = CoverageReport::default();

    for bit in 0..Address::BITS {
        if mask & bit_mask(bit) == 0 {
            continue;
        }
        for fault in [PcFault::StuckAtZero(bit), PcFault::StuckAtOne(bit)] {
            report.record(fault, detects(table, fault));
        }
    }

    for (_, address) in table.iter() {
        let fault = PcFault::Frozen(address);
        report.record(fault, detects(table, fault));
    }

    report
}

/// Whether the verifier fails when every jump suffers `fault`.
pub fn detects(table: &PlacementTable, fault: PcFault) -> bool {
    let probes = ProbeId::ALL
        .map(|id| FaultyProbe::new(FixedProbe(table.expected(id)), fault));
    !PcVerifier::new(probes, *table).run_pc_test().is_pass()
}
