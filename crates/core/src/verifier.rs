use crate::placement::PlacementTable;
use crate::probe::{NativeProbe, Probe, ProbeId, NATIVE_PROBES};
use crate::verdict::Verdict;
use crate::Address;

/// What one probe reported compared with where it should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeReading {
    pub id: ProbeId,
    pub expected: Address,
    pub observed: Address,
}

impl ProbeReading {
    pub const fn matches(&self) -> bool {
        self.expected == self.observed
    }
}

/// Jumps to each probe and checks it landed where the placement table says.
///
/// Holds only read-only data, so a single instance can be shared by a
/// periodic monitor and called as often as needed.
#[derive(Debug, Clone)]
pub struct PcVerifier<P: Probe = NativeProbe> {
    probes: [P; 3],
    table: PlacementTable,
}

impl PcVerifier<NativeProbe> {
    pub const fn native(table: PlacementTable) -> Self {
        Self::new(NATIVE_PROBES, table)
    }
}

impl<P: Probe> PcVerifier<P> {
    pub const fn new(probes: [P; 3], table: PlacementTable) -> Self {
        Self { probes, table }
    }

    pub fn table(&self) -> &PlacementTable {
        &self.table
    }

    pub fn probe(&self, id: ProbeId) -> &P {
        &self.probes[id.index()]
    }

    /// PASS only if every probe reports its expected address. All three
    /// probes are always exercised.
    pub fn run_pc_test(&self) -> Verdict {
        let mut ok = true;
        for id in ProbeId::ALL {
            ok &= self.probe(id).self_address() == self.table.expected(id);
        }
        Verdict::from(ok)
    }

    /// Per-probe readings for host-side diagnostics.
    pub fn inspect(&self) -> [ProbeReading; 3] {
        ProbeId::ALL.map(|id| ProbeReading {
            id,
            expected: self.table.expected(id),
            observed: self.probe(id).self_address(),
        })
    }
}

/// Runs the PC test with the native probes and the build's default table.
pub fn run_pc_test() -> Verdict {
    PcVerifier::native(PlacementTable::default()).run_pc_test()
}

/// C entry point for safety monitors: returns `PC_TEST_PASS` or
/// `PC_TEST_FAIL`.
#[no_mangle]
pub extern "C" fn ssl_32bits_family_pc_test() -> i32 {
    run_pc_test().as_raw()
}
