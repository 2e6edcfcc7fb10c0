//! Placement table: where each probe is expected to live.

use crate::build_config;
use crate::probe::{NativeProbe, ProbeId, NATIVE_PROBES};
use crate::Address;

/// Every odd address bit set.
pub const ODD_BITS: Address = 0xAAAA_AAAA_AAAA_AAAA_u64 as Address;
/// Every even address bit set.
pub const EVEN_BITS: Address = 0x5555_5555_5555_5555_u64 as Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("flash window size {0:#x} is not a power of two")]
    SizeNotPowerOfTwo(Address),
    #[error("alignment {0:#x} is not a power of two")]
    AlignmentNotPowerOfTwo(Address),
    #[error("alignment {alignment:#x} must be smaller than the window size {size:#x}")]
    AlignmentTooLarge { alignment: Address, size: Address },
    #[error("flash window base {base:#x} is not aligned to its size {size:#x}")]
    BaseNotAligned { base: Address, size: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeparationError {
    #[error("{first} and {second} share the address {address:#x}")]
    Duplicate {
        first: ProbeId,
        second: ProbeId,
        address: Address,
    },
    #[error("probe 1 must have every exercised bit low, found {bits:#x}")]
    BaseProbeHasMaskBits { bits: Address },
    #[error("probes 2 and 3 both set the bits {bits:#x}")]
    OverlappingPatterns { bits: Address },
    #[error("no probe toggles the bits {missing:#x}")]
    IncompleteCoverage { missing: Address },
    #[error("{probe} differs from probe 1 outside the exercised bits")]
    OutsideMask { probe: ProbeId },
}

/// The slice of flash whose PC bits the test exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlashWindow {
    base: Address,
    size: Address,
    alignment: Address,
}

impl FlashWindow {
    /// PIC32MX parts with 512 KiB of program flash at 0x9D00_0000.
    pub const PIC32MX_512K: FlashWindow = FlashWindow {
        base: 0x9D00_0000,
        size: 0x8_0000,
        alignment: 4,
    };

    pub const fn new(
        base: Address,
        size: Address,
        alignment: Address,
    ) -> Result<Self, WindowError> {
        if !size.is_power_of_two() {
            return Err(WindowError::SizeNotPowerOfTwo(size));
        }
        if !alignment.is_power_of_two() {
            return Err(WindowError::AlignmentNotPowerOfTwo(alignment));
        }
        if alignment >= size {
            return Err(WindowError::AlignmentTooLarge { alignment, size });
        }
        if base & (size - 1) != 0 {
            return Err(WindowError::BaseNotAligned { base, size });
        }
        Ok(Self {
            base,
            size,
            alignment,
        })
    }

    pub const fn base(&self) -> Address {
        self.base
    }

    pub const fn size(&self) -> Address {
        self.size
    }

    pub const fn alignment(&self) -> Address {
        self.alignment
    }

    /// Address bits inside the window that a probe address may toggle.
    pub const fn mask(&self) -> Address {
        (self.size - 1) & !(self.alignment - 1)
    }

    pub const fn contains(&self, address: Address) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

/// Where a placement table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PlacementSource {
    /// Explicit addresses or derived from a flash window.
    Configured,
    /// Baked in through `CLASSB_PC_PROBE{1,2,3}_ADDR` at build time.
    CompileTime,
    /// Read back from the probes' own link addresses.
    Linked,
}

/// Expected address for each of the three probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacementTable {
    addresses: [Address; 3],
}

impl PlacementTable {
    /// Reference layout for PIC32MX 512 KiB parts.
    pub const PIC32MX_512K: PlacementTable =
        PlacementTable::new([0x9D00_0000, 0x9D02_AAA8, 0x9D05_5554]);

    pub const fn new(addresses: [Address; 3]) -> Self {
        Self { addresses }
    }

    /// Probe 1 at the window base, probe 2 with every odd exercised bit set,
    /// probe 3 with every even exercised bit set.
    pub const fn from_window(window: &FlashWindow) -> Self {
        let mask = window.mask();
        Self::new([
            window.base,
            window.base | (ODD_BITS & mask),
            window.base | (EVEN_BITS & mask),
        ])
    }

    /// Table read back from where the native probes actually ended up.
    pub fn linked() -> Self {
        Self::new(NATIVE_PROBES.map(|probe: NativeProbe| probe.linked_address()))
    }

    /// Table fixed at build time, if the build configured one.
    pub const fn compile_time() -> Option<Self> {
        match build_config::PROBE_ADDRESSES {
            Some(addresses) => Some(Self::new(addresses)),
            None => None,
        }
    }

    /// The table `run_pc_test` uses: the build-time table when configured,
    /// otherwise the linked addresses.
    pub fn default_for_build() -> (Self, PlacementSource) {
        match Self::compile_time() {
            Some(table) => (table, PlacementSource::CompileTime),
            None => (Self::linked(), PlacementSource::Linked),
        }
    }

    pub const fn expected(&self, id: ProbeId) -> Address {
        self.addresses[id.index()]
    }

    pub const fn addresses(&self) -> [Address; 3] {
        self.addresses
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProbeId, Address)> + '_ {
        ProbeId::ALL.into_iter().map(|id| (id, self.expected(id)))
    }

    /// Checks that the three addresses toggle disjoint, complete bit sets
    /// within `mask` and agree everywhere outside it.
    pub fn check_separation(&self, mask: Address) -> Result<(), SeparationError> {
        for (i, first) in ProbeId::ALL.into_iter().enumerate() {
            for second in ProbeId::ALL.into_iter().skip(i + 1) {
                let address = self.expected(first);
                if address == self.expected(second) {
                    return Err(SeparationError::Duplicate {
                        first,
                        second,
                        address,
                    });
                }
            }
        }

        let [base, odd, even] = self.addresses;

        for probe in [ProbeId::Two, ProbeId::Three] {
            if (self.expected(probe) ^ base) & !mask != 0 {
                return Err(SeparationError::OutsideMask { probe });
            }
        }

        let bits = base & mask;
        if bits != 0 {
            return Err(SeparationError::BaseProbeHasMaskBits { bits });
        }

        let bits = odd & even & mask;
        if bits != 0 {
            return Err(SeparationError::OverlappingPatterns { bits });
        }

        let missing = mask & !(odd | even);
        if missing != 0 {
            return Err(SeparationError::IncompleteCoverage { missing });
        }

        Ok(())
    }
}

impl Default for PlacementTable {
    fn default() -> Self {
        Self::default_for_build().0
    }
}
