//! Address probes.
//!
//! Each native probe is a tiny exported routine that returns the address it
//! was linked at. The verifier jumps to all three and compares what comes
//! back against the placement table.

use core::fmt;
use core::hint::black_box;

use crate::Address;

/// Anything that can report "where am I" at run time.
pub trait Probe {
    fn self_address(&self) -> Address;
}

impl<P: Probe + ?Sized> Probe for &P {
    fn self_address(&self) -> Address {
        (**self).self_address()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProbeId {
    One,
    Two,
    Three,
}

impl ProbeId {
    pub const ALL: [ProbeId; 3] = [ProbeId::One, ProbeId::Two, ProbeId::Three];

    /// Zero-based slot in the placement table.
    pub const fn index(self) -> usize {
        match self {
            ProbeId::One => 0,
            ProbeId::Two => 1,
            ProbeId::Three => 2,
        }
    }

    /// One-based probe number, as used in symbol and section names.
    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            ProbeId::One => "ssl_test_pc_function1",
            ProbeId::Two => "ssl_test_pc_function2",
            ProbeId::Three => "ssl_test_pc_function3",
        }
    }

    pub const fn section(self) -> &'static str {
        match self {
            ProbeId::One => ".ssl_test_pc_function1",
            ProbeId::Two => ".ssl_test_pc_function2",
            ProbeId::Three => ".ssl_test_pc_function3",
        }
    }

    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.symbol() == name)
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe {}", self.number())
    }
}

/// Strips the Thumb interworking bit so the value matches the linked
/// instruction address.
#[inline(always)]
pub const fn code_address(raw: usize) -> Address {
    if cfg!(target_arch = "arm") {
        raw & !1
    } else {
        raw
    }
}

type ProbeFn = extern "C" fn() -> Address;

#[no_mangle]
#[inline(never)]
#[cfg_attr(feature = "fixed-placement", link_section = ".ssl_test_pc_function1")]
pub extern "C" fn ssl_test_pc_function1() -> Address {
    code_address(black_box(ssl_test_pc_function1 as ProbeFn) as usize)
}

#[no_mangle]
#[inline(never)]
#[cfg_attr(feature = "fixed-placement", link_section = ".ssl_test_pc_function2")]
pub extern "C" fn ssl_test_pc_function2() -> Address {
    code_address(black_box(ssl_test_pc_function2 as ProbeFn) as usize)
}

#[no_mangle]
#[inline(never)]
#[cfg_attr(feature = "fixed-placement", link_section = ".ssl_test_pc_function3")]
pub extern "C" fn ssl_test_pc_function3() -> Address {
    code_address(black_box(ssl_test_pc_function3 as ProbeFn) as usize)
}

/// One of the three exported probe routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeProbe {
    id: ProbeId,
}

pub const NATIVE_PROBES: [NativeProbe; 3] = [
    NativeProbe::new(ProbeId::One),
    NativeProbe::new(ProbeId::Two),
    NativeProbe::new(ProbeId::Three),
];

impl NativeProbe {
    pub const fn new(id: ProbeId) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> ProbeId {
        self.id
    }

    fn entry(&self) -> ProbeFn {
        match self.id {
            ProbeId::One => ssl_test_pc_function1,
            ProbeId::Two => ssl_test_pc_function2,
            ProbeId::Three => ssl_test_pc_function3,
        }
    }

    /// Address the linker gave this probe, read without executing it.
    pub fn linked_address(&self) -> Address {
        code_address(self.entry() as usize)
    }
}

impl Probe for NativeProbe {
    fn self_address(&self) -> Address {
        // Call through an opaque pointer so the jump really happens.
        let entry = black_box(self.entry());
        entry()
    }
}

/// A probe that always reports the same address. Used to model a target
/// whose placement is known but not executable on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe(pub Address);

impl Probe for FixedProbe {
    fn self_address(&self) -> Address {
        self.0
    }
}
