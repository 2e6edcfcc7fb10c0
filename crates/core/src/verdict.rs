use core::fmt;

/// Raw value returned to C safety monitors when the PC test passes.
pub const PC_TEST_PASS: i32 = 1;
/// Raw value returned to C safety monitors when the PC test fails.
pub const PC_TEST_FAIL: i32 = 0;

/// Outcome of one program counter test run.
///
/// The discriminants are part of the external contract: callers compare the
/// raw value against [`PC_TEST_PASS`] / [`PC_TEST_FAIL`], not truthiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[repr(i32)]
pub enum Verdict {
    Fail = PC_TEST_FAIL,
    Pass = PC_TEST_PASS,
}

impl Verdict {
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            PC_TEST_PASS => Some(Verdict::Pass),
            PC_TEST_FAIL => Some(Verdict::Fail),
            _ => None,
        }
    }

    pub const fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}
