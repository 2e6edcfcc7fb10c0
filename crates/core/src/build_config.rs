//! Build-time placement configuration.
//!
//! Firmware builds that pin the probes with a linker script pass the same
//! addresses through the environment, so the table is a constant in flash
//! rather than something computed at run time.

use crate::Address;

pub const PROBE1_ADDR_ENV: &str = "CLASSB_PC_PROBE1_ADDR";
pub const PROBE2_ADDR_ENV: &str = "CLASSB_PC_PROBE2_ADDR";
pub const PROBE3_ADDR_ENV: &str = "CLASSB_PC_PROBE3_ADDR";

/// Probe addresses fixed by the build, if any.
pub const PROBE_ADDRESSES: Option<[Address; 3]> = parse_table(
    option_env!("CLASSB_PC_PROBE1_ADDR"),
    option_env!("CLASSB_PC_PROBE2_ADDR"),
    option_env!("CLASSB_PC_PROBE3_ADDR"),
);

pub const fn parse_table(
    first: Option<&str>,
    second: Option<&str>,
    third: Option<&str>,
) -> Option<[Address; 3]> {
    match (first, second, third) {
        (Some(a), Some(b), Some(c)) => {
            Some([parse_address(a), parse_address(b), parse_address(c)])
        }
        (None, None, None) => None,
        _ => panic!("CLASSB_PC_PROBE1_ADDR, _2_ADDR and _3_ADDR must be set together"),
    }
}

/// Like [`try_parse_address`] but fails the build on malformed input.
pub const fn parse_address(value: &str) -> Address {
    match try_parse_address(value) {
        Some(address) => address,
        None => panic!("Failed to parse probe address from configuration"),
    }
}

/// Parses `0x`-prefixed hexadecimal or plain decimal, allowing `_`
/// separators.
pub const fn try_parse_address(value: &str) -> Option<Address> {
    let bytes = value.as_bytes();
    let hex = bytes.len() > 2 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X');
    let (radix, mut i): (Address, usize) = if hex {
        (16, 2)
    } else {
        (10, 0)
    };

    let mut seen_digit = false;
    let mut acc: Address = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        i += 1;
        if byte == b'_' {
            continue;
        }
        let digit = match byte {
            b'0'..=b'9' => (byte - b'0') as Address,
            b'a'..=b'f' if radix == 16 => (byte - b'a' + 10) as Address,
            b'A'..=b'F' if radix == 16 => (byte - b'A' + 10) as Address,
            _ => return None,
        };
        acc = match acc.checked_mul(radix) {
            Some(shifted) => match shifted.checked_add(digit) {
                Some(next) => next,
                None => return None,
            },
            None => return None,
        };
        seen_digit = true;
    }

    if seen_digit {
        Some(acc)
    } else {
        None
    }
}
