#![no_main]
#![no_std]

use classb_pctest::{PcVerifier, PlacementTable, Verdict};
use cortex_m::peripheral::SCB;
use cortex_m_rt::entry;
use panic_halt as _;

// USART1_DR on STM32F103 (SR sits at 0x4001_3800)
const UART_TX: *mut u8 = 0x4001_3804 as *mut u8;

// Roughly one second at the 8 MHz reset clock.
const TEST_PERIOD_CYCLES: u32 = 8_000_000;

const PLACEMENT: PlacementTable = match PlacementTable::compile_time() {
    Some(table) => table,
    None => panic!("probe addresses missing: set CLASSB_PC_PROBE1_ADDR to CLASSB_PC_PROBE3_ADDR"),
};

fn write(message: &str) {
    for byte in message.bytes() {
        unsafe {
            core::ptr::write_volatile(UART_TX, byte);
        }
    }
}

#[entry]
fn main() -> ! {
    let verifier = PcVerifier::native(PLACEMENT);

    loop {
        match verifier.run_pc_test() {
            Verdict::Pass => write("PC OK\n"),
            Verdict::Fail => {
                // A PC we cannot trust gets a reset, not a retry.
                write("PC FAIL\n");
                SCB::sys_reset();
            }
        }

        cortex_m::asm::delay(TEST_PERIOD_CYCLES);
    }
}
