/*
 * Legacy 8259 PIC Pair
 *
 * Grounded in the teacher's `drivers/system/pic.rs` and `arch/x86_64/
 * peripheral/pic.rs` (both near-duplicates of the same remap sequence).
 * Remaps the pair to a configurable base vector (spec default `0x30`,
 * `config::PIC_IRQ_BASE` — the teacher hard-codes `0x20`), cascades the
 * slave through IRQ2, and detects spurious IRQ7/IRQ15 by reading the
 * in-service register instead of blindly trusting the vector.
 */

use crate::error::{KernelError, KernelResult};
use crate::io::pio::{Io, Pio};

use super::{IntCtlDriver, SpuriousCheck};

const MASTER_CMD: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_CMD: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;

const OCW3_READ_ISR: u8 = 0x0B;
const PIC_EOI: u8 = 0x20;

pub struct Pic8259 {
    base_vector: u8,
}

impl Pic8259 {
    /// Remaps both controllers to `base_vector`/`base_vector + 8` and
    /// masks every line except the cascade (IRQ2) until drivers opt in.
    pub fn new(base_vector: u8) -> Self {
        let mut master_cmd = Pio::<u8>::new(MASTER_CMD);
        let mut master_data = Pio::<u8>::new(MASTER_DATA);
        let mut slave_cmd = Pio::<u8>::new(SLAVE_CMD);
        let mut slave_data = Pio::<u8>::new(SLAVE_DATA);

        unsafe {
            master_cmd.write(ICW1_INIT | ICW1_ICW4);
            io_wait();
            slave_cmd.write(ICW1_INIT | ICW1_ICW4);
            io_wait();

            master_data.write(base_vector);
            io_wait();
            slave_data.write(base_vector + 8);
            io_wait();

            master_data.write(1 << 2); // slave on IRQ2
            io_wait();
            slave_data.write(2); // slave's cascade identity
            io_wait();

            master_data.write(ICW4_8086);
            io_wait();
            slave_data.write(ICW4_8086);
            io_wait();

            // Mask everything except the cascade line initially.
            master_data.write(0b1111_1011);
            slave_data.write(0b1111_1111);
        }

        log::info!(
            "PIC remapped: master -> 0x{:02X}, slave -> 0x{:02X}",
            base_vector,
            base_vector + 8
        );

        Self { base_vector }
    }

    fn read_isr(&self, secondary: bool) -> u8 {
        let cmd_port = if secondary { SLAVE_CMD } else { MASTER_CMD };
        let mut cmd = Pio::<u8>::new(cmd_port);
        unsafe {
            cmd.write(OCW3_READ_ISR);
        }
        cmd.read()
    }
}

impl IntCtlDriver for Pic8259 {
    fn set_mask(&self, irq: u8, enabled: bool) -> KernelResult<()> {
        if irq > 15 {
            return Err(KernelError::OutOfBound);
        }
        let (port, bit) = if irq < 8 {
            (MASTER_DATA, irq)
        } else {
            (SLAVE_DATA, irq - 8)
        };
        let mut data = Pio::<u8>::new(port);
        let mut value = data.read();
        if enabled {
            value &= !(1 << bit);
        } else {
            value |= 1 << bit;
        }
        unsafe {
            data.write(value);
        }
        Ok(())
    }

    fn eoi(&self, irq: u8) -> KernelResult<()> {
        if irq > 15 {
            return Err(KernelError::OutOfBound);
        }
        let mut master_cmd = Pio::<u8>::new(MASTER_CMD);
        let mut slave_cmd = Pio::<u8>::new(SLAVE_CMD);
        unsafe {
            if irq >= 8 {
                slave_cmd.write(PIC_EOI);
            }
            master_cmd.write(PIC_EOI);
        }
        Ok(())
    }

    fn handle_spurious(&self, vector: u8) -> KernelResult<SpuriousCheck> {
        let irq = vector.wrapping_sub(self.base_vector);
        if irq == 7 {
            // Spurious master IRQ7: bit 7 of the master ISR is clear.
            if self.read_isr(false) & 0x80 == 0 {
                return Ok(SpuriousCheck::Spurious);
            }
        } else if irq == 15 {
            if self.read_isr(true) & 0x80 == 0 {
                // Still must EOI the master for the (non-spurious-on-master)
                // cascade signal, but the slave's own spurious IRQ15 is not
                // regular work.
                let mut master_cmd = Pio::<u8>::new(MASTER_CMD);
                unsafe {
                    master_cmd.write(PIC_EOI);
                }
                return Ok(SpuriousCheck::Spurious);
            }
        }
        Ok(SpuriousCheck::Regular)
    }

    fn irq_to_vector(&self, irq: u8) -> Option<u8> {
        if irq > 15 {
            None
        } else {
            Some(self.base_vector + irq)
        }
    }

    fn name(&self) -> &'static str {
        "8259 PIC"
    }
}

/// A handful of `out 0x80, al` writes give the (ancient, slow) hardware
/// time to latch the previous command before the next one arrives.
fn io_wait() {
    let mut port = Pio::<u8>::new(0x80);
    unsafe {
        port.write(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_to_vector_respects_base() {
        let pic = Pic8259 { base_vector: 0x30 };
        assert_eq!(pic.irq_to_vector(0), Some(0x30));
        assert_eq!(pic.irq_to_vector(15), Some(0x3F));
        assert_eq!(pic.irq_to_vector(16), None);
    }
}
