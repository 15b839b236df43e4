//! # Interrupt Vector Table
//!
//! The fixed ordered sequence of entry points the processor consults on
//! reset and interrupt, built as a const table literal: every slot starts
//! out as either the shared [`default_handler`] or a zeroed reserved slot,
//! and a module overrides exactly the slots it implements. There are no
//! weak symbols involved and no way to end up with an unpopulated slot for
//! an enabled interrupt source.
//!
//! Slot 0 holds the initial stack pointer and slot 1 the reset entry.
//! Slot [`CHECKSUM_SLOT`] is the image-checksum placeholder consumed by
//! flash tooling; it and the other reserved slots must stay zero in the
//! compiled table.

use core::hint::spin_loop;

/// Device interrupt source count; the table is 16 system slots plus these.
pub const IRQ_COUNT: usize = 32;

/// Total vector table slot count.
pub const VECTOR_COUNT: usize = 16 + IRQ_COUNT;

/// Slot holding the image checksum consumed by flash tooling; zero until
/// patched.
pub const CHECKSUM_SLOT: usize = 7;

/// System slots that must remain zero. [`CHECKSUM_SLOT`] is not among
/// them: it compiles to zero but flash tooling may patch it.
pub const RESERVED_SYSTEM_SLOTS: [usize; 8] = [4, 5, 6, 8, 9, 10, 12, 13];

/// Device slots (relative to the first IRQ slot) with no interrupt source
/// behind them.
pub const RESERVED_IRQ_SLOTS: [usize; 3] = [2, 6, 23];

/// An interrupt or exception entry point.
pub type Handler = unsafe extern "C" fn();

/// One vector table slot: a handler, or a raw word for the stack pointer,
/// the checksum placeholder and reserved slots.
#[derive(Copy, Clone)]
pub union Vector {
    handler: Handler,
    word: usize,
}

impl Vector {
    #[must_use]
    pub const fn handler(handler: Handler) -> Self {
        Self { handler }
    }

    #[must_use]
    pub const fn word(word: usize) -> Self {
        Self { word }
    }

    #[must_use]
    pub const fn reserved() -> Self {
        Self { word: 0 }
    }

    /// The slot's raw value; handler slots yield the handler address.
    #[must_use]
    pub fn raw(self) -> usize {
        // SAFETY: both variants are one pointer-sized word.
        unsafe { self.word }
    }
}

/// System exception slots a module may override.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    Nmi = 2,
    HardFault = 3,
    SvCall = 11,
    PendSv = 14,
    SysTick = 15,
}

/// Device interrupt slots, in the target's fixed order. The gaps (2, 6
/// and 23) are reserved sources.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    Spi0 = 0,
    Spi1 = 1,
    Uart0 = 3,
    Uart1 = 4,
    Uart2 = 5,
    I2c1 = 7,
    I2c0 = 8,
    Sct = 9,
    Mrt = 10,
    Cmp = 11,
    Wdt = 12,
    Bod = 13,
    Flash = 14,
    Wkt = 15,
    AdcSeqA = 16,
    AdcSeqB = 17,
    AdcThcmp = 18,
    AdcOvr = 19,
    Dma = 20,
    I2c2 = 21,
    I2c3 = 22,
    PinInt0 = 24,
    PinInt1 = 25,
    PinInt2 = 26,
    PinInt3 = 27,
    PinInt4 = 28,
    PinInt5 = 29,
    PinInt6 = 30,
    PinInt7 = 31,
}

/// Shared fallback for every interrupt source a module does not handle.
///
/// Halts forever; the watchdog is the recovery mechanism, and a debugger
/// observing a hung core beats undefined continuation.
///
/// # Safety
///
/// Must only run as an exception entry; it never returns to the caller.
pub unsafe extern "C" fn default_handler() {
    loop {
        spin_loop();
    }
}

const fn is_reserved_irq(slot: usize) -> bool {
    let mut i = 0;
    while i < RESERVED_IRQ_SLOTS.len() {
        if RESERVED_IRQ_SLOTS[i] == slot {
            return true;
        }
        i += 1;
    }
    false
}

/// The full vector table, placed at the lowest image address.
///
/// ```ignore
/// #[unsafe(link_section = ".isr_vector")]
/// #[used]
/// static VECTORS: VectorTable = VectorTable::new(STACK_TOP, reset_handler)
///     .with_interrupt(Interrupt::Uart0, uart0_handler);
/// ```
#[repr(transparent)]
pub struct VectorTable([Vector; VECTOR_COUNT]);

// SAFETY: read-only after link.
unsafe impl Sync for VectorTable {}

impl VectorTable {
    /// A fully populated table: stack pointer, reset entry, every fault
    /// and device slot bound to [`default_handler`], reserved slots zero.
    #[must_use]
    pub const fn new(initial_stack: usize, reset: Handler) -> Self {
        let mut slots = [Vector::reserved(); VECTOR_COUNT];
        slots[0] = Vector::word(initial_stack);
        slots[1] = Vector::handler(reset);
        slots[Exception::Nmi as usize] = Vector::handler(default_handler);
        slots[Exception::HardFault as usize] = Vector::handler(default_handler);
        slots[Exception::SvCall as usize] = Vector::handler(default_handler);
        slots[Exception::PendSv as usize] = Vector::handler(default_handler);
        slots[Exception::SysTick as usize] = Vector::handler(default_handler);

        let mut irq = 0;
        while irq < IRQ_COUNT {
            if !is_reserved_irq(irq) {
                slots[16 + irq] = Vector::handler(default_handler);
            }
            irq += 1;
        }
        Self(slots)
    }

    /// Override a system exception slot.
    #[must_use]
    pub const fn with_exception(mut self, exception: Exception, handler: Handler) -> Self {
        self.0[exception as usize] = Vector::handler(handler);
        self
    }

    /// Override a device interrupt slot.
    #[must_use]
    pub const fn with_interrupt(mut self, interrupt: Interrupt, handler: Handler) -> Self {
        self.0[16 + interrupt as usize] = Vector::handler(handler);
        self
    }

    #[must_use]
    pub const fn slots(&self) -> &[Vector; VECTOR_COUNT] {
        &self.0
    }

    /// Whether every reserved slot still holds zero. A nonzero reserved
    /// slot is undefined behavior for the target and must fail packaging
    /// validation, not be flashed.
    #[must_use]
    pub fn reserved_slots_are_zero(&self) -> bool {
        let mut ok = true;
        for slot in RESERVED_SYSTEM_SLOTS {
            ok &= self.0[slot].raw() == 0;
        }
        for slot in RESERVED_IRQ_SLOTS {
            ok &= self.0[16 + slot].raw() == 0;
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK_TOP: usize = 0x1000_8000;

    unsafe extern "C" fn reset_stub() {}
    unsafe extern "C" fn uart_stub() {}
    unsafe extern "C" fn fault_stub() {}

    #[test]
    fn stack_and_reset_slots_are_fixed() {
        let t = VectorTable::new(STACK_TOP, reset_stub);
        assert_eq!(t.slots()[0].raw(), STACK_TOP);
        assert_eq!(t.slots()[1].raw(), reset_stub as usize);

        // Independent of which interrupts get overridden.
        let t = t.with_interrupt(Interrupt::Uart0, uart_stub);
        assert_eq!(t.slots()[0].raw(), STACK_TOP);
        assert_eq!(t.slots()[1].raw(), reset_stub as usize);
    }

    #[test]
    fn undefined_sources_share_the_default_handler() {
        let t = VectorTable::new(STACK_TOP, reset_stub)
            .with_interrupt(Interrupt::Uart0, uart_stub);

        let default = default_handler as usize;
        assert_eq!(t.slots()[16 + Interrupt::Uart0 as usize].raw(), uart_stub as usize);
        for irq in 0..IRQ_COUNT {
            if irq == Interrupt::Uart0 as usize || RESERVED_IRQ_SLOTS.contains(&irq) {
                continue;
            }
            assert_eq!(t.slots()[16 + irq].raw(), default, "irq slot {irq}");
        }
    }

    #[test]
    fn faults_default_and_can_be_overridden() {
        let t = VectorTable::new(STACK_TOP, reset_stub);
        assert_eq!(
            t.slots()[Exception::HardFault as usize].raw(),
            default_handler as usize
        );

        let t = t.with_exception(Exception::HardFault, fault_stub);
        assert_eq!(
            t.slots()[Exception::HardFault as usize].raw(),
            fault_stub as usize
        );
        // The others keep the shared default.
        assert_eq!(t.slots()[Exception::Nmi as usize].raw(), default_handler as usize);
    }

    #[test]
    fn reserved_slots_stay_zero() {
        let t = VectorTable::new(STACK_TOP, reset_stub)
            .with_exception(Exception::SysTick, fault_stub)
            .with_interrupt(Interrupt::Dma, uart_stub);
        assert!(t.reserved_slots_are_zero());
        for slot in RESERVED_SYSTEM_SLOTS {
            assert_eq!(t.slots()[slot].raw(), 0, "system slot {slot}");
        }
        assert_eq!(t.slots()[CHECKSUM_SLOT].raw(), 0);
    }

    #[test]
    fn table_is_exactly_the_slot_array() {
        assert_eq!(
            size_of::<VectorTable>(),
            VECTOR_COUNT * size_of::<usize>()
        );
    }
}
