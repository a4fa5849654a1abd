/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the AMBT53 emulator library: bus-visible models of
    the co-processor and its companion peripherals for host-side tests.

--*/

mod ambt53;
mod delay;
mod elf;
mod gpio;
mod mailbox;
mod memory;
mod scpm;

pub use ambt53::{EmulatedAmbt53, Transaction};
pub use delay::TickDelay;
pub use elf::ElfBuilder;
pub use gpio::EmulatedGpio;
pub use mailbox::MailboxModel;
pub use memory::{SparseMemory, UNINITIALIZED_BYTE};
pub use scpm::EmulatedScpm;
