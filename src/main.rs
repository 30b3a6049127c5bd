//! Corten Kernel binary entry
//!
//! The loader jumps every core to `_start` with the boot arguments in
//! x0-x5. The assembly below only assigns the per-core kernel stack and
//! falls through into the per-core kernel entry; everything after that is
//! the library's bootstrap sequence.

#![cfg_attr(target_arch = "aarch64", no_std)]
#![cfg_attr(target_arch = "aarch64", no_main)]

#[cfg(target_arch = "aarch64")]
mod bare {
    use core::panic::PanicInfo;
    use corten_kernel::kernel::boot::{self, BootArgs};
    use corten_kernel::{arch, kprintln};

    core::arch::global_asm!(
        ".section \".text.boot\"",
        ".global _start",
        "_start:",
        // Per-core kernel stack, keyed by core index.
        "mrs x9, mpidr_el1",
        "and x9, x9, #0xff",
        "add x9, x9, #1",
        "ldr x10, =KERNEL_STACK_ALLOC",
        "lsl x11, x9, #14",
        "add x10, x10, x11",
        "mov sp, x10",
        // Boot arguments are already in x0-x5.
        "b kernel_entry",
        // Exception vectors; the runtime kernel installs the real handlers.
        ".align 11",
        ".global arm_vector_table",
        "arm_vector_table:",
        ".rept 16",
        ".align 7",
        "b .",
        ".endr",
    );

    /// Per-core C-level entry, matching the loader contract: user-image
    /// physical bounds, physical-to-virtual offset, user entry point,
    /// device-tree address and size.
    #[no_mangle]
    pub extern "C" fn kernel_entry(
        ui_phys_start: usize,
        ui_phys_end: usize,
        pv_offset: usize,
        v_entry: usize,
        dtb_phys: usize,
        dtb_size: usize,
    ) -> ! {
        let args = BootArgs {
            ui_phys_start,
            ui_phys_end,
            pv_offset,
            v_entry,
            dtb_phys,
            dtb_size,
        };
        boot::init_kernel(&args)
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        kprintln!();
        kprintln!("KERNEL PANIC on core {}", arch::core_id());
        if let Some(location) = info.location() {
            kprintln!("at {}:{}", location.file(), location.line());
        }
        kprintln!("{}", info.message());
        arch::halt()
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn main() {
    // The kernel image only makes sense for the target hardware; building
    // the binary on a host is a no-op so the library and tests still work.
}
