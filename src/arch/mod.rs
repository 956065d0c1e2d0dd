/*
 * Architecture Entry Point (spec §2, i386)
 *
 * Replaces the teacher's `target_arch = "x86_64"` gate and BOOTBOOT-era
 * `kstart` (framebuffer init + `loop {}`) with the single i386 target
 * this core now builds for. `x86::init` (see `x86::mod::init`) is the
 * real bring-up sequence; `arch/x86_64` stays on disk pending the final
 * trim (see `DESIGN.md`) but is no longer part of this tree.
 */

pub mod x86;
