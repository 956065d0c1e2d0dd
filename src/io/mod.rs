/*
 * Low-level I/O
 *
 * Just `pio`: raw x86 port I/O, the foundation every hardware driver in
 * `drivers/*` builds on. The teacher's device/fd/tty/vfs-file abstraction
 * layer (`device.rs`, `fd.rs`, `tty_device.rs`, `vfs_file.rs`) depended on
 * the VFS/TTY/shmem subsystems this core doesn't have; those files stay
 * on disk pending the final trim (see `DESIGN.md`) but are not part of
 * this tree.
 */

pub mod pio;

pub use pio::{Io, Pio, ReadOnly};
