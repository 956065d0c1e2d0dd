/*
 * ACPI Input (spec §6 "ACPI input")
 *
 * Read-only consumer of RSDP/RSDT/XSDT/FADT/MADT tables, used only at
 * init to discover how many CPUs are present and whether an IO-APIC is
 * available (informing the PIC-vs-APIC choice in `drivers::intctl`).
 *
 * Per `DESIGN.md`'s Open Question resolution, every table is copied into
 * an owned `AcpiInfo` during `init` rather than kept as raw pointers into
 * firmware-owned memory — the tables live in identity-mapped low memory
 * that paging may later remap or reclaim, so nothing here may outlive
 * `init`. The teacher has no ACPI consumer; this module is new code
 * grounded directly in spec §6's table layout and the Intel ACPI spec's
 * well-known structure layouts.
 */

use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};

const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";

#[repr(C, packed)]
struct RsdpV1 {
    signature: [u8; 8],
    checksum: u8,
    oem_id: [u8; 6],
    revision: u8,
    rsdt_address: u32,
}

#[repr(C, packed)]
struct RsdpV2 {
    v1: RsdpV1,
    length: u32,
    xsdt_address: u64,
    extended_checksum: u8,
    reserved: [u8; 3],
}

#[repr(C, packed)]
struct SdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

/// MADT entry type 0: processor local APIC.
const MADT_LOCAL_APIC: u8 = 0;
/// MADT entry type 1: IO APIC.
const MADT_IO_APIC: u8 = 1;
/// MADT entry type 2: interrupt source override.
const MADT_INTERRUPT_OVERRIDE: u8 = 2;
/// MADT entry type 4: non-maskable interrupt source.
const MADT_NMI_SOURCE: u8 = 4;

/// Flag bit in a MADT local-APIC entry meaning the CPU is usable.
const LOCAL_APIC_ENABLED: u32 = 1 << 0;

#[derive(Debug, Clone, Copy)]
pub struct InterruptOverride {
    pub source_irq: u8,
    pub global_system_interrupt: u32,
}

/// Owned snapshot of everything the core needs from ACPI, valid for the
/// remainder of boot and beyond (spec §6 Design Notes lifetime rule).
#[derive(Debug, Default, Clone)]
pub struct AcpiInfo {
    /// One entry per usable CPU, in MADT order; entry 0 is not
    /// necessarily the BSP (the BSP is whichever core is running when
    /// `cpu::register_cpu` is first called).
    pub local_apic_ids: Vec<u8>,
    /// Physical base address of every CPU's Local APIC MMIO page (the
    /// MADT's fixed header field, not a per-entry value — identical on
    /// every CPU on any platform this core targets).
    pub local_apic_address: u32,
    pub io_apic_address: Option<u32>,
    pub io_apic_gsi_base: u32,
    pub interrupt_overrides: Vec<InterruptOverride>,
    pub nmi_lint: Vec<(u8, u8)>, // (local apic id, LINT#)
}

fn sum_bytes(base: *const u8, len: usize) -> u8 {
    let mut sum: u8 = 0;
    for i in 0..len {
        sum = sum.wrapping_add(unsafe { *base.add(i) });
    }
    sum
}

/// Scans the BIOS read-only area (0xE0000..=0xFFFFF) on 16-byte
/// boundaries for the RSDP signature, validating its checksum.
unsafe fn find_rsdp() -> Option<*const RsdpV1> {
    let mut addr = 0xE0000usize;
    while addr < 0xFFFFF {
        let candidate = addr as *const u8;
        if unsafe { core::slice::from_raw_parts(candidate, 8) } == RSDP_SIGNATURE {
            if sum_bytes(candidate, core::mem::size_of::<RsdpV1>()) == 0 {
                return Some(candidate as *const RsdpV1);
            }
        }
        addr += 16;
    }
    None
}

unsafe fn validate_sdt(header: *const SdtHeader) -> KernelResult<usize> {
    let length = unsafe { core::ptr::addr_of!((*header).length).read_unaligned() } as usize;
    if sum_bytes(header as *const u8, length) != 0 {
        return Err(KernelError::ChecksumFailed);
    }
    Ok(length)
}

unsafe fn signature_of(header: *const SdtHeader) -> [u8; 4] {
    unsafe { core::ptr::addr_of!((*header).signature).read_unaligned() }
}

/// Walks the RSDT/XSDT entry list, calling `visit` with each sub-table's
/// header pointer.
unsafe fn for_each_table(root: *const SdtHeader, entry_is_64bit: bool, mut visit: impl FnMut(*const SdtHeader)) {
    let length = unsafe { core::ptr::addr_of!((*root).length).read_unaligned() } as usize;
    let header_size = core::mem::size_of::<SdtHeader>();
    let entries_bytes = length.saturating_sub(header_size);
    let entry_size = if entry_is_64bit { 8 } else { 4 };
    let entry_count = entries_bytes / entry_size;
    let entries_base = (root as *const u8).wrapping_add(header_size);

    for i in 0..entry_count {
        let table_addr = if entry_is_64bit {
            let ptr = entries_base.wrapping_add(i * 8) as *const u64;
            unsafe { ptr.read_unaligned() as usize }
        } else {
            let ptr = entries_base.wrapping_add(i * 4) as *const u32;
            unsafe { ptr.read_unaligned() as usize }
        };
        visit(table_addr as *const SdtHeader);
    }
}

unsafe fn parse_madt(madt: *const SdtHeader, info: &mut AcpiInfo) {
    let length = unsafe { core::ptr::addr_of!((*madt).length).read_unaligned() } as usize;
    let body = (madt as *const u8).wrapping_add(core::mem::size_of::<SdtHeader>());
    // Local-APIC-address (u32) + flags (u32) precede the entry list.
    info.local_apic_address = unsafe { (body as *const u32).read_unaligned() };
    let entries_offset = 8;
    let entries_base = body.wrapping_add(entries_offset);
    let entries_len = length.saturating_sub(core::mem::size_of::<SdtHeader>() + entries_offset);

    let mut off = 0usize;
    while off + 2 <= entries_len {
        let entry_type = unsafe { *entries_base.add(off) };
        let entry_len = unsafe { *entries_base.add(off + 1) } as usize;
        if entry_len < 2 || off + entry_len > entries_len {
            break;
        }
        let entry = entries_base.wrapping_add(off);
        match entry_type {
            t if t == MADT_LOCAL_APIC => {
                let apic_id = unsafe { *entry.add(3) };
                let flags = unsafe { (entry.add(4) as *const u32).read_unaligned() };
                if flags & LOCAL_APIC_ENABLED != 0 {
                    info.local_apic_ids.push(apic_id);
                }
            }
            t if t == MADT_IO_APIC => {
                let addr = unsafe { (entry.add(4) as *const u32).read_unaligned() };
                let gsi_base = unsafe { (entry.add(8) as *const u32).read_unaligned() };
                info.io_apic_address = Some(addr);
                info.io_apic_gsi_base = gsi_base;
            }
            t if t == MADT_INTERRUPT_OVERRIDE => {
                let source_irq = unsafe { *entry.add(3) };
                let gsi = unsafe { (entry.add(4) as *const u32).read_unaligned() };
                info.interrupt_overrides.push(InterruptOverride {
                    source_irq,
                    global_system_interrupt: gsi,
                });
            }
            t if t == MADT_NMI_SOURCE => {
                let apic_id = unsafe { *entry.add(3) };
                let lint = unsafe { *entry.add(5) };
                info.nmi_lint.push((apic_id, lint));
            }
            _ => {}
        }
        off += entry_len;
    }
}

/// Locates RSDP → RSDT/XSDT → FADT + MADT, copying out CPU/IO-APIC
/// information. Returns `checksum_failed` if any table's checksum does
/// not sum to zero over its declared length.
pub fn init() -> KernelResult<AcpiInfo> {
    let rsdp = unsafe { find_rsdp() }.ok_or(KernelError::NoSuchId)?;
    let revision = unsafe { core::ptr::addr_of!((*rsdp).revision).read_unaligned() };

    let (root_header, entry_is_64bit) = if revision >= 2 {
        let v2 = rsdp as *const RsdpV2;
        if sum_bytes(v2 as *const u8, core::mem::size_of::<RsdpV2>()) != 0 {
            return Err(KernelError::ChecksumFailed);
        }
        let xsdt_addr = unsafe { core::ptr::addr_of!((*v2).xsdt_address).read_unaligned() } as usize;
        (xsdt_addr as *const SdtHeader, true)
    } else {
        let rsdt_addr = unsafe { core::ptr::addr_of!((*rsdp).rsdt_address).read_unaligned() } as usize;
        (rsdt_addr as *const SdtHeader, false)
    };

    unsafe { validate_sdt(root_header) }?;

    let mut info = AcpiInfo::default();
    let mut madt_found = false;
    unsafe {
        for_each_table(root_header, entry_is_64bit, |table| {
            if table.is_null() {
                return;
            }
            if validate_sdt(table).is_err() {
                return;
            }
            if signature_of(table) == *b"APIC" {
                parse_madt(table, &mut info);
                madt_found = true;
            }
            // FADT ("FACP") is consumed only for its presence today; the
            // core has no ACPI power-management feature in scope.
        });
    }

    if !madt_found {
        return Err(KernelError::NoSuchId);
    }
    Ok(info)
}
