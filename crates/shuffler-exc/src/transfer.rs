//! The SEND and RECV phases of one round (§4.5.2, §4.5.3): lays out one
//! DMA buffer with one accelerator stride per participating unit, copies
//! slices to/from user-visible port buffers, and drives the transfer
//! through [`Dea`].

use shuffler_api::{Error, TransferDirection};
use shuffler_dea::{Dea, TransferToken};
use shuffler_kpr::{Port, Registry};
use shuffler_shs::Scheduler;

use crate::buffers::PortBuffers;

struct PlannedPort {
    port: Port,
    is_constant: bool,
}

/// Copies `naccs` units' worth of input (and, on the first round after load,
/// constant) data into a freshly acquired DMA buffer and submits it
/// MemToHw. Skips units whose stride would run past `nrounds` (the
/// boundary rule shared with RECV).
pub fn send(
    registry: &Registry,
    scheduler: &Scheduler,
    dea: &Dea,
    kernel_name: &str,
    id: u8,
    naccs: u32,
    round: usize,
    nrounds: usize,
    buffers: &PortBuffers,
) -> Result<(), Error> {
    let naccs = naccs as usize;
    let (mem_bytes, banks, constants_loaded, const_ports, input_ports) = registry.with_kernel(kernel_name, |k| {
        (
            k.mem_bytes,
            k.banks,
            k.constants_loaded,
            k.ports(shuffler_api::Direction::Constant).iter().cloned().collect::<Vec<_>>(),
            k.ports(shuffler_api::Direction::Input).iter().cloned().collect::<Vec<_>>(),
        )
    })?;
    let mem_per_bank = mem_bytes / banks;
    let need_constants = !const_ports.is_empty() && !constants_loaded;

    let mut ports = Vec::new();
    if need_constants {
        ports.extend(const_ports.iter().cloned().map(|port| PlannedPort { port, is_constant: true }));
    }
    ports.extend(input_ports.iter().cloned().map(|port| PlannedPort { port, is_constant: false }));

    if ports.is_empty() {
        // Only constants were pending and they are already resident:
        // arm the hardware with a zero-length transfer, then start it
        // entirely in software (§4.5.2).
        dea.with_transfer(0, |_buf, _phys| {})?;
        scheduler.hcs().regwrite(id, 2, 0, 0);
        return Ok(());
    }

    let nports = ports.len();
    let blksize = nports * (mem_per_bank / 4);
    let hw_off = ((id as usize) << 16) + if constants_loaded { const_ports.len() * mem_per_bank } else { 0 };

    dea.with_transfer(naccs * blksize * 4, |dma, phys| -> Result<(), Error> {
        for (p_idx, planned) in ports.iter().enumerate() {
            let size_slice = if planned.is_constant { planned.port.size_bytes / 4 } else { planned.port.size_bytes / 4 / nrounds };
            let src = buffers.get(&planned.port.name);
            for a in 0..naccs {
                if round + a >= nrounds {
                    continue;
                }
                let idx_mem = p_idx * (blksize / nports) + a * blksize;
                let src_offset = if planned.is_constant { 0 } else { a * size_slice + round * size_slice };
                dma[idx_mem..idx_mem + size_slice].copy_from_slice(&src[src_offset..src_offset + size_slice]);
            }
        }
        scheduler.publish_block_size(blksize as u32);
        let token = TransferToken { mem_phys: phys, mem_off: 0, hw_base: 0, hw_off, size: naccs * blksize * 4, dir: TransferDirection::MemToHw };
        dea.submit(token).wait()
    })??;

    if need_constants {
        registry.mark_constants_loaded(kernel_name)?;
    }
    Ok(())
}

/// Symmetric to [`send`]: pulls outputs and bidirectional ports out of the
/// last bank group of the kernel's memory window, HwToMem (§4.5.3).
pub fn recv(
    registry: &Registry,
    scheduler: &Scheduler,
    dea: &Dea,
    kernel_name: &str,
    id: u8,
    naccs: u32,
    round: usize,
    nrounds: usize,
    buffers: &mut PortBuffers,
) -> Result<(), Error> {
    let naccs = naccs as usize;
    let (mem_bytes, banks, output_ports, inout_ports) = registry.with_kernel(kernel_name, |k| {
        (
            k.mem_bytes,
            k.banks,
            k.ports(shuffler_api::Direction::Output).iter().cloned().collect::<Vec<_>>(),
            k.ports(shuffler_api::Direction::InOut).iter().cloned().collect::<Vec<_>>(),
        )
    })?;
    let mem_per_bank = mem_bytes / banks;

    let mut ports: Vec<Port> = Vec::new();
    ports.extend(output_ports);
    ports.extend(inout_ports);
    if ports.is_empty() {
        return Ok(());
    }

    let nports = ports.len();
    let blksize = nports * (mem_per_bank / 4);
    let hw_off = ((id as usize) << 16) + (mem_bytes - blksize * 4);

    dea.with_transfer(naccs * blksize * 4, |dma, phys| -> Result<(), Error> {
        scheduler.publish_block_size(blksize as u32);
        let token = TransferToken { mem_phys: phys, mem_off: 0, hw_base: 0, hw_off, size: naccs * blksize * 4, dir: TransferDirection::HwToMem };
        dea.submit(token).wait()?;

        for (p_idx, port) in ports.iter().enumerate() {
            let size_slice = port.size_bytes / 4 / nrounds;
            let dst = buffers.get_mut(&port.name);
            for a in 0..naccs {
                if round + a >= nrounds {
                    continue;
                }
                let idx_mem = p_idx * (blksize / nports) + a * blksize;
                let dst_offset = a * size_slice + round * size_slice;
                dst[dst_offset..dst_offset + size_slice].copy_from_slice(&dma[idx_mem..idx_mem + size_slice]);
            }
        }
        Ok(())
    })??;
    Ok(())
}
