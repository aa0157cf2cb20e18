//! Register access by regset and by name.

use tether_proto::{Endian, Regset, Request};
use tracing::debug;

use crate::arch::{RegisterDesc, RegisterLayout};
use crate::client::{expect_data, expect_ok, RemoteTarget};
use crate::error::{ClientError, ClientResult};

impl RemoteTarget {
    /// Read a whole regset of the current thread.
    ///
    /// Returns an empty buffer for regsets the architecture does not have.
    pub fn read_regset(&mut self, regset: Regset) -> ClientResult<Vec<u8>> {
        self.require_context()?;
        let layout = self.layout()?;
        let size = layout.regset_size(regset, self.capabilities());
        if size == 0 {
            return Ok(Vec::new());
        }
        let reply = self.engine.send_recv(&Request::RegRead {
            regset,
            offset: 0,
            size: size as u16,
        })?;
        let mut data = expect_data("regrd", reply)?;
        if data.len() < size {
            if !self.tolerates_short_regset(layout, regset) {
                return Err(ClientError::ShortTransfer {
                    expected: size,
                    got: data.len(),
                });
            }
            debug!(?regset, got = data.len(), size, "short regset from old remote, padding");
            data.resize(size, 0);
        }
        data.truncate(size);
        Ok(data)
    }

    /// Old remotes disagree about the size of the x86 float area.
    fn tolerates_short_regset(&self, layout: &dyn RegisterLayout, regset: Regset) -> bool {
        regset == Regset::Float && layout.name() == "x86" && !self.capabilities().full_x86_float
    }

    /// Every register of every regset the architecture has.
    pub fn read_all_registers(&mut self) -> ClientResult<Vec<(RegisterDesc, Vec<u8>)>> {
        let layout = self.layout()?;
        let registers = layout.registers(self.capabilities());
        let mut out = Vec::with_capacity(registers.len());
        for regset in Regset::ALL {
            if layout.regset_size(regset, self.capabilities()) == 0 {
                continue;
            }
            let data = self.read_regset(regset)?;
            for reg in registers.iter().filter(|r| r.regset == regset) {
                if let Some(bytes) = data.get(reg.range()) {
                    out.push((*reg, bytes.to_vec()));
                }
            }
        }
        Ok(out)
    }

    fn register(&self, name: &str) -> ClientResult<RegisterDesc> {
        self.layout()?
            .find(name, self.capabilities())
            .ok_or_else(|| ClientError::UnknownRegister(name.to_string()))
    }

    /// Read one register by name.
    pub fn read_register(&mut self, name: &str) -> ClientResult<Vec<u8>> {
        self.require_context()?;
        let reg = self.register(name)?;
        let reply = self.engine.send_recv(&Request::RegRead {
            regset: reg.regset,
            offset: reg.offset,
            size: reg.size,
        })?;
        let data = expect_data("regrd", reply)?;
        if data.len() < reg.size as usize {
            return Err(ClientError::ShortTransfer {
                expected: reg.size as usize,
                got: data.len(),
            });
        }
        Ok(data[..reg.size as usize].to_vec())
    }

    /// Write one register in place; only its bytes travel.
    pub fn write_register(&mut self, name: &str, value: &[u8]) -> ClientResult<()> {
        self.require_context()?;
        let reg = self.register(name)?;
        check_width(&reg, value)?;
        let reply = self.engine.send_recv(&Request::RegWrite {
            regset: reg.regset,
            offset: reg.offset,
            data: value.to_vec(),
        })?;
        expect_ok("regwr", reply)
    }

    /// Write one register by rewriting its whole regset.
    ///
    /// The live regset is read first so the other registers keep their
    /// values.
    pub fn patch_register(&mut self, name: &str, value: &[u8]) -> ClientResult<()> {
        self.require_context()?;
        let reg = self.register(name)?;
        check_width(&reg, value)?;
        let mut regset = self.read_regset(reg.regset)?;
        let range = reg.range();
        if range.end > regset.len() {
            return Err(ClientError::ShortTransfer {
                expected: range.end,
                got: regset.len(),
            });
        }
        regset[range].copy_from_slice(value);
        let reply = self.engine.send_recv(&Request::RegWrite {
            regset: reg.regset,
            offset: 0,
            data: regset,
        })?;
        expect_ok("regwr", reply)
    }

    /// Program counter of the current thread.
    pub fn read_pc(&mut self) -> ClientResult<u64> {
        let pc = self.layout()?.pc();
        let bytes = self.read_register(pc)?;
        Ok(word_from_bytes(&bytes, self.engine.session().endian()))
    }
}

fn check_width(reg: &RegisterDesc, value: &[u8]) -> ClientResult<()> {
    if value.len() != reg.size as usize {
        return Err(ClientError::RegisterWidth {
            name: reg.name,
            expected: reg.size as usize,
            got: value.len(),
        });
    }
    Ok(())
}

/// Interpret up to eight bytes as an unsigned integer.
pub(crate) fn word_from_bytes(bytes: &[u8], endian: Endian) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    match endian {
        Endian::Little => {
            buf[..n].copy_from_slice(&bytes[..n]);
            u64::from_le_bytes(buf)
        }
        Endian::Big => {
            buf[8 - n..].copy_from_slice(&bytes[..n]);
            u64::from_be_bytes(buf)
        }
    }
}
