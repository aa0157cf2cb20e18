//! Auxiliary vector reconstruction.
//!
//! The protocol has no auxv message. On remotes that report the initial
//! stack pointer the vector is read back from the process stack, which at
//! startup holds `argc`, `argv[]`, `NULL`, `envp[]`, `NULL` and then the
//! auxv pairs. Otherwise a minimal vector is built from what the caller
//! knows about the executable.

use tether_proto::{ProcfsInfo, Reply, Request};
use tracing::{debug, warn};

use crate::client::RemoteTarget;
use crate::error::{ClientError, ClientResult};
use crate::regs::word_from_bytes;

pub const AT_NULL: u64 = 0;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_ENTRY: u64 = 9;

/// Stop scanning pointer arrays after this many entries.
const MAX_STRINGS: usize = 8192;
const MAX_AUX_ENTRIES: usize = 256;

/// Stack bytes fetched per memory read.
const STACK_BLOCK: usize = 256;

/// One `(type, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxEntry {
    pub kind: u64,
    pub value: u64,
}

impl AuxEntry {
    pub const fn new(kind: u64, value: u64) -> Self {
        Self { kind, value }
    }
}

/// Executable facts known on the host side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecMetadata {
    /// Address of the program headers in the loaded image.
    pub phdr: u64,
    pub phent: u64,
    pub phnum: u64,
    pub entry: u64,
}

impl ExecMetadata {
    /// The smallest vector a debugger can work with.
    pub fn synthesize(&self) -> Vec<AuxEntry> {
        vec![
            AuxEntry::new(AT_PHDR, self.phdr),
            AuxEntry::new(AT_PHENT, self.phent),
            AuxEntry::new(AT_PHNUM, self.phnum),
            AuxEntry::new(AT_ENTRY, self.entry),
            AuxEntry::new(AT_NULL, 0),
        ]
    }
}

/// Word-at-a-time reader over target memory, fetching in blocks.
struct StackCursor {
    addr: u64,
    word: usize,
    buf: Vec<u8>,
    pos: usize,
}

impl StackCursor {
    fn new(addr: u64, word: usize) -> Self {
        Self {
            addr,
            word,
            buf: Vec::new(),
            pos: 0,
        }
    }

    fn next(&mut self, target: &mut RemoteTarget) -> ClientResult<u64> {
        if self.pos + self.word > self.buf.len() {
            let data = target.read_memory(self.addr, STACK_BLOCK)?;
            if data.len() < self.word {
                return Err(ClientError::ShortTransfer {
                    expected: self.word,
                    got: data.len(),
                });
            }
            self.addr += (data.len() - data.len() % self.word) as u64;
            self.buf = data;
            self.pos = 0;
        }
        let bytes = &self.buf[self.pos..self.pos + self.word];
        self.pos += self.word;
        Ok(word_from_bytes(bytes, target.engine.session().endian()))
    }

    /// Skip a NULL-terminated pointer array.
    fn skip_array(&mut self, target: &mut RemoteTarget) -> ClientResult<()> {
        for _ in 0..MAX_STRINGS {
            if self.next(target)? == 0 {
                return Ok(());
            }
        }
        Err(ClientError::UnexpectedReply {
            op: "auxv",
            reply: "pointer array not terminated".into(),
        })
    }
}

impl RemoteTarget {
    /// Recover the auxiliary vector of the current process.
    ///
    /// Falls back to `fallback` when the stack cannot be read.
    pub fn read_auxv(&mut self, fallback: Option<&ExecMetadata>) -> ClientResult<Vec<AuxEntry>> {
        self.require_context()?;
        let stack_err = match self.auxv_from_stack() {
            Ok(entries) => return Ok(entries),
            Err(err) => err,
        };
        match fallback {
            Some(meta) => {
                debug!(error = %stack_err, "auxv from stack unavailable, synthesizing");
                Ok(meta.synthesize())
            }
            None => Err(stack_err),
        }
    }

    fn auxv_from_stack(&mut self) -> ClientResult<Vec<AuxEntry>> {
        self.engine.session().require_version("procfs info", 0, 4)?;
        let word = self.layout()?.word_size();

        let reply = self.engine.send_recv(&Request::ProcfsInfo)?;
        let info = match reply {
            Reply::OkData(data) => ProcfsInfo::decode(&data, self.engine.session().endian())?,
            Reply::Error(source) => return Err(ClientError::Remote { op: "procfsinfo", source }),
            other => {
                return Err(ClientError::UnexpectedReply {
                    op: "procfsinfo",
                    reply: format!("{other:?}"),
                })
            }
        };
        if info.initial_stack == 0 {
            return Err(ClientError::UnexpectedReply {
                op: "procfsinfo",
                reply: "no initial stack".into(),
            });
        }

        let mut cursor = StackCursor::new(info.initial_stack, word);
        let argc = cursor.next(self)?;
        debug!(argc, stack = info.initial_stack, "walking initial stack");
        for _ in 0..argc.min(MAX_STRINGS as u64) {
            cursor.next(self)?;
        }
        cursor.skip_array(self)?; // argv terminator
        cursor.skip_array(self)?; // envp

        let mut entries = Vec::new();
        for _ in 0..MAX_AUX_ENTRIES {
            let kind = cursor.next(self)?;
            let value = cursor.next(self)?;
            entries.push(AuxEntry::new(kind, value));
            if kind == AT_NULL {
                return Ok(entries);
            }
        }
        warn!(entries = entries.len(), "auxv not terminated, truncating");
        entries.push(AuxEntry::new(AT_NULL, 0));
        Ok(entries)
    }
}
