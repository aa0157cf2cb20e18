//! Execution control: process lifecycle, resume and breakpoints.

use tether_proto::signal::SIGNAL_TABLE_LEN;
use tether_proto::{
    BreakpointKind, EnvOp, LoadMode, ProcessLoad, Reply, Request, SignalDisposition, TargetSignal,
};
use tracing::{debug, info, warn};

use crate::breakpoint::Breakpoint;
use crate::client::{expect_data, expect_ok, RemoteTarget};
use crate::error::{ClientError, ClientResult};
use crate::notify::WaitOutcome;
use crate::process::Ptid;

impl RemoteTarget {
    // -- lifecycle --------------------------------------------------------

    /// Start `program` under debugger control.
    ///
    /// The working directory and environment overrides stored on the
    /// process record are pushed first.
    pub fn load(&mut self, program: &str, args: &[String]) -> ClientResult<Ptid> {
        self.engine.session().require_open()?;

        if let Some(cwd) = self.process.cwd.clone() {
            let reply = self.engine.send_recv(&Request::Cwd { path: cwd })?;
            expect_ok("cwd", reply)?;
        }
        let env = self.process.env.clone();
        for var in &env {
            self.push_env(var)?;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.to_string());
        argv.extend(args.iter().cloned());
        let reply = self.engine.send_recv(&Request::Load {
            mode: LoadMode::Debug,
            args: argv,
            env: Vec::new(),
        })?;
        let data = expect_data("load", reply)?;
        let load = ProcessLoad::decode(&data, self.engine.session().endian())?;
        info!(pid = load.pid, program, "process loaded");
        self.adopt(&load)
    }

    /// Attach to a running process.
    pub fn attach(&mut self, pid: i32) -> ClientResult<Ptid> {
        self.engine.session().require_open()?;
        let reply = self.engine.send_recv(&Request::Attach { pid })?;
        let data = expect_data("attach", reply)?;
        let load = ProcessLoad::decode(&data, self.engine.session().endian())?;
        info!(pid = load.pid, "attached");
        self.adopt(&load)
    }

    /// Let the process run on without the debugger.
    pub fn detach(&mut self) -> ClientResult<()> {
        let pid = self.require_process()?;
        let reply = self.engine.send_recv(&Request::Detach { pid })?;
        expect_ok("detach", reply)?;
        info!(pid, "detached");
        self.process_gone();
        Ok(())
    }

    /// Terminate the process.
    pub fn kill(&mut self) -> ClientResult<()> {
        let pid = self.require_process()?;
        let reply = self.engine.send_recv(&Request::Kill {
            signal: TargetSignal::KILL,
        })?;
        expect_ok("kill", reply)?;
        info!(pid, "killed");
        self.process_gone();
        Ok(())
    }

    fn adopt(&mut self, load: &ProcessLoad) -> ClientResult<Ptid> {
        self.process.loaded(load);
        self.breakpoints.uninstall_all();
        self.current = None;
        let ptid = Ptid::new(load.pid, load.tid);
        self.select(ptid)?;
        Ok(ptid)
    }

    /// Send one `NAME=VALUE` override, split across messages when it does
    /// not fit in one.
    fn push_env(&mut self, var: &str) -> ClientResult<()> {
        let limit = self.engine.session().options().max_payload.saturating_sub(1).max(1);
        let parts = split_at_char_boundaries(var, limit);
        if parts.len() > 1 {
            self.engine
                .session()
                .require_version("long environment variables", 0, 1)?;
        }
        for (i, part) in parts.into_iter().enumerate() {
            let op = if i == 0 { EnvOp::SetEnv } else { EnvOp::SetEnvMore };
            let reply = self.engine.send_recv(&Request::Env {
                op,
                data: part.to_string(),
            })?;
            expect_ok("env", reply)?;
        }
        Ok(())
    }

    // -- running ----------------------------------------------------------

    /// Resume `ptid` (or the current thread), optionally for one step, and
    /// deliver `signal` if it is not `NONE`.
    pub fn resume(&mut self, ptid: Option<Ptid>, step: bool, signal: TargetSignal) -> ClientResult<()> {
        let ptid = self.resume_context(ptid)?;
        self.select(ptid)?;

        let table = self.signal_table();
        let reply = self.engine.send_recv(&Request::HandleSignals {
            pass: signal,
            table,
        })?;
        if let Reply::Error(err) = reply {
            if signal != TargetSignal::NONE {
                debug!(error = %err, %signal, "signal table rejected, delivering with kill");
                let reply = self.engine.send_recv(&Request::Kill { signal })?;
                expect_ok("kill", reply)?;
            } else {
                debug!(error = %err, "signal table rejected");
            }
        }

        let reply = self.engine.send_recv(&Request::Resume { step, count: 1 })?;
        expect_ok("run", reply)?;
        debug!(%ptid, step, "resumed");
        Ok(())
    }

    /// [`resume`](Self::resume) then [`wait`](Self::wait).
    pub fn resume_and_wait(
        &mut self,
        ptid: Option<Ptid>,
        step: bool,
        signal: TargetSignal,
    ) -> ClientResult<WaitOutcome> {
        self.resume(ptid, step, signal)?;
        self.wait()
    }

    /// Ask a running target to stop. The wait loop picks up the result.
    pub fn interrupt(&self) {
        self.engine.cancel_token().cancel();
    }

    /// The requested thread if it is alive, else thread 1, else the first
    /// live thread we know of.
    fn resume_context(&mut self, requested: Option<Ptid>) -> ClientResult<Ptid> {
        let pid = self.require_process()?;
        let wanted = requested.or(self.current).filter(|p| p.pid == pid);
        if let Some(ptid) = wanted {
            if self.thread_alive(ptid)? {
                return Ok(ptid);
            }
        }
        let first = Ptid::new(pid, 1);
        if wanted != Some(first) && self.thread_alive(first)? {
            return Ok(first);
        }
        match self.process.first_live_thread(Some(1)) {
            Some(tid) => Ok(Ptid::new(pid, tid)),
            None => Err(ClientError::NoContext),
        }
    }

    /// Disposition byte per target signal, defaults overridden by the
    /// session options.
    pub fn signal_table(&self) -> Vec<u8> {
        let mut table: Vec<u8> = (0..SIGNAL_TABLE_LEN as i32)
            .map(|n| SignalDisposition::default_for(TargetSignal(n)).to_bits())
            .collect();
        for (signal, disposition) in &self.engine.session().options().signals {
            match usize::try_from(signal.0).ok().and_then(|i| table.get_mut(i)) {
                Some(slot) => *slot = disposition.to_bits(),
                None => warn!(%signal, "signal outside the disposition table"),
            }
        }
        table
    }

    // -- breakpoints ------------------------------------------------------

    /// Plant a breakpoint or watchpoint of `len` bytes at `addr`.
    ///
    /// Returns `false` when the remote refused it; the entry is kept in the
    /// table uninstalled.
    pub fn insert_breakpoint(&mut self, addr: u64, kind: BreakpointKind, len: u32) -> ClientResult<bool> {
        self.require_context()?;
        let reply = self.engine.send_recv(&Request::Breakpoint {
            kind,
            addr,
            size: i32::try_from(len).unwrap_or(i32::MAX),
        })?;
        let mut bp = Breakpoint::new(addr, kind, len);
        bp.installed = match reply {
            Reply::Error(err) => {
                warn!(addr, ?kind, error = %err, "breakpoint not accepted");
                false
            }
            _ => true,
        };
        let installed = bp.installed;
        self.breakpoints.insert(bp);
        Ok(installed)
    }

    /// Remove a breakpoint. Returns `false` when the remote refused.
    pub fn remove_breakpoint(&mut self, addr: u64, kind: BreakpointKind) -> ClientResult<bool> {
        self.require_context()?;
        let reply = self.engine.send_recv(&Request::Breakpoint {
            kind,
            addr,
            size: -1,
        })?;
        match reply {
            Reply::Error(err) => {
                warn!(addr, ?kind, error = %err, "breakpoint removal refused");
                Ok(false)
            }
            _ => {
                self.breakpoints.remove(addr, kind);
                Ok(true)
            }
        }
    }
}

/// Split `s` into pieces of at most `limit` bytes without cutting a
/// character in half.
fn split_at_char_boundaries(s: &str, limit: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while rest.len() > limit {
        let mut cut = limit;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.char_indices().nth(1).map_or(rest.len(), |(i, _)| i);
        }
        let (head, tail) = rest.split_at(cut);
        parts.push(head);
        rest = tail;
    }
    parts.push(rest);
    parts
}
