//! Thread and process enumeration.
//!
//! The remote pages its answers: a pidlist page carries the process name
//! and as many brief thread records as fit, plus the total thread count.
//! Names come separately through `tidnames`, also paged.

use std::collections::BTreeSet;

use tether_proto::{
    PidListMode, PidListPage, Reply, Request, ThreadInfo, ThreadState, TidNamesPage, WireReader,
};
use tracing::{debug, warn};

use crate::client::{expect_data, RemoteTarget};
use crate::error::ClientResult;
use crate::process::Ptid;

/// Upper bound on pidlist pages fetched for one process.
const MAX_PAGES: usize = 4096;

/// One entry of the remote process list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub pid: i32,
    pub name: String,
    pub num_threads: i32,
}

impl RemoteTarget {
    /// Ask the remote whether `ptid` exists and is not dead.
    ///
    /// Newer remotes answer with a full thread-info record, which also
    /// refreshes the local thread record. Older ones only say whether the
    /// thread exists.
    pub fn thread_alive(&mut self, ptid: Ptid) -> ClientResult<bool> {
        self.engine.session().require_open()?;
        let reply = self.engine.send_recv(&Request::SelectQuery {
            pid: ptid.pid,
            tid: ptid.tid,
        })?;
        match reply {
            Reply::OkData(data) => {
                let info = ThreadInfo::decode(&data, self.engine.session().endian())?;
                if self.process.pid == Some(ptid.pid) {
                    self.process.thread_mut(ptid.tid).update_from_info(&info);
                }
                Ok(info.state != ThreadState::Dead)
            }
            Reply::OkStatus(exists) => Ok(exists != 0),
            Reply::Ok => Ok(true),
            Reply::Error(err) => {
                debug!(%ptid, error = %err, "thread query failed");
                Ok(false)
            }
        }
    }

    /// Re-enumerate the threads of the current process.
    ///
    /// Threads the remote no longer lists are dropped. Returns the number
    /// of distinct threads seen.
    pub fn update_threads(&mut self) -> ClientResult<usize> {
        let pid = self.require_process()?;
        let paged = self.capabilities().specific_tid_listing;
        let mode = if paged {
            PidListMode::SpecificTid
        } else {
            PidListMode::Specific
        };

        let mut seen = BTreeSet::new();
        let mut next_tid = 1;
        for _ in 0..MAX_PAGES {
            let reply = self.engine.send_recv(&Request::PidList {
                mode,
                pid,
                tid: next_tid,
            })?;
            let data = expect_data("pidlist", reply)?;
            let page = PidListPage::decode(&data, self.engine.session().endian())?;

            let before = seen.len();
            for brief in &page.threads {
                if seen.insert(brief.tid) {
                    self.process.thread_mut(brief.tid).update_from_brief(brief);
                }
                next_tid = next_tid.max(brief.tid.saturating_add(1));
            }
            debug!(pid, page = page.threads.len(), total = page.num_tids, "pidlist page");

            let complete = seen.len() >= usize::try_from(page.num_tids).unwrap_or(0);
            if !paged || complete || seen.len() == before {
                if !complete {
                    warn!(pid, seen = seen.len(), total = page.num_tids, "thread list ended early");
                }
                break;
            }
        }

        self.process.threads.retain(|tid, _| seen.contains(tid));
        if self.capabilities().thread_names {
            self.update_thread_names()?;
        }
        Ok(seen.len())
    }

    /// Fetch thread names until the remote says none are left.
    pub fn update_thread_names(&mut self) -> ClientResult<()> {
        self.require_process()?;
        self.engine
            .session()
            .require_version("thread names", 0, 3)?;
        loop {
            let reply = self.engine.send_recv(&Request::TidNames)?;
            let data = expect_data("tidnames", reply)?;
            let page = TidNamesPage::decode(&data, self.engine.session().endian())?;
            for (tid, name) in &page.names {
                if let Some(thread) = self.process.threads.get_mut(tid) {
                    thread.name = Some(name.clone());
                }
            }
            if page.num_left == 0 || page.names.is_empty() {
                return Ok(());
            }
        }
    }

    /// List every process on the target.
    pub fn list_processes(&mut self) -> ClientResult<Vec<ProcessSummary>> {
        self.engine.session().require_open()?;
        let mut out = Vec::new();
        let mut mode = PidListMode::Begin;
        let mut pid = 0;
        loop {
            let reply = self.engine.send_recv(&Request::PidList { mode, pid, tid: 0 })?;
            let data = match reply {
                Reply::OkData(data) => data,
                // The remote signals the end of the list with an error.
                _ => break,
            };
            let page = PidListPage::decode(&data, self.engine.session().endian())?;
            if mode == PidListMode::Next && page.pid <= pid {
                break;
            }
            pid = page.pid;
            out.push(ProcessSummary {
                pid: page.pid,
                name: page.name,
                num_threads: page.num_tids,
            });
            mode = PidListMode::Next;
        }
        Ok(out)
    }

    /// Load address of the main executable.
    pub fn base_address(&mut self) -> ClientResult<u64> {
        self.require_process()?;
        let reply = self.engine.send_recv(&Request::BaseAddress)?;
        let data = expect_data("base-address", reply)?;
        let mut r = WireReader::new(&data, self.engine.session().endian(), "base-address");
        Ok(r.u64()?)
    }
}
