//! Notify handling and the wait loop.
//!
//! While the target runs, every debug-channel frame is classified here.
//! Notifies are acknowledged before they are dispatched; an `ok` carrying
//! the outstanding stop request's message id resolves the interrupt.
//! Cancellation escalates from a stop request through timed
//! retransmissions to abandoning the process.

use std::time::{Duration, Instant};

use tether_proto::packet::cmd;
use tether_proto::{Notify, NotifyEvent, Packet, ProcessLoad, Request, TargetSignal};
use tracing::{debug, info, warn};

use crate::client::RemoteTarget;
use crate::error::{ClientError, ClientResult};
use crate::process::Ptid;

/// Granularity at which the wait loop checks for cancellation.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// What the target did, as reported to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// Stopped with a signal (`NONE` for a plain stop).
    Stopped(TargetSignal),
    /// Exited normally with a status code.
    Exited(i32),
    /// Killed by a signal.
    Signalled(TargetSignal),
    /// A process was loaded.
    Loaded,
    /// Nothing the debugger needs to act on.
    Spurious,
    /// The process forked; the caller decides whether to follow.
    Forked { child_pid: i32, vfork: bool },
    /// The process image was replaced.
    Execd { path: String },
}

/// A wait result: the context the event came from and its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub ptid: Ptid,
    pub status: WaitStatus,
}

/// Stop-request bookkeeping for one wait.
struct StopLadder {
    packet: Packet,
    sent_at: Instant,
    retransmits: u32,
}

impl RemoteTarget {
    /// Block until the target reports an event.
    pub fn wait(&mut self) -> ClientResult<WaitOutcome> {
        let cancel = self.engine.cancel_token();
        let interval = self.engine.session().options().cancel_interval;
        let max_retransmits = self.engine.session().options().cancel_retransmits;
        let legacy = self.version() == crate::session::ProtocolVersion::LEGACY;

        let mut ladder: Option<StopLadder> = None;
        let mut interrupted = false;
        let mut outcome: Option<WaitOutcome> = None;

        loop {
            let pending = cancel.take();
            if pending > 0 {
                if ladder.is_some() || pending > 1 {
                    warn!("interrupted again while waiting for the target to stop");
                    if self.confirm.confirm_abandon() {
                        return self.abandon();
                    }
                }
                if ladder.is_none() {
                    info!("interrupting target");
                    let packet = self.engine.send_nowait(&Request::Stop)?;
                    ladder = Some(StopLadder {
                        packet,
                        sent_at: Instant::now(),
                        retransmits: 0,
                    });
                }
            }

            if let Some(stop) = ladder.as_mut() {
                if stop.sent_at.elapsed() >= interval {
                    if stop.retransmits >= max_retransmits {
                        warn!(retransmits = stop.retransmits, "target did not stop");
                        return self.abandon();
                    }
                    stop.retransmits += 1;
                    warn!(attempt = stop.retransmits, "retransmitting stop");
                    let packet = stop.packet.clone();
                    stop.sent_at = Instant::now();
                    self.engine.send_packet(&packet)?;
                }
            }

            let Some(packet) = self.engine.next_packet(Some(POLL_SLICE))? else {
                continue;
            };

            let answers_stop = ladder
                .as_ref()
                .is_some_and(|stop| stop.packet.header.mid == packet.header.mid);

            if packet.header.is_notify() {
                self.engine.ack(packet.header.mid)?;
                match Notify::decode(&packet) {
                    Ok(notify) => {
                        debug!(event = notify.event.name(), pid = notify.pid, tid = notify.tid, "notify");
                        outcome = Some(self.dispatch(notify)?);
                    }
                    Err(err) => warn!(error = %err, "undecodable notify"),
                }
            } else if answers_stop && packet.header.cmd == cmd::OK {
                debug!(mid = packet.header.mid, "stop acknowledged");
                ladder = None;
                interrupted = true;
                if legacy && outcome.is_none() {
                    outcome = Some(WaitOutcome {
                        ptid: self.current.unwrap_or_default(),
                        status: WaitStatus::Stopped(TargetSignal::INT),
                    });
                }
            } else if answers_stop && packet.header.cmd == cmd::ERR {
                warn!("remote refused to stop the target");
            } else {
                debug!(cmd = packet.header.cmd, mid = packet.header.mid, "dropping frame while waiting");
            }

            if ladder.is_none() {
                if let Some(mut done) = outcome.take() {
                    if interrupted && done.status == WaitStatus::Stopped(TargetSignal::NONE) {
                        done.status = WaitStatus::Stopped(TargetSignal::INT);
                    }
                    return Ok(done);
                }
            }
        }
    }

    /// Give up on a target that will not stop.
    fn abandon(&mut self) -> ClientResult<WaitOutcome> {
        warn!("abandoning remote process");
        match self.engine.send_recv_with(
            &Request::Kill {
                signal: TargetSignal::KILL,
            },
            1,
        ) {
            Ok(reply) => debug!(?reply, "kill after abandon"),
            Err(err) => debug!(error = %err, "kill after abandon failed"),
        }
        self.process_gone();
        Err(ClientError::Abandoned)
    }

    /// Apply one notify to the records and map it to a wait status.
    pub(crate) fn dispatch(&mut self, notify: Notify) -> ClientResult<WaitOutcome> {
        let ptid = Ptid::new(notify.pid, notify.tid);
        let status = match notify.event {
            NotifyEvent::ProcessLoaded { cpu, cpuid, name } => {
                self.process.loaded(&ProcessLoad {
                    pid: notify.pid,
                    tid: notify.tid,
                    cpu,
                    cpuid,
                    name,
                });
                WaitStatus::Loaded
            }
            NotifyEvent::ProcessUnloaded { status, faulted } => {
                self.process_gone();
                let faulted = self.capabilities().faulted_unload && faulted == Some(true);
                if faulted {
                    WaitStatus::Signalled(TargetSignal(status))
                } else {
                    WaitStatus::Exited(status)
                }
            }
            NotifyEvent::ThreadLoaded { tid } => {
                let new = Ptid::new(notify.pid, tid);
                self.process.thread_mut(tid);
                // The notify alone does not say what state the thread is in.
                if let Err(err) = self.thread_alive(new) {
                    warn!(error = %err, %new, "could not query new thread");
                }
                if self.engine.session().options().stop_on_thread_events {
                    return Ok(WaitOutcome {
                        ptid: new,
                        status: WaitStatus::Stopped(TargetSignal::NONE),
                    });
                }
                return Ok(WaitOutcome {
                    ptid: new,
                    status: WaitStatus::Spurious,
                });
            }
            NotifyEvent::ThreadUnloaded { tid, status } => {
                debug!(tid, status, "thread exited");
                self.process.mark_thread_dead(tid);
                if self.current == Some(Ptid::new(notify.pid, tid)) {
                    self.current = None;
                    if let Some(next) = self.process.first_live_thread(Some(tid)) {
                        self.select(Ptid::new(notify.pid, next))?;
                    }
                }
                WaitStatus::Spurious
            }
            NotifyEvent::BreakpointHit { ip, dp, flags } | NotifyEvent::StepDone { ip, dp, flags } => {
                self.process.record_stop(ip, Some(dp), flags);
                WaitStatus::Stopped(TargetSignal::TRAP)
            }
            NotifyEvent::Signal { signo, ip, .. } => {
                self.process.record_stop(ip, None, 0);
                WaitStatus::Stopped(TargetSignal(signo))
            }
            NotifyEvent::Stopped { ip } => {
                self.process.record_stop(ip, None, 0);
                WaitStatus::Stopped(TargetSignal::NONE)
            }
            NotifyEvent::Fork { child_pid, vfork } => WaitStatus::Forked { child_pid, vfork },
            NotifyEvent::Exec { name } => {
                self.process.exe_path = Some(name.clone());
                WaitStatus::Execd { path: name }
            }
            NotifyEvent::LibraryLoaded { .. } | NotifyEvent::LibraryUnloaded { .. } => {
                WaitStatus::Spurious
            }
        };
        Ok(WaitOutcome { ptid, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelToken, Confirm};
    use crate::mock::{reply_to, MockHandle, MockRemote};
    use crate::session::{ProtocolVersion, SessionOptions};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tether_proto::{Endian, Reply};

    fn target(options: SessionOptions) -> (RemoteTarget, MockHandle) {
        let (remote, handle) = MockRemote::new(|p| vec![reply_to(p, Reply::Ok)]);
        (RemoteTarget::new(Box::new(remote), options), handle)
    }

    fn notify(mid: u8, pid: i32, tid: i32, event: NotifyEvent) -> Packet {
        Notify { pid, tid, event }.to_packet(mid, Endian::Little)
    }

    #[test]
    fn wait_acks_before_reporting_signal() {
        let (mut t, handle) = target(SessionOptions::default());
        handle.push_packet(&notify(
            40,
            5,
            1,
            NotifyEvent::Signal {
                signo: 11,
                code: 1,
                value: 0,
                ip: 0x4000,
            },
        ));
        let out = t.wait().unwrap();
        assert_eq!(out.status, WaitStatus::Stopped(TargetSignal::SEGV));
        assert_eq!(out.ptid, Ptid::new(5, 1));
        assert_eq!(handle.acks(), vec![40]);
        assert_eq!(t.process().stop_ip, Some(0x4000));
    }

    #[test]
    fn wait_exit_without_faulted_flag() {
        let (mut t, handle) = target(SessionOptions::default());
        handle.push_packet(&notify(
            1,
            5,
            1,
            NotifyEvent::ProcessUnloaded {
                status: 3,
                faulted: None,
            },
        ));
        assert_eq!(t.wait().unwrap().status, WaitStatus::Exited(3));
        assert!(!t.process().validity.any());
    }

    #[test]
    fn wait_library_events_are_spurious() {
        let (mut t, handle) = target(SessionOptions::default());
        handle.push_packet(&notify(
            2,
            5,
            1,
            NotifyEvent::LibraryLoaded {
                name: "libc.so".into(),
            },
        ));
        assert_eq!(t.wait().unwrap().status, WaitStatus::Spurious);
    }

    #[test]
    fn wait_fork_exposes_discriminator() {
        let (mut t, handle) = target(SessionOptions::default());
        handle.push_packet(&notify(
            3,
            5,
            1,
            NotifyEvent::Fork {
                child_pid: 6,
                vfork: true,
            },
        ));
        assert_eq!(
            t.wait().unwrap().status,
            WaitStatus::Forked {
                child_pid: 6,
                vfork: true
            }
        );
    }

    #[test]
    fn wait_cancel_on_legacy_remote_ends_on_ack() {
        let (mut t, handle) = target(SessionOptions::default());
        t.cancel_token().cancel();
        let out = t.wait().unwrap();
        assert_eq!(out.status, WaitStatus::Stopped(TargetSignal::INT));
        assert_eq!(handle.count(cmd::STOP), 1);
    }

    #[test]
    fn wait_cancel_ladder_abandons() {
        let (remote, handle) = MockRemote::new(|_| Vec::new());
        let options = SessionOptions {
            cancel_interval: Duration::ZERO,
            cancel_retransmits: 3,
            ..SessionOptions::default()
        };
        let mut t = RemoteTarget::new(Box::new(remote), options);
        t.cancel_token().cancel();
        assert!(matches!(t.wait(), Err(ClientError::Abandoned)));
        // One stop plus three retransmissions of the same packet.
        assert_eq!(handle.count(cmd::STOP), 4);
        let mids: Vec<u8> = handle
            .packets()
            .iter()
            .filter(|p| p.header.cmd == cmd::STOP)
            .map(|p| p.header.mid)
            .collect();
        assert!(mids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(handle.count(cmd::KILL), 1);
    }
    /// Answers every request with `ok` and treats the session as
    /// negotiated at `version`.
    fn connected(version: ProtocolVersion, options: SessionOptions) -> (RemoteTarget, MockHandle) {
        let (mut t, handle) = target(options);
        t.engine.session_mut().connected(version);
        (t, handle)
    }

    fn load_process(t: &mut RemoteTarget, pid: i32, tids: &[i32]) {
        t.process.loaded(&ProcessLoad {
            pid,
            tid: tids[0],
            cpu: 62,
            cpuid: 0,
            name: "srv".into(),
        });
        for &tid in &tids[1..] {
            t.process.thread_mut(tid);
        }
    }

    /// Remembers how often it was asked.
    struct CountingConfirm {
        asked: Arc<AtomicU32>,
        answer: bool,
    }

    impl Confirm for CountingConfirm {
        fn confirm_abandon(&mut self) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn wait_faulted_unload_depends_on_revision() {
        let faulted = NotifyEvent::ProcessUnloaded {
            status: 11,
            faulted: Some(true),
        };
        let (mut t, handle) = connected(ProtocolVersion::new(0, 3), SessionOptions::default());
        load_process(&mut t, 5, &[1]);
        handle.push_packet(&notify(1, 5, 1, faulted.clone()));
        assert_eq!(t.wait().unwrap().status, WaitStatus::Signalled(TargetSignal::SEGV));
        assert!(t.process().pid.is_none());

        let (mut t, handle) = connected(ProtocolVersion::new(0, 2), SessionOptions::default());
        load_process(&mut t, 5, &[1]);
        handle.push_packet(&notify(1, 5, 1, faulted));
        assert_eq!(t.wait().unwrap().status, WaitStatus::Exited(11));
    }

    #[test]
    fn wait_thread_unload_moves_current_context() {
        let (mut t, handle) = connected(ProtocolVersion::CURRENT, SessionOptions::default());
        load_process(&mut t, 9, &[2, 3]);
        t.current = Some(Ptid::new(9, 2));
        handle.push_packet(&notify(4, 9, 2, NotifyEvent::ThreadUnloaded { tid: 2, status: 0 }));

        assert_eq!(t.wait().unwrap().status, WaitStatus::Spurious);
        assert_eq!(t.current(), Some(Ptid::new(9, 3)));
        assert!(!t.process().threads[&2].is_alive());
        assert!(handle
            .requests()
            .contains(&Request::Select { pid: 9, tid: 3 }));
    }

    #[test]
    fn wait_thread_unload_of_other_thread_keeps_context() {
        let (mut t, handle) = connected(ProtocolVersion::CURRENT, SessionOptions::default());
        load_process(&mut t, 9, &[2, 3]);
        t.current = Some(Ptid::new(9, 2));
        handle.push_packet(&notify(4, 9, 3, NotifyEvent::ThreadUnloaded { tid: 3, status: 0 }));

        assert_eq!(t.wait().unwrap().status, WaitStatus::Spurious);
        assert_eq!(t.current(), Some(Ptid::new(9, 2)));
        assert_eq!(handle.count(cmd::SELECT), 0);
    }

    #[test]
    fn wait_cancel_reports_interrupt_after_stop_and_notify() {
        let (remote, handle) = MockRemote::new(|p| {
            let mut out = vec![reply_to(p, Reply::Ok)];
            if p.header.cmd == cmd::STOP {
                out.push(notify(20, 5, 1, NotifyEvent::Stopped { ip: 0x1234 }));
            }
            out
        });
        let mut t = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        t.engine.session_mut().connected(ProtocolVersion::CURRENT);
        t.cancel_token().cancel();

        let out = t.wait().unwrap();
        assert_eq!(out.status, WaitStatus::Stopped(TargetSignal::INT));
        assert_eq!(out.ptid, Ptid::new(5, 1));
        assert_eq!(t.process().stop_ip, Some(0x1234));
        assert_eq!(handle.acks(), vec![20]);
    }

    #[test]
    fn wait_ignores_ok_with_foreign_mid_while_stopping() {
        let (remote, handle) = MockRemote::new(|p| {
            if p.header.cmd == cmd::STOP {
                let mut stale = reply_to(p, Reply::Ok);
                stale.header.mid = p.header.mid.wrapping_add(1);
                return vec![stale];
            }
            vec![reply_to(p, Reply::Ok)]
        });
        let options = SessionOptions {
            cancel_interval: Duration::from_millis(50),
            cancel_retransmits: 0,
            ..SessionOptions::default()
        };
        let mut t = RemoteTarget::new(Box::new(remote), options);
        t.cancel_token().cancel();

        assert!(matches!(t.wait(), Err(ClientError::Abandoned)));
        assert_eq!(handle.count(cmd::STOP), 1);
        assert_eq!(handle.count(cmd::KILL), 1);
    }

    #[test]
    fn wait_thread_load_follows_stop_toggle() {
        for stop_on_thread_events in [false, true] {
            let options = SessionOptions {
                stop_on_thread_events,
                ..SessionOptions::default()
            };
            let (mut t, handle) = connected(ProtocolVersion::CURRENT, options);
            load_process(&mut t, 9, &[1]);
            handle.push_packet(&notify(6, 9, 1, NotifyEvent::ThreadLoaded { tid: 4 }));

            let out = t.wait().unwrap();
            assert_eq!(out.ptid, Ptid::new(9, 4));
            let expected = if stop_on_thread_events {
                WaitStatus::Stopped(TargetSignal::NONE)
            } else {
                WaitStatus::Spurious
            };
            assert_eq!(out.status, expected);
            assert!(t.process().threads.contains_key(&4));
            assert!(handle
                .requests()
                .contains(&Request::SelectQuery { pid: 9, tid: 4 }));
        }
    }

    #[test]
    fn wait_exec_updates_executable_path() {
        let (mut t, handle) = connected(ProtocolVersion::CURRENT, SessionOptions::default());
        load_process(&mut t, 9, &[1]);
        handle.push_packet(&notify(
            7,
            9,
            1,
            NotifyEvent::Exec {
                name: "/usr/bin/login".into(),
            },
        ));
        assert_eq!(
            t.wait().unwrap().status,
            WaitStatus::Execd {
                path: "/usr/bin/login".into()
            }
        );
        assert_eq!(t.process().exe_path.as_deref(), Some("/usr/bin/login"));
    }

    #[test]
    fn wait_second_cancel_asks_before_abandoning() {
        let token_slot: Arc<Mutex<Option<CancelToken>>> = Arc::default();
        let slot = Arc::clone(&token_slot);
        // The remote swallows the stop; the user interrupts again meanwhile.
        let (remote, handle) = MockRemote::new(move |p| {
            if p.header.cmd == cmd::STOP {
                if let Some(token) = slot.lock().unwrap().as_ref() {
                    token.cancel();
                }
                return Vec::new();
            }
            vec![reply_to(p, Reply::Ok)]
        });
        let options = SessionOptions {
            cancel_interval: Duration::from_secs(60),
            ..SessionOptions::default()
        };
        let mut t = RemoteTarget::new(Box::new(remote), options);
        let asked = Arc::new(AtomicU32::new(0));
        t.set_confirm(Box::new(CountingConfirm {
            asked: Arc::clone(&asked),
            answer: true,
        }));
        *token_slot.lock().unwrap() = Some(t.cancel_token());
        t.cancel_token().cancel();

        assert!(matches!(t.wait(), Err(ClientError::Abandoned)));
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(handle.count(cmd::STOP), 1);
        assert_eq!(handle.count(cmd::KILL), 1);
    }
}
