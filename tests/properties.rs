mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_client::engine::Engine;
use tether_client::mock::{reply_to, MockRemote};
use tether_client::{Ptid, SessionOptions, WaitStatus};
use tether_proto::frame::decode_frame;
use tether_proto::packet::cmd;
use tether_proto::{
    encode_frame, Endian, Notify, NotifyEvent, PidListPage, ProtoError, Reply, Request,
    ThreadBrief, ThreadState, TidNamesPage,
};

use common::{connect, process};

/// Deterministic byte source so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 56) as u8
    }

    fn bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.next()).collect()
    }
}

#[test]
fn frames_roundtrip_arbitrary_bytes() {
    let mut rng = Lcg(7);
    for len in 0..300 {
        let mut content = rng.bytes(len);
        // Bias towards the reserved values.
        for b in content.iter_mut().step_by(3) {
            *b = if *b & 1 == 0 { 0x7E } else { 0x7D };
        }
        assert_eq!(decode_frame(&encode_frame(&content)).unwrap(), content);
    }
}

#[test]
fn any_single_corrupted_byte_fails_checksum() {
    let mut rng = Lcg(99);
    let content: Vec<u8> = rng.bytes(64).into_iter().map(|b| b % 0x70).collect();
    let encoded = encode_frame(&content);
    for i in 0..content.len() {
        let mut damaged = encoded.clone();
        damaged[1 + i] ^= 0x01;
        assert!(
            matches!(decode_frame(&damaged), Err(ProtoError::Checksum { .. })),
            "corruption at {i} went unnoticed"
        );
    }
}

#[test]
fn stale_reply_is_never_delivered() {
    let (remote, _handle) = MockRemote::new(|p| {
        let mut stale = reply_to(p, Reply::OkStatus(666));
        stale.header.mid = p.header.mid.wrapping_add(1);
        vec![stale, reply_to(p, Reply::OkStatus(1))]
    });
    let mut engine = Engine::new(Box::new(remote), SessionOptions::default());
    for _ in 0..5 {
        let reply = engine.send_recv(&Request::SelectQuery { pid: 1, tid: 1 }).unwrap();
        assert_eq!(reply, Reply::OkStatus(1));
    }
}

#[test]
fn silent_remote_gets_exactly_max_retries_transmissions() {
    for max_retries in [1, 3, 6] {
        let (remote, handle) = MockRemote::new(|_| Vec::new());
        let options = SessionOptions {
            max_retries,
            timeout: Duration::from_millis(1),
            ..SessionOptions::default()
        };
        let mut engine = Engine::new(Box::new(remote), options);
        match engine.send_recv(&Request::Stop).unwrap() {
            Reply::Error(err) => assert!(err.local),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(handle.count(cmd::STOP), max_retries as usize);
    }
}

/// Remote with threads `1..=total`, returning `per_page` per listing.
fn paging_remote(
    total: i32,
    per_page: usize,
) -> impl FnMut(&tether_proto::Packet, Request) -> Vec<tether_proto::Packet> + Send + 'static {
    move |p, request| {
        let reply = match request {
            Request::Attach { .. } => Reply::OkData(process(40, 1, 62).encode(p.header.endian)),
            Request::PidList { pid, tid, .. } => Reply::OkData(
                PidListPage {
                    pid,
                    num_tids: total,
                    name: "srv".into(),
                    threads: (tid.max(1)..=total)
                        .take(per_page)
                        .map(|tid| ThreadBrief {
                            tid,
                            state: ThreadState::Ready,
                            flags: 0,
                        })
                        .collect(),
                }
                .encode(p.header.endian),
            ),
            Request::TidNames => Reply::OkData(
                TidNamesPage {
                    num_tids: total as u32,
                    num_left: 0,
                    names: Vec::new(),
                }
                .encode(p.header.endian),
            ),
            _ => Reply::Ok,
        };
        vec![reply_to(p, reply)]
    }
}

#[test]
fn paged_enumeration_yields_every_thread_once() {
    for (total, per_page) in [(1, 1), (5, 2), (12, 5), (16, 16), (9, 1)] {
        let (mut target, _handle) = connect(paging_remote(total, per_page));
        target.attach(40).unwrap();
        assert_eq!(target.update_threads().unwrap(), total as usize);
        let tids: BTreeSet<i32> = target.process().threads.keys().copied().collect();
        assert_eq!(tids, (1..=total).collect(), "total {total} per page {per_page}");
    }
}

#[test]
fn every_notify_is_acked_once_before_it_surfaces() {
    let (mut target, handle) = connect(|p, _| vec![reply_to(p, Reply::Ok)]);
    let events = [
        (
            0x81,
            NotifyEvent::LibraryLoaded {
                name: "libc.so.6".into(),
            },
        ),
        (0x82, NotifyEvent::Stopped { ip: 0x1000 }),
        (
            0x83,
            NotifyEvent::Signal {
                signo: 11,
                code: 1,
                value: 0,
                ip: 0x2000,
            },
        ),
        (
            0x84,
            NotifyEvent::ProcessUnloaded {
                status: 0,
                faulted: Some(false),
            },
        ),
    ];
    let mut expected_acks = Vec::new();
    for (mid, event) in events {
        handle.push_packet(&Notify { pid: 3, tid: 1, event }.to_packet(mid, Endian::Little));
        let outcome = target.wait().unwrap();
        expected_acks.push(mid);
        assert_eq!(handle.acks(), expected_acks);
        assert_eq!(outcome.ptid, Ptid::new(3, 1));
        if mid == 0x83 {
            assert_eq!(outcome.status, WaitStatus::Stopped(tether_proto::TargetSignal::SEGV));
        }
    }
    assert_eq!(handle.acks().len(), 4);
}

#[test]
fn register_write_reads_back_and_spares_siblings() {
    let general = Arc::new(Mutex::new((0..160u8).map(|b| b.wrapping_mul(3)).collect::<Vec<u8>>()));
    let regs = Arc::clone(&general);
    let (mut target, _handle) = connect(move |p, request| {
        let mut general = regs.lock().unwrap();
        let reply = match request {
            Request::Attach { .. } => Reply::OkData(process(12, 1, 62).encode(p.header.endian)),
            Request::RegRead {
                regset: tether_proto::Regset::General,
                offset,
                size,
            } => {
                let start = offset as usize;
                Reply::OkData(general[start..start + size as usize].to_vec())
            }
            Request::RegWrite {
                regset: tether_proto::Regset::General,
                offset,
                data,
            } => {
                let start = offset as usize;
                general[start..start + data.len()].copy_from_slice(&data);
                Reply::Ok
            }
            Request::RegRead { size, .. } => Reply::OkData(vec![0; size as usize]),
            _ => Reply::Ok,
        };
        vec![reply_to(p, reply)]
    });
    target.attach(12).unwrap();

    for (name, value) in [("rcx", [0x11; 8]), ("rbx", [0x22; 8]), ("rip", [0x33; 8])] {
        let before = general.lock().unwrap().clone();
        let desc = target
            .read_all_registers()
            .unwrap()
            .into_iter()
            .find(|(d, _)| d.name == name)
            .map(|(d, _)| d)
            .unwrap();
        target.patch_register(name, &value).unwrap();
        assert_eq!(target.read_register(name).unwrap(), value.to_vec());

        let after = general.lock().unwrap().clone();
        let range = desc.offset as usize..(desc.offset + desc.size) as usize;
        for (i, (a, b)) in before.iter().zip(after.iter()).enumerate() {
            if !range.contains(&i) {
                assert_eq!(a, b, "{name} write touched byte {i}");
            }
        }
    }
}
