//! Scripted remote agent shared by the integration tests.

#![allow(dead_code)]

use tether_client::mock::{reply_to, MockHandle, MockRemote};
use tether_client::{RemoteTarget, SessionOptions};
use tether_proto::{Packet, ProcessLoad, RemoteError, RemoteErrorCode, Reply, Request};

/// Answer the connect handshake as a remote speaking `major.minor`, and
/// hand every other request to `responder`.
pub fn connect_with<F>(
    major: u8,
    minor: u8,
    options: SessionOptions,
    mut responder: F,
) -> (RemoteTarget, MockHandle)
where
    F: FnMut(&Packet, Request) -> Vec<Packet> + Send + 'static,
{
    let status = (i32::from(major) << 8) | i32::from(minor);
    let (remote, handle) = MockRemote::new(move |p: &Packet| {
        let request = Request::decode(p).expect("client sent an undecodable request");
        match request {
            Request::Connect { .. } | Request::CpuInfo => vec![reply_to(p, Reply::Ok)],
            Request::ProtoVersion { .. } => vec![reply_to(p, Reply::OkStatus(status))],
            other => responder(p, other),
        }
    });
    let mut target = RemoteTarget::new(Box::new(remote), options);
    target.open().expect("handshake");
    (target, handle)
}

pub fn connect<F>(responder: F) -> (RemoteTarget, MockHandle)
where
    F: FnMut(&Packet, Request) -> Vec<Packet> + Send + 'static,
{
    connect_with(0, 5, SessionOptions::default(), responder)
}

pub fn process(pid: i32, tid: i32, cpu: i32) -> ProcessLoad {
    ProcessLoad {
        pid,
        tid,
        cpu,
        cpuid: 0,
        name: "/usr/bin/srv".into(),
    }
}

pub fn errno(errno: i32) -> Reply {
    Reply::Error(RemoteError {
        code: RemoteErrorCode::Generic,
        errno,
        local: false,
    })
}
