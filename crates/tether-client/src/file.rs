//! Remote file subchannel.
//!
//! One file is open at a time on the remote; these calls are thin
//! wrappers that move blocks and map errors. Transfer policy (what to
//! copy where) belongs to the caller.

use tether_proto::{Reply, Request};

use crate::client::{expect_ok, RemoteTarget};
use crate::error::{ClientError, ClientResult};

/// How to open a remote file. Values are the target's `open(2)` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate for writing.
    Write,
}

impl OpenMode {
    const O_WRONLY: i32 = 0x0001;
    const O_CREAT: i32 = 0x0100;
    const O_TRUNC: i32 = 0x0200;

    pub fn flags(self) -> i32 {
        match self {
            OpenMode::Read => 0,
            OpenMode::Write => Self::O_WRONLY | Self::O_CREAT | Self::O_TRUNC,
        }
    }
}

impl RemoteTarget {
    /// Open `path` on the target. `perms` applies when the file is created.
    pub fn file_open(&mut self, path: &str, mode: OpenMode, perms: u32) -> ClientResult<()> {
        self.engine.session().require_open()?;
        let reply = self.engine.send_recv(&Request::FileOpen {
            mode: mode.flags(),
            perms: perms as i32,
            path: path.to_string(),
        })?;
        expect_ok("fileopen", reply)
    }

    /// Read up to `len` bytes from the open file. An empty result means
    /// end of file.
    pub fn file_read(&mut self, len: usize) -> ClientResult<Vec<u8>> {
        self.engine.session().require_open()?;
        let block = self.engine.session().options().max_payload.clamp(1, u16::MAX as usize);
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let want = (len - out.len()).min(block);
            let reply = self.engine.send_recv(&Request::FileRead { size: want as u16 })?;
            let data = match reply {
                Reply::OkData(data) => data,
                Reply::Error(source) => return Err(ClientError::Remote { op: "filerd", source }),
                _ => Vec::new(),
            };
            let got = data.len().min(want);
            out.extend_from_slice(&data[..got]);
            if got < want {
                break;
            }
        }
        Ok(out)
    }

    /// Append `data` to the open file. Returns the bytes written.
    pub fn file_write(&mut self, data: &[u8]) -> ClientResult<usize> {
        self.engine.session().require_open()?;
        let block = self.engine.session().options().max_payload.max(1);
        let mut done = 0;
        for chunk in data.chunks(block) {
            let reply = self.engine.send_recv(&Request::FileWrite {
                data: chunk.to_vec(),
            })?;
            let written = match reply {
                Reply::OkStatus(n) => usize::try_from(n).unwrap_or(0).min(chunk.len()),
                Reply::Error(source) => return Err(ClientError::Remote { op: "filewr", source }),
                _ => chunk.len(),
            };
            done += written;
            if written < chunk.len() {
                break;
            }
        }
        Ok(done)
    }

    /// Close the open file, optionally stamping its modification time
    /// (seconds since the epoch).
    pub fn file_close(&mut self, mtime: Option<i32>) -> ClientResult<()> {
        self.engine.session().require_open()?;
        let reply = self.engine.send_recv(&Request::FileClose {
            mtime: mtime.unwrap_or(0),
        })?;
        expect_ok("fileclose", reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{reply_to, MockRemote};
    use crate::session::SessionOptions;
    use std::sync::{Arc, Mutex};
    use tether_proto::packet::cmd;
    use tether_proto::{Packet, RemoteError, RemoteErrorCode};

    /// Remote with one in-memory file.
    fn target(contents: Vec<u8>, max_payload: usize) -> (RemoteTarget, crate::mock::MockHandle, Arc<Mutex<Vec<u8>>>) {
        let file = Arc::new(Mutex::new(contents));
        let shared = Arc::clone(&file);
        let mut pos = 0usize;
        let responder = move |p: &Packet| {
            let mut file = shared.lock().unwrap();
            let reply = match Request::decode(p).unwrap() {
                Request::FileOpen { path, .. } if path == "/missing" => Reply::Error(RemoteError {
                    code: RemoteErrorCode::Generic,
                    errno: 2,
                    local: false,
                }),
                Request::FileOpen { mode, .. } => {
                    pos = 0;
                    if mode == OpenMode::Write.flags() {
                        file.clear();
                    }
                    Reply::Ok
                }
                Request::FileRead { size } => {
                    let end = (pos + size as usize).min(file.len());
                    let data = file[pos..end].to_vec();
                    pos = end;
                    Reply::OkData(data)
                }
                Request::FileWrite { data } => {
                    file.extend_from_slice(&data);
                    Reply::OkStatus(data.len() as i32)
                }
                _ => Reply::Ok,
            };
            vec![reply_to(p, reply)]
        };
        let (remote, handle) = MockRemote::new(responder);
        let options = SessionOptions {
            max_payload,
            ..SessionOptions::default()
        };
        (RemoteTarget::new(Box::new(remote), options), handle, file)
    }

    #[test]
    fn file_read_until_eof() {
        let (mut t, handle, _) = target((0..100).collect(), 32);
        t.file_open("/etc/motd", OpenMode::Read, 0).unwrap();
        let data = t.file_read(1000).unwrap();
        assert_eq!(data, (0..100).collect::<Vec<u8>>());
        assert_eq!(handle.count(cmd::FILERD), 4);
        assert!(t.file_read(10).unwrap().is_empty());
        t.file_close(None).unwrap();
    }

    #[test]
    fn file_write_chunks() {
        let (mut t, handle, file) = target(vec![9; 4], 16);
        t.file_open("/tmp/out", OpenMode::Write, 0o644).unwrap();
        assert_eq!(t.file_write(&[5; 40]).unwrap(), 40);
        t.file_close(Some(1_700_000_000)).unwrap();
        assert_eq!(*file.lock().unwrap(), vec![5; 40]);
        assert_eq!(handle.count(cmd::FILEWR), 3);
        assert!(handle.requests().contains(&Request::FileClose {
            mtime: 1_700_000_000
        }));
    }

    #[test]
    fn file_open_error_maps_to_remote() {
        let (mut t, _h, _) = target(Vec::new(), 16);
        assert!(matches!(
            t.file_open("/missing", OpenMode::Read, 0),
            Err(ClientError::Remote { op: "fileopen", .. })
        ));
    }
}
