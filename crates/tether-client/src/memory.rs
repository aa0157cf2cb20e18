//! Target memory access.
//!
//! Transfers are split into blocks of at most `max_payload` bytes. A short
//! or failed block ends the transfer; callers get back what actually moved.

use tether_proto::{Reply, Request};
use tracing::debug;

use crate::client::RemoteTarget;
use crate::error::{ClientError, ClientResult};

impl RemoteTarget {
    fn block_size(&self) -> usize {
        self.engine
            .session()
            .options()
            .max_payload
            .clamp(1, u16::MAX as usize)
    }

    /// Read up to `len` bytes at `addr`.
    ///
    /// The result is shorter than `len` when the remote stopped early. An
    /// error is returned only when the very first block fails.
    pub fn read_memory(&mut self, addr: u64, len: usize) -> ClientResult<Vec<u8>> {
        self.require_context()?;
        let block = self.block_size();
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let want = (len - out.len()).min(block);
            let reply = self.engine.send_recv(&Request::MemRead {
                addr: addr.wrapping_add(out.len() as u64),
                size: want as u16,
            })?;
            match reply {
                Reply::OkData(data) => {
                    let got = data.len().min(want);
                    out.extend_from_slice(&data[..got]);
                    if got < want {
                        debug!(addr, want, got, "short memory read");
                        break;
                    }
                }
                Reply::Error(source) if out.is_empty() => {
                    return Err(ClientError::Remote { op: "memrd", source })
                }
                other => {
                    debug!(addr, done = out.len(), ?other, "memory read stopped");
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Read exactly `buf.len()` bytes or fail with
    /// [`ClientError::ShortTransfer`].
    pub fn read_memory_exact(&mut self, addr: u64, buf: &mut [u8]) -> ClientResult<()> {
        let data = self.read_memory(addr, buf.len())?;
        if data.len() != buf.len() {
            return Err(ClientError::ShortTransfer {
                expected: buf.len(),
                got: data.len(),
            });
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    /// Write `data` at `addr`. Returns the number of bytes written.
    pub fn write_memory(&mut self, addr: u64, data: &[u8]) -> ClientResult<usize> {
        self.require_context()?;
        let block = self.block_size();
        let mut done = 0;
        for chunk in data.chunks(block) {
            let reply = self.engine.send_recv(&Request::MemWrite {
                addr: addr.wrapping_add(done as u64),
                data: chunk.to_vec(),
            })?;
            let written = match reply {
                Reply::Ok | Reply::OkData(_) => chunk.len(),
                Reply::OkStatus(n) => usize::try_from(n).unwrap_or(0).min(chunk.len()),
                Reply::Error(source) if done == 0 => {
                    return Err(ClientError::Remote { op: "memwr", source })
                }
                Reply::Error(err) => {
                    debug!(addr, done, error = %err, "memory write stopped");
                    break;
                }
            };
            done += written;
            if written < chunk.len() {
                break;
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{reply_to, MockHandle, MockRemote};
    use crate::process::Ptid;
    use crate::session::SessionOptions;
    use std::sync::{Arc, Mutex};
    use tether_proto::{Packet, RemoteError, RemoteErrorCode};

    /// Remote backed by a flat byte image starting at address 0.
    fn target(max_payload: usize, image: Arc<Mutex<Vec<u8>>>) -> (RemoteTarget, MockHandle) {
        let responder = move |p: &Packet| {
            let mut mem = image.lock().unwrap();
            let reply = match Request::decode(p).unwrap() {
                Request::MemRead { addr, size } => {
                    let start = (addr as usize).min(mem.len());
                    let end = (start + size as usize).min(mem.len());
                    if start == mem.len() {
                        Reply::Error(RemoteError {
                            code: RemoteErrorCode::Generic,
                            errno: 14,
                            local: false,
                        })
                    } else {
                        Reply::OkData(mem[start..end].to_vec())
                    }
                }
                Request::MemWrite { addr, data } => {
                    let start = addr as usize;
                    let end = (start + data.len()).min(mem.len());
                    let n = end.saturating_sub(start);
                    mem[start..end].copy_from_slice(&data[..n]);
                    Reply::OkStatus(n as i32)
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
        let mut t = RemoteTarget::new(Box::new(remote), options);
        t.select(Ptid::new(1, 1)).unwrap();
        (t, handle)
    }

    fn image(len: usize) -> Arc<Mutex<Vec<u8>>> {
        Arc::new(Mutex::new((0..len).map(|i| i as u8).collect()))
    }

    #[test]
    fn memory_read_is_chunked() {
        let (mut t, handle) = target(400, image(2048));
        let data = t.read_memory(0, 1024).unwrap();
        assert_eq!(data.len(), 1024);
        assert!(data.iter().enumerate().all(|(i, b)| *b == i as u8));
        let sizes: Vec<u16> = handle
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::MemRead { size, .. } => Some(size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![400, 400, 224]);
    }

    #[test]
    fn memory_read_with_blocks_beyond_default_frame_size() {
        let (mut t, handle) = target(8000, image(16384));
        let data = t.read_memory(0, 8000).unwrap();
        assert_eq!(data.len(), 8000);
        assert!(data.iter().enumerate().all(|(i, b)| *b == i as u8));
        assert_eq!(handle.count(tether_proto::packet::cmd::MEMRD), 1);
    }

    #[test]
    fn memory_read_stops_at_short_block() {
        let (mut t, _h) = target(100, image(250));
        assert_eq!(t.read_memory(0, 400).unwrap().len(), 250);
    }

    #[test]
    fn memory_read_first_block_error_fails() {
        let (mut t, _h) = target(100, image(16));
        assert!(matches!(
            t.read_memory(16, 4),
            Err(ClientError::Remote { op: "memrd", .. })
        ));
        let mut buf = [0u8; 32];
        assert!(matches!(
            t.read_memory_exact(0, &mut buf),
            Err(ClientError::ShortTransfer {
                expected: 32,
                got: 16
            })
        ));
    }

    #[test]
    fn memory_write_is_chunked() {
        let mem = Arc::new(Mutex::new(vec![0u8; 64]));
        let (mut t, handle) = target(16, Arc::clone(&mem));
        let data: Vec<u8> = (1..=40).collect();
        assert_eq!(t.write_memory(8, &data).unwrap(), 40);
        assert_eq!(&mem.lock().unwrap()[8..48], &data[..]);
        assert_eq!(handle.count(tether_proto::packet::cmd::MEMWR), 3);
    }

    #[test]
    fn memory_write_reports_partial() {
        let mem = Arc::new(Mutex::new(vec![0u8; 20]));
        let (mut t, _h) = target(16, mem);
        assert_eq!(t.write_memory(10, &[7; 32]).unwrap(), 10);
    }

    #[test]
    fn memory_needs_context() {
        let (remote, _h) = MockRemote::new(|p| vec![reply_to(p, Reply::Ok)]);
        let mut t = RemoteTarget::new(Box::new(remote), SessionOptions::default());
        assert!(matches!(t.read_memory(0, 4), Err(ClientError::NoContext)));
        assert!(matches!(t.write_memory(0, &[1]), Err(ClientError::NoContext)));
    }
}
