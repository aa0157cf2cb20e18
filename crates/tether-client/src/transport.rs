//! Byte-stream transports: serial lines, ptys and spawned helper processes.
//!
//! The engine only needs a byte at a time with a timeout, so every transport
//! keeps a small read buffer and polls its descriptor.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, BaudRate, SetArg};
use tracing::{debug, info};

/// Trait abstracting the link to the remote agent.
pub trait Transport: std::fmt::Debug + Send {
    /// Read one byte, waiting at most `timeout` (forever when `None`).
    ///
    /// Returns `Ok(None)` when the timeout expired or the wait was
    /// interrupted by a signal.
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push buffered output to the remote.
    fn flush(&mut self) -> io::Result<()>;

    /// Release the link.
    fn close(&mut self) -> io::Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

const READ_CHUNK: usize = 512;

/// Read-side buffer shared by the descriptor-backed transports.
#[derive(Debug, Default)]
struct ReadBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl ReadBuffer {
    fn pop(&mut self) -> Option<u8> {
        let byte = self.buf.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }

    /// Wait for the descriptor and refill. `Ok(false)` means nothing arrived.
    fn fill<R: Read + AsFd>(&mut self, src: &mut R, timeout: Option<Duration>) -> io::Result<bool> {
        if !wait_readable(src.as_fd(), timeout)? {
            return Ok(false);
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = match src.read(&mut chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "remote closed the connection",
                ))
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(e) => return Err(e),
        };
        self.buf.clear();
        self.buf.extend_from_slice(&chunk[..n]);
        self.pos = 0;
        Ok(true)
    }

    fn read_byte<R: Read + AsFd>(
        &mut self,
        src: &mut R,
        timeout: Option<Duration>,
    ) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pop() {
            return Ok(Some(byte));
        }
        if self.fill(src, timeout)? {
            Ok(self.pop())
        } else {
            Ok(None)
        }
    }
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        // Longer waits wake early; callers loop on `None` anyway.
        Some(d) => PollTimeout::from(d.as_millis().min(u16::MAX as u128) as u16),
    }
}

fn wait_readable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> io::Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, poll_timeout(timeout)) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(io::Error::from(e)),
    }
}

fn baud_rate(baud: u32) -> io::Result<BaudRate> {
    Ok(match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {other}"),
            ))
        }
    })
}

/// A serial device or pty opened by path.
#[derive(Debug)]
pub struct SerialTransport {
    path: PathBuf,
    file: File,
    rx: ReadBuffer,
}

impl SerialTransport {
    /// Open `path` read/write and, when it is a terminal, put it in raw mode
    /// at `baud` (left unchanged when `None`).
    pub fn open(path: &Path, baud: Option<u32>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(path)?;

        match termios::tcgetattr(&file) {
            Ok(mut attrs) => {
                termios::cfmakeraw(&mut attrs);
                if let Some(baud) = baud {
                    termios::cfsetspeed(&mut attrs, baud_rate(baud)?).map_err(io::Error::from)?;
                }
                termios::tcsetattr(&file, SetArg::TCSANOW, &attrs).map_err(io::Error::from)?;
                info!(path = %path.display(), ?baud, "serial line configured");
            }
            Err(Errno::ENOTTY) => debug!(path = %path.display(), "not a terminal, skipping termios"),
            Err(e) => return Err(io::Error::from(e)),
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            rx: ReadBuffer::default(),
        })
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        self.rx.read_byte(&mut self.file, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.file, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.file)
    }

    fn close(&mut self) -> io::Result<()> {
        match termios::tcdrain(&self.file) {
            Ok(()) | Err(Errno::ENOTTY) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A helper process whose stdin/stdout carry the protocol.
#[derive(Debug)]
pub struct SpawnTransport {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    rx: ReadBuffer,
}

impl SpawnTransport {
    /// Spawn `program` with `args`.
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "helper has no stdout"))?;
        info!(program, pid = child.id(), "spawned transport helper");
        Ok(Self {
            command: program.to_string(),
            child,
            stdin,
            stdout,
            rx: ReadBuffer::default(),
        })
    }

    fn stdin(&mut self) -> io::Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "helper stdin closed"))
    }
}

impl Transport for SpawnTransport {
    fn read_byte(&mut self, timeout: Option<Duration>) -> io::Result<Option<u8>> {
        self.rx.read_byte(&mut self.stdout, timeout)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stdin()?.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping stdin lets a well-behaved helper exit on EOF.
        self.stdin = None;
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
            self.child.wait()?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("helper {}", self.command)
    }
}
