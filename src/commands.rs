//! One-shot commands run against a connected target.

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use tracing::debug;

use tether_client::{Ptid, RemoteTarget, WaitStatus};
use tether_proto::{SignalDisposition, TargetSignal};

/// Print the negotiated revision and what the remote supports.
pub(crate) fn info(target: &mut RemoteTarget) -> Result<()> {
    println!("protocol   {}", target.version());
    println!("endian     {:?}", target.session().endian());
    if let Some(flags) = target.cpu_flags() {
        println!("cpu flags  {flags:#010x}");
    }
    println!("{:#?}", target.capabilities());
    Ok(())
}

pub(crate) fn ps(target: &mut RemoteTarget) -> Result<()> {
    let processes = target.list_processes().context("process listing failed")?;
    println!("{:>8}  {:>7}  NAME", "PID", "THREADS");
    for p in processes {
        println!("{:>8}  {:>7}  {}", p.pid, p.num_threads, p.name);
    }
    Ok(())
}

pub(crate) fn threads(target: &mut RemoteTarget, pid: i32) -> Result<()> {
    target
        .attach(pid)
        .with_context(|| format!("failed to attach to {pid}"))?;
    let result = print_threads(target);
    target.detach().context("detach failed")?;
    result
}

fn print_threads(target: &mut RemoteTarget) -> Result<()> {
    target.update_threads().context("thread listing failed")?;
    let current = target.current();
    for thread in target.process().threads.values() {
        let marker = match current {
            Some(p) if p.tid == thread.tid => '*',
            _ => ' ',
        };
        println!(
            "{marker} {:>5}  {:<12}  {}",
            thread.tid,
            format!("{:?}", thread.state),
            thread.name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Load `program` and run it to completion, reporting every stop.
pub(crate) fn run(target: &mut RemoteTarget, program: &str, args: &[String]) -> Result<i32> {
    let ptid = target
        .load(program, args)
        .with_context(|| format!("failed to load {program}"))?;
    println!("loaded {program} as {ptid}");

    let mut signal = TargetSignal::NONE;
    loop {
        let outcome = target
            .resume_and_wait(None, false, signal)
            .context("lost the target while it was running")?;
        debug!(?outcome, "wait returned");
        signal = TargetSignal::NONE;
        match outcome.status {
            WaitStatus::Exited(code) => {
                println!("[{}] exited with status {code}", outcome.ptid);
                return Ok(code);
            }
            WaitStatus::Signalled(sig) => {
                println!("[{}] killed by {sig}", outcome.ptid);
                return Ok(128 + sig.0);
            }
            WaitStatus::Stopped(sig) if sig == TargetSignal::INT => {
                report_stop(target, outcome.ptid, sig);
                target.kill().context("kill failed")?;
                return Ok(130);
            }
            WaitStatus::Stopped(sig) => {
                report_stop(target, outcome.ptid, sig);
                if passes(&target.session().options().signals, sig) {
                    signal = sig;
                }
            }
            WaitStatus::Forked { child_pid, .. } => println!("[{}] forked {child_pid}", outcome.ptid),
            WaitStatus::Execd { path } => println!("[{}] exec {path}", outcome.ptid),
            WaitStatus::Loaded | WaitStatus::Spurious => {}
        }
    }
}

/// Whether `sig` is handed back to the debuggee on resume, honouring the
/// configured overrides.
fn passes(overrides: &[(TargetSignal, SignalDisposition)], sig: TargetSignal) -> bool {
    overrides
        .iter()
        .find(|(s, _)| *s == sig)
        .map_or_else(|| SignalDisposition::default_for(sig), |(_, d)| *d)
        .pass
}

fn report_stop(target: &mut RemoteTarget, ptid: Ptid, sig: TargetSignal) {
    match target.read_pc() {
        Ok(pc) => println!("[{ptid}] stopped ({sig}) at {pc:#x}"),
        Err(e) => println!("[{ptid}] stopped ({sig}), pc unavailable: {e}"),
    }
}

pub(crate) fn attach(target: &mut RemoteTarget, pid: i32) -> Result<()> {
    let ptid = target
        .attach(pid)
        .with_context(|| format!("failed to attach to {pid}"))?;
    report_stop(target, ptid, TargetSignal::NONE);
    target.detach().context("detach failed")
}

pub(crate) fn read(target: &mut RemoteTarget, pid: i32, addr: u64, len: usize) -> Result<()> {
    target
        .attach(pid)
        .with_context(|| format!("failed to attach to {pid}"))?;
    let data = target.read_memory(addr, len);
    target.detach().context("detach failed")?;
    let data = data.with_context(|| format!("cannot read memory at {addr:#x}"))?;
    print!("{}", hexdump(addr, &data));
    if data.len() < len {
        bail!("short read: {} of {len} bytes", data.len());
    }
    Ok(())
}

pub(crate) fn regs(target: &mut RemoteTarget, pid: i32) -> Result<()> {
    target
        .attach(pid)
        .with_context(|| format!("failed to attach to {pid}"))?;
    let registers = target.read_all_registers();
    target.detach().context("detach failed")?;
    for (desc, bytes) in registers.context("register read failed")? {
        let hex: String = bytes.iter().rev().map(|b| format!("{b:02x}")).collect();
        println!("{:<8} {hex}", desc.name);
    }
    Ok(())
}

/// Sixteen bytes per line: address, hex, printable ASCII.
pub(crate) fn hexdump(addr: u64, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:016x}  ", addr + (i * 16) as u64);
        for col in 0..16 {
            match line.get(col) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
        }
        out.push(' ');
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

/// Parse `0x`-prefixed hex or plain decimal.
pub(crate) fn parse_addr(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}
