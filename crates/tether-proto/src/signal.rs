//! Target signal numbering and per-signal dispositions.

use std::fmt;

use nix::sys::signal::Signal;

/// Number of signal slots carried in a disposition table.
pub const SIGNAL_TABLE_LEN: usize = 64;

/// A signal number as the target numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetSignal(pub i32);

impl TargetSignal {
    pub const NONE: Self = Self(0);
    pub const HUP: Self = Self(1);
    pub const INT: Self = Self(2);
    pub const QUIT: Self = Self(3);
    pub const ILL: Self = Self(4);
    pub const TRAP: Self = Self(5);
    pub const ABRT: Self = Self(6);
    pub const EMT: Self = Self(7);
    pub const FPE: Self = Self(8);
    pub const KILL: Self = Self(9);
    pub const BUS: Self = Self(10);
    pub const SEGV: Self = Self(11);
    pub const SYS: Self = Self(12);
    pub const PIPE: Self = Self(13);
    pub const ALRM: Self = Self(14);
    pub const TERM: Self = Self(15);
    pub const USR1: Self = Self(16);
    pub const USR2: Self = Self(17);
    pub const CHLD: Self = Self(18);
    pub const PWR: Self = Self(19);
    pub const WINCH: Self = Self(20);
    pub const URG: Self = Self(21);
    pub const POLL: Self = Self(22);
    pub const STOP: Self = Self(23);
    pub const TSTP: Self = Self(24);
    pub const CONT: Self = Self(25);
    pub const VTALRM: Self = Self(26);
    pub const PROF: Self = Self(27);
    pub const XCPU: Self = Self(28);
    pub const XFSZ: Self = Self(29);

    const NAMED: [(TargetSignal, Option<Signal>, &'static str); 29] = [
        (Self::HUP, Some(Signal::SIGHUP), "SIGHUP"),
        (Self::INT, Some(Signal::SIGINT), "SIGINT"),
        (Self::QUIT, Some(Signal::SIGQUIT), "SIGQUIT"),
        (Self::ILL, Some(Signal::SIGILL), "SIGILL"),
        (Self::TRAP, Some(Signal::SIGTRAP), "SIGTRAP"),
        (Self::ABRT, Some(Signal::SIGABRT), "SIGABRT"),
        (Self::EMT, None, "SIGEMT"),
        (Self::FPE, Some(Signal::SIGFPE), "SIGFPE"),
        (Self::KILL, Some(Signal::SIGKILL), "SIGKILL"),
        (Self::BUS, Some(Signal::SIGBUS), "SIGBUS"),
        (Self::SEGV, Some(Signal::SIGSEGV), "SIGSEGV"),
        (Self::SYS, Some(Signal::SIGSYS), "SIGSYS"),
        (Self::PIPE, Some(Signal::SIGPIPE), "SIGPIPE"),
        (Self::ALRM, Some(Signal::SIGALRM), "SIGALRM"),
        (Self::TERM, Some(Signal::SIGTERM), "SIGTERM"),
        (Self::USR1, Some(Signal::SIGUSR1), "SIGUSR1"),
        (Self::USR2, Some(Signal::SIGUSR2), "SIGUSR2"),
        (Self::CHLD, Some(Signal::SIGCHLD), "SIGCHLD"),
        (Self::PWR, None, "SIGPWR"),
        (Self::WINCH, Some(Signal::SIGWINCH), "SIGWINCH"),
        (Self::URG, Some(Signal::SIGURG), "SIGURG"),
        (Self::POLL, Some(Signal::SIGIO), "SIGPOLL"),
        (Self::STOP, Some(Signal::SIGSTOP), "SIGSTOP"),
        (Self::TSTP, Some(Signal::SIGTSTP), "SIGTSTP"),
        (Self::CONT, Some(Signal::SIGCONT), "SIGCONT"),
        (Self::VTALRM, Some(Signal::SIGVTALRM), "SIGVTALRM"),
        (Self::PROF, Some(Signal::SIGPROF), "SIGPROF"),
        (Self::XCPU, Some(Signal::SIGXCPU), "SIGXCPU"),
        (Self::XFSZ, Some(Signal::SIGXFSZ), "SIGXFSZ"),
    ];

    /// The host signal with the same meaning, if the host has one.
    pub fn to_host(self) -> Option<Signal> {
        Self::NAMED
            .iter()
            .find(|(sig, _, _)| *sig == self)
            .and_then(|(_, host, _)| *host)
    }

    /// The target number for a host signal.
    pub fn from_host(host: Signal) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, h, _)| *h == Some(host))
            .map(|(sig, _, _)| *sig)
    }

    /// Look a signal up by its conventional name (`SIGSEGV` or `segv`).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let wanted = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        Self::NAMED
            .iter()
            .find(|(_, _, n)| *n == wanted)
            .map(|(sig, _, _)| *sig)
    }

    /// Conventional name, or `None` for realtime / unknown numbers.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(sig, _, _)| *sig == self)
            .map(|(_, _, n)| *n)
    }
}

impl fmt::Display for TargetSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "signal {}", self.0),
        }
    }
}

/// What the debugger does when the target receives a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDisposition {
    /// Stop the target and report the signal.
    pub stop: bool,
    /// Print a line when the signal arrives.
    pub print: bool,
    /// Hand the signal to the program when resuming.
    pub pass: bool,
}

impl SignalDisposition {
    const STOP: u8 = 0x01;
    const PRINT: u8 = 0x02;
    const PASS: u8 = 0x04;

    /// Packed byte sent in the disposition table.
    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.stop {
            bits |= Self::STOP;
        }
        if self.print {
            bits |= Self::PRINT;
        }
        if self.pass {
            bits |= Self::PASS;
        }
        bits
    }

    /// Unpack a disposition byte.
    pub fn from_bits(bits: u8) -> Self {
        Self {
            stop: bits & Self::STOP != 0,
            print: bits & Self::PRINT != 0,
            pass: bits & Self::PASS != 0,
        }
    }

    /// Default disposition for `signal`: quiet pass-through for the
    /// housekeeping signals, stop-and-print for everything else.
    pub fn default_for(signal: TargetSignal) -> Self {
        match signal {
            TargetSignal::ALRM
            | TargetSignal::URG
            | TargetSignal::CHLD
            | TargetSignal::WINCH
            | TargetSignal::VTALRM
            | TargetSignal::PROF
            | TargetSignal::POLL => Self {
                stop: false,
                print: false,
                pass: true,
            },
            TargetSignal::TRAP | TargetSignal::INT => Self {
                stop: true,
                print: true,
                pass: false,
            },
            _ => Self {
                stop: true,
                print: true,
                pass: true,
            },
        }
    }
}
