//! Register layouts of the supported target architectures.
//!
//! The remote moves registers as opaque regset blobs; a layout says where
//! each named register sits inside them.

use std::fmt;

use tether_proto::Regset;

use crate::capabilities::RemoteCapabilities;

/// CPU family reported in the process-load record (ELF machine numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cpu {
    X86,
    X86_64,
    Arm,
    Aarch64,
    Other(i32),
}

impl Cpu {
    pub fn from_tag(tag: i32) -> Self {
        match tag {
            3 => Cpu::X86,
            62 => Cpu::X86_64,
            40 => Cpu::Arm,
            183 => Cpu::Aarch64,
            other => Cpu::Other(other),
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            Cpu::X86 => 3,
            Cpu::X86_64 => 62,
            Cpu::Arm => 40,
            Cpu::Aarch64 => 183,
            Cpu::Other(tag) => tag,
        }
    }

    /// Register layout for this CPU, if one is known.
    pub fn layout(self) -> Option<&'static dyn RegisterLayout> {
        match self {
            Cpu::X86 => Some(&X86),
            Cpu::X86_64 => Some(&X86_64),
            Cpu::Arm => Some(&ARM),
            Cpu::Aarch64 => Some(&AARCH64),
            Cpu::Other(_) => None,
        }
    }
}

/// Where one register lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDesc {
    pub name: &'static str,
    pub regset: Regset,
    /// Byte offset inside the regset.
    pub offset: u16,
    pub size: u16,
}

impl RegisterDesc {
    pub const fn new(name: &'static str, regset: Regset, offset: u16, size: u16) -> Self {
        Self {
            name,
            regset,
            offset,
            size,
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }
}

/// Architecture-specific register knowledge.
pub trait RegisterLayout: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Pointer size in bytes.
    fn word_size(&self) -> usize;

    /// Size of `regset` as the remote transfers it; 0 when unsupported.
    fn regset_size(&self, regset: Regset, caps: &RemoteCapabilities) -> usize;

    /// All registers the remote exposes.
    fn registers(&self, caps: &RemoteCapabilities) -> Vec<RegisterDesc>;

    /// Name of the program counter.
    fn pc(&self) -> &'static str;

    fn find(&self, name: &str, caps: &RemoteCapabilities) -> Option<RegisterDesc> {
        self.registers(caps).into_iter().find(|r| r.name == name)
    }
}

/// Consecutive general registers of equal size.
fn sequential(names: &[&'static str], size: u16) -> Vec<RegisterDesc> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| RegisterDesc::new(*name, Regset::General, i as u16 * size, size))
        .collect()
}

/// Float registers named by `names`, spaced `stride` apart from `base`.
fn vector(names: &[&'static str], base: u16, stride: u16, size: u16) -> Vec<RegisterDesc> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| RegisterDesc::new(*name, Regset::Float, base + i as u16 * stride, size))
        .collect()
}

const ST: [&str; 8] = ["st0", "st1", "st2", "st3", "st4", "st5", "st6", "st7"];

const XMM: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

const D: [&str; 32] = [
    "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12", "d13", "d14",
    "d15", "d16", "d17", "d18", "d19", "d20", "d21", "d22", "d23", "d24", "d25", "d26", "d27",
    "d28", "d29", "d30", "d31",
];

const V: [&str; 32] = [
    "v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "v10", "v11", "v12", "v13", "v14",
    "v15", "v16", "v17", "v18", "v19", "v20", "v21", "v22", "v23", "v24", "v25", "v26", "v27",
    "v28", "v29", "v30", "v31",
];

/// FXSAVE area shared by both x86 flavours.
fn fxsave(xmm: &[&'static str]) -> Vec<RegisterDesc> {
    let mut regs = vec![
        RegisterDesc::new("fcw", Regset::Float, 0, 2),
        RegisterDesc::new("fsw", Regset::Float, 2, 2),
        RegisterDesc::new("mxcsr", Regset::Float, 24, 4),
    ];
    regs.extend(vector(&ST, 32, 16, 10));
    regs.extend(vector(xmm, 160, 16, 16));
    regs
}

const FXSAVE_SIZE: usize = 512;
const FSAVE_SIZE: usize = 108;

#[derive(Debug)]
pub struct X86Layout;
#[derive(Debug)]
pub struct X86_64Layout;
#[derive(Debug)]
pub struct ArmLayout;
#[derive(Debug)]
pub struct Aarch64Layout;

static X86: X86Layout = X86Layout;
static X86_64: X86_64Layout = X86_64Layout;
static ARM: ArmLayout = ArmLayout;
static AARCH64: Aarch64Layout = Aarch64Layout;

const X86_GENERAL: [&str; 13] = [
    "edi", "esi", "ebp", "exx", "ebx", "edx", "ecx", "eax", "eip", "cs", "eflags", "esp", "ss",
];

impl RegisterLayout for X86Layout {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn word_size(&self) -> usize {
        4
    }

    fn regset_size(&self, regset: Regset, caps: &RemoteCapabilities) -> usize {
        match regset {
            Regset::General => X86_GENERAL.len() * 4,
            Regset::Float if caps.full_x86_float => FXSAVE_SIZE,
            Regset::Float => FSAVE_SIZE,
            Regset::System | Regset::Alt => 0,
        }
    }

    fn registers(&self, caps: &RemoteCapabilities) -> Vec<RegisterDesc> {
        let mut regs = sequential(&X86_GENERAL, 4);
        if caps.full_x86_float {
            regs.extend(fxsave(&XMM[..8]));
        } else {
            regs.push(RegisterDesc::new("fcw", Regset::Float, 0, 2));
            regs.push(RegisterDesc::new("fsw", Regset::Float, 4, 2));
            regs.extend(vector(&ST, 28, 10, 10));
        }
        regs
    }

    fn pc(&self) -> &'static str {
        "eip"
    }
}

const X86_64_GENERAL: [&str; 20] = [
    "rdi", "rsi", "rdx", "r10", "r8", "r9", "rax", "rbx", "rbp", "rcx", "r11", "r12", "r13",
    "r14", "r15", "rip", "cs", "rflags", "rsp", "ss",
];

impl RegisterLayout for X86_64Layout {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn word_size(&self) -> usize {
        8
    }

    fn regset_size(&self, regset: Regset, _caps: &RemoteCapabilities) -> usize {
        match regset {
            Regset::General => X86_64_GENERAL.len() * 8,
            Regset::Float => FXSAVE_SIZE,
            Regset::System | Regset::Alt => 0,
        }
    }

    fn registers(&self, _caps: &RemoteCapabilities) -> Vec<RegisterDesc> {
        let mut regs = sequential(&X86_64_GENERAL, 8);
        regs.extend(fxsave(&XMM));
        regs
    }

    fn pc(&self) -> &'static str {
        "rip"
    }
}

const ARM_GENERAL: [&str; 17] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr",
    "pc", "spsr",
];

impl RegisterLayout for ArmLayout {
    fn name(&self) -> &'static str {
        "arm"
    }

    fn word_size(&self) -> usize {
        4
    }

    fn regset_size(&self, regset: Regset, _caps: &RemoteCapabilities) -> usize {
        match regset {
            Regset::General => ARM_GENERAL.len() * 4,
            Regset::Float => 32 * 8 + 8,
            Regset::System | Regset::Alt => 0,
        }
    }

    fn registers(&self, _caps: &RemoteCapabilities) -> Vec<RegisterDesc> {
        let mut regs = sequential(&ARM_GENERAL, 4);
        regs.extend(vector(&D, 0, 8, 8));
        regs.push(RegisterDesc::new("fpscr", Regset::Float, 256, 4));
        regs
    }

    fn pc(&self) -> &'static str {
        "pc"
    }
}

const AARCH64_GENERAL: [&str; 34] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30", "sp", "pc", "pstate",
];

impl RegisterLayout for Aarch64Layout {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn word_size(&self) -> usize {
        8
    }

    fn regset_size(&self, regset: Regset, _caps: &RemoteCapabilities) -> usize {
        match regset {
            Regset::General => AARCH64_GENERAL.len() * 8,
            Regset::Float => 32 * 16 + 8,
            Regset::System | Regset::Alt => 0,
        }
    }

    fn registers(&self, _caps: &RemoteCapabilities) -> Vec<RegisterDesc> {
        let mut regs = sequential(&AARCH64_GENERAL, 8);
        regs.extend(vector(&V, 0, 16, 16));
        regs.push(RegisterDesc::new("fpsr", Regset::Float, 512, 4));
        regs.push(RegisterDesc::new("fpcr", Regset::Float, 516, 4));
        regs
    }

    fn pc(&self) -> &'static str {
        "pc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProtocolVersion;

    fn caps(major: u8, minor: u8) -> RemoteCapabilities {
        RemoteCapabilities::from_version(ProtocolVersion::new(major, minor))
    }

    #[test]
    fn cpu_tag_round_trip() {
        for cpu in [Cpu::X86, Cpu::X86_64, Cpu::Arm, Cpu::Aarch64, Cpu::Other(8)] {
            assert_eq!(Cpu::from_tag(cpu.tag()), cpu);
        }
        assert!(Cpu::Other(8).layout().is_none());
    }

    #[test]
    fn x86_float_size_depends_on_revision() {
        let layout = Cpu::X86.layout().unwrap();
        assert_eq!(layout.regset_size(Regset::Float, &caps(0, 3)), 108);
        assert_eq!(layout.regset_size(Regset::Float, &caps(0, 4)), 512);
        assert!(layout.find("xmm0", &caps(0, 3)).is_none());
        assert_eq!(layout.find("xmm0", &caps(0, 4)).unwrap().offset, 160);
    }

    #[test]
    fn registers_fit_inside_their_regset() {
        let c = caps(0, 5);
        for cpu in [Cpu::X86, Cpu::X86_64, Cpu::Arm, Cpu::Aarch64] {
            let layout = cpu.layout().unwrap();
            for reg in layout.registers(&c) {
                let size = layout.regset_size(reg.regset, &c);
                assert!(reg.range().end <= size, "{} {} overflows", layout.name(), reg.name);
            }
            assert!(layout.find(layout.pc(), &c).is_some());
        }
    }

    #[test]
    fn x86_64_rip_offset() {
        let reg = X86_64.find("rip", &caps(0, 5)).unwrap();
        assert_eq!(reg.offset, 15 * 8);
        assert_eq!(reg.size, 8);
        assert_eq!(reg.regset, Regset::General);
    }
}
