//! Feature gates derived from the negotiated protocol revision.

use crate::session::ProtocolVersion;

/// What the remote can do, stored as plain booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCapabilities {
    /// Environment variables longer than one packet can be sent in parts.
    pub multipart_env: bool,
    /// Thread enumeration can resume from a given thread id.
    pub specific_tid_listing: bool,
    /// Select queries return full thread information.
    pub authoritative_select_query: bool,
    /// Process-unload notifies say whether the process faulted.
    pub faulted_unload: bool,
    /// Thread names can be queried.
    pub thread_names: bool,
    /// The x86 float regset is the full extended-state size.
    pub full_x86_float: bool,
    /// The initial stack address can be queried.
    pub procfs_info: bool,
}

impl RemoteCapabilities {
    pub fn from_version(version: ProtocolVersion) -> Self {
        Self {
            multipart_env: version.at_least(0, 1),
            specific_tid_listing: version.at_least(0, 2),
            authoritative_select_query: version.at_least(0, 2),
            faulted_unload: version.at_least(0, 3),
            thread_names: version.at_least(0, 3),
            full_x86_float: version.at_least(0, 4),
            procfs_info: version.at_least(0, 4),
        }
    }
}
