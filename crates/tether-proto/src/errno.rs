//! Target errno numbering and its translation to the host's.
//!
//! Values up to `ERANGE` (34) are shared by every POSIX system. Above that
//! the target numbers its errors independently, so each one is looked up
//! by name.

use nix::errno::Errno;

/// Highest errno value the target and host agree on.
const COMMON_ERRNO_MAX: i32 = 34;

/// Translate an errno reported by the target into the host's [`Errno`].
///
/// Unknown values come back as [`Errno::UnknownErrno`].
pub fn target_errno_to_host(errno: i32) -> Errno {
    if (0..=COMMON_ERRNO_MAX).contains(&errno) {
        return Errno::from_raw(errno);
    }
    match errno {
        35 => Errno::ENOMSG,
        36 => Errno::EIDRM,
        45 => Errno::EDEADLK,
        46 => Errno::ENOLCK,
        47 => Errno::ECANCELED,
        48 => Errno::ENOTSUP,
        49 => Errno::EDQUOT,
        58 => Errno::EOWNERDEAD,
        60 => Errno::ENOSTR,
        61 => Errno::ENODATA,
        62 => Errno::ETIME,
        63 => Errno::ENOSR,
        66 => Errno::EREMOTE,
        67 => Errno::ENOLINK,
        71 => Errno::EPROTO,
        74 => Errno::EMULTIHOP,
        77 => Errno::EBADMSG,
        78 => Errno::ENAMETOOLONG,
        79 => Errno::EOVERFLOW,
        88 => Errno::EILSEQ,
        89 => Errno::ENOSYS,
        90 => Errno::ELOOP,
        93 => Errno::ENOTEMPTY,
        94 => Errno::EUSERS,
        95 => Errno::ENOTRECOVERABLE,
        103 => Errno::EOPNOTSUPP,
        122 => Errno::ESTALE,
        236 => Errno::EINPROGRESS,
        237 => Errno::EALREADY,
        238 => Errno::ENOTSOCK,
        239 => Errno::EDESTADDRREQ,
        240 => Errno::EMSGSIZE,
        241 => Errno::EPROTOTYPE,
        242 => Errno::ENOPROTOOPT,
        243 => Errno::EPROTONOSUPPORT,
        244 => Errno::ESOCKTNOSUPPORT,
        246 => Errno::EPFNOSUPPORT,
        247 => Errno::EAFNOSUPPORT,
        248 => Errno::EADDRINUSE,
        249 => Errno::EADDRNOTAVAIL,
        250 => Errno::ENETDOWN,
        251 => Errno::ENETUNREACH,
        252 => Errno::ENETRESET,
        253 => Errno::ECONNABORTED,
        254 => Errno::ECONNRESET,
        255 => Errno::ENOBUFS,
        256 => Errno::EISCONN,
        257 => Errno::ENOTCONN,
        258 => Errno::ESHUTDOWN,
        259 => Errno::ETOOMANYREFS,
        260 => Errno::ETIMEDOUT,
        261 => Errno::ECONNREFUSED,
        264 => Errno::EHOSTDOWN,
        265 => Errno::EHOSTUNREACH,
        _ => Errno::UnknownErrno,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_range_passes_through() {
        assert_eq!(target_errno_to_host(1), Errno::EPERM);
        assert_eq!(target_errno_to_host(3), Errno::ESRCH);
        assert_eq!(target_errno_to_host(22), Errno::EINVAL);
        assert_eq!(target_errno_to_host(34), Errno::ERANGE);
    }

    #[test]
    fn divergent_range_is_translated() {
        assert_eq!(target_errno_to_host(89), Errno::ENOSYS);
        assert_eq!(target_errno_to_host(260), Errno::ETIMEDOUT);
        assert_eq!(target_errno_to_host(78), Errno::ENAMETOOLONG);
    }

    #[test]
    fn unmapped_values_are_unknown() {
        assert_eq!(target_errno_to_host(-5), Errno::UnknownErrno);
        assert_eq!(target_errno_to_host(999), Errno::UnknownErrno);
    }
}
