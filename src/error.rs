use core::fmt;

/// Raw status word reported by the co-processor.
///
/// Socket commands and notifications carry the chip's signed `SOCK_ERR_*` codes;
/// receive notifications reuse the same word for the delivered length. Nothing of
/// this type is handed to applications, [`SockError`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeStatus(pub i16);

impl NativeStatus {
    pub const OK: Self = Self(0);
    pub const INVALID_ADDRESS: Self = Self(-1);
    pub const ADDR_ALREADY_IN_USE: Self = Self(-2);
    pub const MAX_TCP_SOCK: Self = Self(-3);
    pub const MAX_UDP_SOCK: Self = Self(-4);
    pub const INVALID_ARG: Self = Self(-6);
    pub const MAX_LISTEN_SOCK: Self = Self(-7);
    pub const INVALID: Self = Self(-9);
    pub const ADDR_IS_REQUIRED: Self = Self(-11);
    pub const CONN_ABORTED: Self = Self(-12);
    pub const TIMEOUT: Self = Self(-13);
    pub const BUFFER_FULL: Self = Self(-14);

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn into_result(self) -> Result<(), SockError> {
        match SockError::from_native(self) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SockError {
    InvalidArgument,
    AddressFamilyNotSupported,
    ProtocolNotSupported,
    OutOfResources,
    AddressInUse,
    Again,
    TimedOut,
    ConnectionAborted,
    DestinationRequired,
    AddressNotAvailable,
    Unknown,
}

impl SockError {
    /// Maps a chip status onto the adapter taxonomy; `None` for success.
    pub const fn from_native(status: NativeStatus) -> Option<Self> {
        let err = match status.0 {
            0 => return None,
            -1 | -6 | -9 => Self::InvalidArgument,
            -2 => Self::AddressInUse,
            -3 | -4 | -7 | -14 => Self::OutOfResources,
            -11 => Self::DestinationRequired,
            -12 => Self::ConnectionAborted,
            -13 => Self::TimedOut,
            _ => Self::Unknown,
        };
        Some(err)
    }

    /// Like [`SockError::from_native`] for a status already known to be a
    /// failure. A stray success code maps to `Unknown`.
    pub const fn from_failure(status: NativeStatus) -> Self {
        match Self::from_native(status) {
            Some(err) => err,
            None => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::AddressFamilyNotSupported => "af_not_supported",
            Self::ProtocolNotSupported => "proto_not_supported",
            Self::OutOfResources => "out_of_resources",
            Self::AddressInUse => "addr_in_use",
            Self::Again => "again",
            Self::TimedOut => "timed_out",
            Self::ConnectionAborted => "conn_aborted",
            Self::DestinationRequired => "dest_addr_required",
            Self::AddressNotAvailable => "addr_not_available",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for SockError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    InvalidState,
    InvalidCredentials,
}

impl LinkError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::InvalidCredentials => "invalid_credentials",
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for LinkError {}
