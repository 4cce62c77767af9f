//! Request and result schemas.
//!
//! Both messages are protobuf-encoded. One stream carries exactly one
//! [`CallData`] from the caller and at most one [`CallResult`] back.

use std::fmt;

use bytes::Bytes;

/// A machine word on the call stack.
pub type Word = u64;

/// A call request: the method to invoke, its arguments, and an opaque body
/// the guest can read while the call runs.
///
/// The target process is not part of the message. It is carried by the
/// stream's protocol path.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallData {
    #[prost(string, tag = "1")]
    pub method: String,

    #[prost(uint64, repeated, tag = "2")]
    pub stack: Vec<Word>,

    #[prost(bytes = "bytes", tag = "3")]
    pub body: Bytes,
}

impl CallData {
    /// Create a request.
    pub fn new(method: impl Into<String>, stack: Vec<Word>, body: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            stack,
            body: body.into(),
        }
    }
}

/// The outcome of a call as seen by the caller.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallResult {
    #[prost(uint64, repeated, tag = "1")]
    pub stack: Vec<Word>,

    #[prost(enumeration = "Status", tag = "2")]
    pub status: i32,

    #[prost(string, tag = "3")]
    pub info: String,
}

impl CallResult {
    /// True if the call completed successfully.
    pub fn is_ok(&self) -> bool {
        self.status() == Status::Ok
    }
}

/// Call status.
///
/// `Unset` is never valid on the wire. A result that reaches the encoder
/// with `Unset` is a bug in whatever produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Unset = 0,
    Ok = 1,
    InvalidRequest = 2,
    RoutingError = 3,
    ProcNotFound = 4,
    InvalidMethod = 5,
    MethodNotFound = 6,
    GuestError = 7,
}

impl Status {
    /// Numeric wire value.
    pub fn as_u16(self) -> u16 {
        self as i32 as u16
    }

    /// Name as used in logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Status::Unset => "unset",
            Status::Ok => "ok",
            Status::InvalidRequest => "invalidRequest",
            Status::RoutingError => "routingError",
            Status::ProcNotFound => "procNotFound",
            Status::InvalidMethod => "invalidMethod",
            Status::MethodNotFound => "methodNotFound",
            Status::GuestError => "guestError",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn status_wire_values() {
        assert_eq!(Status::Unset.as_u16(), 0);
        assert_eq!(Status::Ok.as_u16(), 1);
        assert_eq!(Status::GuestError.as_u16(), 7);
        assert_eq!(Status::try_from(4).ok(), Some(Status::ProcNotFound));
        assert!(Status::try_from(8).is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::ProcNotFound.to_string(), "procNotFound");
        assert_eq!(Status::Unset.to_string(), "unset");
    }

    #[test]
    fn call_data_encoding() {
        let request = CallData::new("echo", vec![0, 1, u64::MAX], b"hello".to_vec());
        let bytes = request.encode_to_vec();
        let decoded = CallData::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.method, "echo");
        assert_eq!(decoded.stack, vec![0, 1, u64::MAX]);
        assert_eq!(decoded.body, Bytes::from_static(b"hello"));
    }

    #[test]
    fn empty_result_decodes_unset() {
        let result = CallResult::decode(&b""[..]).unwrap();
        assert_eq!(result.status(), Status::Unset);
        assert!(!result.is_ok());
        assert!(result.stack.is_empty());
    }

    #[test]
    fn result_status_accessors() {
        let mut result = CallResult::default();
        result.set_status(Status::GuestError);
        result.info = "trap".to_string();

        let decoded = CallResult::decode(result.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.status(), Status::GuestError);
        assert_eq!(decoded.info, "trap");
    }

    #[test]
    fn garbage_is_a_decode_error() {
        // field 1, wire type 7 does not exist
        assert!(CallData::decode(&[0x0f, 0xff][..]).is_err());
    }
}
