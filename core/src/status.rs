//! Outcome codes recovered from call errors
//!
//! Errors reaching the end of a call are often wrapped by several layers
//! (application error enums, `anyhow` context, transport I/O errors). The
//! canonical gRPC code lives on whichever [`tonic::Status`] sits somewhere in
//! that chain.

use std::error::Error;
use tonic::Code;

/// Codes that are pre-initialized as series before any call is seen
///
/// Application-level codes first, then the ones the gRPC framework itself
/// produces.
pub const EXPECTED_CODES: &[Code] = &[
    Code::Ok,
    Code::InvalidArgument,
    Code::PermissionDenied,
    Code::FailedPrecondition,
    Code::Cancelled,
    Code::Unknown,
    Code::DeadlineExceeded,
    Code::ResourceExhausted,
    Code::Unimplemented,
    Code::Internal,
    Code::Unavailable,
    Code::Unauthenticated,
];

/// Canonical name of a code, as used in metric labels
///
/// These are the names from the gRPC status code registry (`OK`,
/// `Canceled`), which differ from `tonic::Code`'s `Debug` output.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Code of the first [`tonic::Status`] in `err`'s source chain
///
/// `std::io::Error` hides its payload from `source()`, so it is opened with
/// `get_ref()` before moving on.
pub fn find_code(err: &(dyn Error + 'static)) -> Option<Code> {
    let mut current = Some(err);

    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<tonic::Status>() {
            return Some(status.code());
        }

        if let Some(inner) = e
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
        {
            let inner: &(dyn Error + 'static) = inner;
            if let Some(code) = find_code(inner) {
                return Some(code);
            }
        }

        current = e.source();
    }

    None
}

/// Outcome code for a completed call
///
/// No error means `Ok`. An error without any status in its chain is
/// reported as `Unknown`, never as `Ok`.
pub fn outcome_code(err: Option<&(dyn Error + 'static)>) -> Code {
    match err {
        None => Code::Ok,
        Some(err) => find_code(err).unwrap_or(Code::Unknown),
    }
}
