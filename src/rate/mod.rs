//! Rate admission control
//!
//! This module decides whether more API requests may be issued in the
//! current quota window, reconciling its cached view against the request
//! ledger and the remote quota endpoint.

mod gate;

pub use gate::RateGate;
