//! Fatal multi-store inconsistency handling.
//!
//! Once the pipeline has written one store, a failure in a later store
//! leaves the stores disagreeing; no retry can reconcile them without a
//! restart. The process logs and aborts. Under test the panic is catchable
//! (`#[should_panic]`), in production it terminates the process.

use tracing::error;

pub(crate) fn crit(method: &'static str, message: &str) -> ! {
    error!(method, message, "fatal store inconsistency, terminating");
    panic!("fatal store inconsistency in {method}: {message}");
}
