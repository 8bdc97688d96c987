//! Generated code for the external secret store plugin protocol.
//!
//! Compiled by `build.rs` from `proto/ess/v1alpha1/ess.proto`.

#[allow(clippy::all, missing_docs)]
pub mod v1alpha1 {
    tonic::include_proto!("ess.proto.v1alpha1");
}
