fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/ess/v1alpha1/ess.proto");

    // Server stubs serve plugin authors and the in-process test plugin.
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/ess/v1alpha1/ess.proto"], &["proto"])?;

    Ok(())
}
