// Build script to compile protobuf files into Rust code.
//
// The .proto sources are parsed with protox, so no system `protoc` is
// needed. Server and client stubs are both generated: the server crate
// serves AuthService and the integration tests drive it with the client.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/gatehouse.proto");

    let descriptors = protox::compile(["proto/gatehouse.proto"], ["proto"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(descriptors)?;

    Ok(())
}
