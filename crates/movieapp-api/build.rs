fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the movieapp gRPC service proto with a bundled protoc
    let mut config = prost_build::Config::new();
    config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/movieapp.proto"],
        &["proto"],
    )?;

    Ok(())
}
