use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let descriptor_path = PathBuf::from(std::env::var("OUT_DIR")?).join("keeper_descriptor.bin");

    // Docker builds copy the proto tree next to the crate; local builds use the workspace root
    let (proto_files, proto_includes) = if std::path::Path::new("./proto/keeper.proto").exists() {
        (
            vec![
                "./proto/auth.proto",
                "./proto/keeper.proto",
                "./proto/envelope.proto",
            ],
            vec!["./proto"],
        )
    } else {
        (
            vec![
                "../../proto/keeper/v1/auth.proto",
                "../../proto/keeper/v1/keeper.proto",
                "../../proto/keeper/v1/envelope.proto",
            ],
            vec!["../../proto"],
        )
    };

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&proto_files, &proto_includes)?;

    if std::path::Path::new("./proto/").exists() {
        println!("cargo:rerun-if-changed=./proto/");
    } else {
        println!("cargo:rerun-if-changed=../../proto/keeper/");
    }

    Ok(())
}
