use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let output_dir = PathBuf::from(&crate_dir).join("include");

    println!("cargo:rerun-if-changed=src/ffi.rs");

    // C header for the presentation layer
    let config = cbindgen::Config {
        language: cbindgen::Language::C,
        braces: cbindgen::Braces::SameLine,
        style: cbindgen::Style::Both,
        ..Default::default()
    };

    let bindings = match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => bindings,
        Err(e) => {
            println!("cargo:warning=Unable to generate C bindings: {}", e);
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        println!("cargo:warning=Unable to create {}: {}", output_dir.display(), e);
        return;
    }
    bindings.write_to_file(output_dir.join("tmuxvoice_core.h"));
}
