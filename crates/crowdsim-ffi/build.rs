use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let out_path = PathBuf::from(&crate_dir).join("crowdsim.h");

    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("CROWDSIM_H")
        .with_cpp_compat(true)
        .with_documentation(true)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(out_path);
        }
        Err(e) => println!("cargo:warning=Unable to generate bindings: {}", e),
    }
}
