// flutter_rust_bridge bindings are generated out of band:
//   flutter_rust_bridge_codegen generate

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");

    // Android builds link against libc++_shared so symbols like
    // __cxa_pure_virtual resolve on all ABIs.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
