/// Custom uniffi-bindgen binary for generating language bindings.
///
/// This binary uses the UniFFI bindgen API to generate Python/Kotlin/Swift/Ruby
/// bindings from the compiled tabula-uniffi cdylib.
///
/// Usage:
///   cargo run -p tabula-uniffi --features cli --bin tabula-uniffi-bindgen -- \
///     generate --library -l python -o bindings/python \
///     target/release/libtabula_uniffi.so
fn main() {
    uniffi::uniffi_bindgen_main();
}
