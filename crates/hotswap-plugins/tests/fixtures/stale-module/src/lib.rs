//! Exports an API version the current linker refuses and no register entry point.

#[unsafe(no_mangle)]
pub extern "C" fn _hotswap_api_version() -> u32 {
    0
}
