#![no_main]
use libfuzzer_sys::fuzz_target;

// Parsing and validation may reject the input but must never panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = phaselock_config::load_toml(data) {
        let _ = cfg.validate();
        if let Some(lut) = cfg.analysis.wavelength_lut.as_ref() {
            let axis = phaselock_config::lut_wavelengths(lut, 64);
            assert_eq!(axis.len(), 64);
        }
    }
});
