#![no_main]

use libfuzzer_sys::fuzz_target;
use vmbridge_core::{FlagDef, FlagPreset, FlagRegistry};

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 16 * 1024 {
        &data[..16 * 1024]
    } else {
        data
    };
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut registry = FlagRegistry::from_defs([
        FlagDef::bool("FeatureA", false),
        FlagDef::int("Threshold", 10),
    ])
    .expect("static table");

    for preset in [
        FlagPreset::parse_spec(text).ok(),
        FlagPreset::from_json_str(text).ok(),
    ]
    .into_iter()
    .flatten()
    {
        let report = preset.apply(&mut registry);
        assert!(report.applied + report.unknown.len() <= preset.bools.len() + preset.ints.len());
    }
});
