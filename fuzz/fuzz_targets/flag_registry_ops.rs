#![no_main]

use libfuzzer_sys::fuzz_target;
use vmbridge_core::{FlagDef, FlagKind, FlagRegistry};

// Each op: [selector, name_len, name bytes.., value (4 bytes LE)].
fuzz_target!(|data: &[u8]| {
    let mut registry = FlagRegistry::from_defs([
        FlagDef::bool("FeatureA", false),
        FlagDef::bool("Threshold", true),
        FlagDef::int("Threshold", 10),
    ])
    .expect("static table");
    let total = registry.count(FlagKind::Bool) + registry.count(FlagKind::Int);

    let mut rest = data;
    while rest.len() >= 2 {
        let selector = rest[0];
        let name_len = usize::from(rest[1] % 16);
        rest = &rest[2..];
        if rest.len() < name_len + 4 {
            break;
        }
        let (name, tail) = rest.split_at(name_len);
        let value = i32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        rest = &tail[4..];

        match selector % 4 {
            0 => {
                let hit = registry.set(name, value & 1 == 1);
                assert_eq!(hit, registry.get::<bool>(name).is_some());
            }
            1 => {
                if registry.set(name, value) {
                    assert_eq!(registry.get::<i32>(name), Some(value));
                }
            }
            2 => registry.reset_to_defaults(),
            _ => assert_eq!(registry.snapshot().len(), total),
        }
    }
});
