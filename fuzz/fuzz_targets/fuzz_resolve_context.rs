#![no_main]

use filterquery::{Engine, EnginePolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&cursor, rest)) = data.split_first() else {
        return;
    };
    let Ok(query) = std::str::from_utf8(rest) else {
        return;
    };
    let cursor = usize::from(cursor);

    for policy in [EnginePolicy::hardened(), EnginePolicy::strict().with_max_context_depth(1)] {
        let Ok(engine) = Engine::new(policy) else {
            return;
        };
        let ctx = engine.resolve_context(query, cursor);
        if let Some(index) = ctx.value_index {
            let pair = ctx.current_pair.as_ref();
            assert!(pair.is_some_and(|pair| index < pair.values_position.len()));
        }
    }
});
