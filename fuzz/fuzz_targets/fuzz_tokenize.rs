#![no_main]

use filterquery::{Engine, EnginePolicy, try_tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(query) = std::str::from_utf8(data) else {
        return;
    };
    let len = query.chars().count();

    if let Ok(tokens) = try_tokenize(query) {
        let mut last_stop = None;
        for token in tokens.iter().filter(|token| !token.is_eof()) {
            assert!(token.start <= token.stop && token.stop < len);
            assert!(last_stop.is_none_or(|stop| token.start > stop));
            last_stop = Some(token.stop);
        }
    }

    // Hardened lexing only fails on unterminated quotes.
    let engine = Engine::default();
    let _ = engine.tokenize(query);
    if let Ok(strict) = Engine::new(EnginePolicy::strict()) {
        let _ = strict.tokenize(query);
    }
});
