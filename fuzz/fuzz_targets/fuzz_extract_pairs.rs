#![no_main]

use filterquery::Engine;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(query) = std::str::from_utf8(data) else {
        return;
    };
    let len = query.chars().count();
    let engine = Engine::default();

    for pair in engine.extract_pairs(query) {
        let position = pair.position;
        assert!(position.key_start <= position.key_end && position.key_end < len);
        if let (Some(start), Some(end)) = (position.value_start, position.value_end) {
            assert!(start <= end && end < len);
        }
        if pair.is_complete {
            assert!(!pair.operator.is_empty());
        }
    }

    let items = engine.convert_expression_to_filters(query);
    let rendered = engine.convert_filters_to_expression(&filterquery::FilterTree::new(items));
    let _ = engine.extract_pairs(&rendered.expression);
});
