use filterquery::{Engine, FilterItem, FilterTree, FilterValue, Role};

#[test]
fn autocomplete_walk_through_a_clause() {
    let engine = Engine::default();
    let query = "service.name IN ['a', 'b'] AND ";
    assert_eq!(engine.resolve_context(query, 5).role, Role::Key);
    assert_eq!(engine.resolve_context(query, 13).role, Role::Operator);
    let ctx = engine.resolve_context(query, 18);
    assert_eq!(ctx.role, Role::BracketList);
    assert_eq!(ctx.value_index, Some(0));
    assert_eq!(engine.resolve_context(query, query.len()).role, Role::Key);
}

#[test]
fn structured_and_text_views_stay_in_sync() {
    let engine = Engine::default();
    let typed = "service.name = 'api' AND status NOT IN ['error'] AND user_id EXISTS";
    let items = engine.convert_expression_to_filters(typed);
    assert_eq!(items.len(), 3);

    let mut filters = FilterTree::new(items);
    filters.items[0].value = FilterValue::from("web");
    let merged = engine.merge(&filters, Some(typed));
    assert_eq!(
        merged.filter.expression,
        "service.name = 'web' AND status NOT IN ['error'] AND user_id EXISTS"
    );
    assert_eq!(merged.filters.items.len(), 3);
}

#[test]
fn variables_survive_and_can_be_removed() {
    let engine = Engine::default();
    let filters = FilterTree::new(vec![FilterItem::new("env", "=", "$env")]);
    let merged = engine.merge(&filters, Some("service.name = 'api'"));
    assert_eq!(merged.filter.expression, "service.name = 'api' env = $env");

    let cleaned = engine.remove_keys(&merged.filter.expression, &["env"], true);
    assert_eq!(cleaned, "service.name = 'api'");
}

#[test]
fn merge_result_is_json_friendly() {
    let engine = Engine::default();
    let filters = FilterTree::new(vec![FilterItem::new("a", "nin", vec!["x"]).with_id("id-1")]);
    let merged = engine.merge(&filters, None);
    let json = serde_json::to_value(&merged).expect("serialise");
    assert_eq!(json["filter"]["expression"], "a NOT IN ['x']");
    assert_eq!(json["filters"]["items"][0]["op"], "not in");
    assert_eq!(json["filters"]["op"], "AND");
}
