use serde_json::json;
use std::sync::Once;
use yapl::{Engine, EngineOptions, MemoryLoader, Value, WhitespaceOptions, YaplError};

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    });
}

fn engine() -> Engine {
    init_logger();
    Engine::with_loader(EngineOptions::new(), MemoryLoader::new())
}

fn vars(v: serde_json::Value) -> Value {
    yapl::to_value(&v).unwrap()
}

async fn render(source: &str, v: serde_json::Value) -> yapl::Result<String> {
    engine()
        .render_string(source, &vars(v), None)
        .await
        .map(|r| r.content)
}

#[tokio::test]
async fn test_default_filter() {
    let src = r#"{{ x | default("D") }}"#;
    assert_eq!(render(src, json!({})).await.unwrap(), "D");
    assert_eq!(render(src, json!({"x": "V"})).await.unwrap(), "V");
}

#[tokio::test]
async fn test_default_does_not_replace_null_or_empty() {
    let src = r#"[{{ x | default("D") }}]"#;
    assert_eq!(render(src, json!({"x": null})).await.unwrap(), "[]");
    assert_eq!(render(src, json!({"x": ""})).await.unwrap(), "[]");
}

#[tokio::test]
async fn test_equality_condition() {
    let src = "{% if a == b %}T{% else %}F{% endif %}";
    assert_eq!(render(src, json!({"a": 1, "b": 1})).await.unwrap(), "T");
    assert_eq!(render(src, json!({"a": 1, "b": 2})).await.unwrap(), "F");
    assert_eq!(render(src, json!({"a": "x", "b": "x"})).await.unwrap(), "T");
}

#[tokio::test]
async fn test_elif_chain_takes_first_match() {
    let src = "{% if n > 10 %}big{% elif n > 5 %}medium{% elif n > 0 %}small{% else %}none{% endif %}";
    assert_eq!(render(src, json!({"n": 20})).await.unwrap(), "big");
    assert_eq!(render(src, json!({"n": 7})).await.unwrap(), "medium");
    assert_eq!(render(src, json!({"n": 1})).await.unwrap(), "small");
    assert_eq!(render(src, json!({"n": 0})).await.unwrap(), "none");
}

#[tokio::test]
async fn test_logical_operators_and_tests() {
    let src = "{% if user is defined and user.role == \"admin\" or force %}yes{% else %}no{% endif %}";
    assert_eq!(
        render(src, json!({"user": {"role": "admin"}})).await.unwrap(),
        "yes"
    );
    assert_eq!(render(src, json!({})).await.unwrap(), "no");
    assert_eq!(render(src, json!({"force": true})).await.unwrap(), "yes");

    let src = "{% if items is not empty %}has{% endif %}{% if missing is not defined %}-none{% endif %}";
    assert_eq!(render(src, json!({"items": [1]})).await.unwrap(), "has-none");
    assert_eq!(render(src, json!({"items": []})).await.unwrap(), "-none");
}

#[tokio::test]
async fn test_for_over_literal_list() {
    let src = "{% for i in [1, 2, 3] %}{{ i }}{% endfor %}";
    assert_eq!(render(src, json!({})).await.unwrap(), "123");
}

#[tokio::test]
async fn test_for_over_empty_and_missing() {
    let src = "{% for i in items %}{{ i }}{% endfor %}";
    assert_eq!(render(src, json!({"items": []})).await.unwrap(), "");
    assert_eq!(render(src, json!({})).await.unwrap(), "");
}

#[tokio::test]
async fn test_for_over_string_is_runtime_error() {
    let err = render("{% for c in \"abc\" %}{{ c }}{% endfor %}", json!({}))
        .await
        .unwrap_err();
    match err {
        YaplError::Runtime(msg) => assert!(msg.contains("got: string"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_for_over_null_is_runtime_error() {
    let err = render("{% for i in n %}X{% endfor %}", json!({"n": null}))
        .await
        .unwrap_err();
    match err {
        YaplError::Runtime(msg) => assert_eq!(msg, "for loop iterable must be an array, got: null"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_loop_variable_shadows_and_restores() {
    let src = "{% for x in xs %}{{ x }}{% endfor %}{{ x }}";
    assert_eq!(
        render(src, json!({"x": "outer", "xs": [1, 2]})).await.unwrap(),
        "12outer"
    );
}

#[tokio::test]
async fn test_nested_loops_see_outer_variable() {
    let src = "{% for g in groups %}{{ g.name }}:{% for m in g.members %}{{ m }}{% endfor %};{% endfor %}";
    let v = json!({"groups": [
        {"name": "a", "members": ["x", "y"]},
        {"name": "b", "members": []}
    ]});
    assert_eq!(render(src, v).await.unwrap(), "a:xy;b:;");
}

#[tokio::test]
async fn test_property_paths() {
    let src = "{{ user.name }} {{ user.tags[1] }} {{ user.tags.0 }} {{ user[\"name\"] }} [{{ user.nope.deeper }}]";
    let v = json!({"user": {"name": "Ada", "tags": ["math", "poetry"]}});
    assert_eq!(render(src, v).await.unwrap(), "Ada poetry math Ada []");
}

#[tokio::test]
async fn test_scalar_formatting() {
    let src = "{{ flag }} {{ n }} {{ f }} {{ whole }} [{{ nothing }}] {{ list }}";
    let v = json!({"flag": true, "n": 1234567, "f": 2.5, "whole": 3.0, "nothing": null, "list": ["a", 1]});
    assert_eq!(render(src, v).await.unwrap(), "true 1234567 2.5 3 [] a,1");
}

#[tokio::test]
async fn test_comments_and_raw() {
    let src = "a{# hidden {{ x }} #}b{% raw %}{{ kept }}{% endraw %}";
    assert_eq!(render(src, json!({"x": 1})).await.unwrap(), "ab{{ kept }}");
}

#[tokio::test]
async fn test_unclosed_if_is_parse_error() {
    let err = render("{% if a %}open", json!({})).await.unwrap_err();
    match &err {
        YaplError::Parse { message, .. } => assert!(message.contains("'if'"), "{}", message),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.location().is_some());
}

#[tokio::test]
async fn test_mismatched_end_tag_is_parse_error() {
    let err = render("{% for x in xs %}{% endif %}", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, YaplError::Parse { .. }));
}

#[tokio::test]
async fn test_unsupported_filter_is_parse_error() {
    let err = render("{{ name | upper }}", json!({"name": "a"}))
        .await
        .unwrap_err();
    match err {
        YaplError::Parse { message, .. } => assert!(message.contains("upper"), "{}", message),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_plain_text_is_identity_without_whitespace_rules() {
    init_logger();
    let e = Engine::with_loader(
        EngineOptions::new().whitespace(WhitespaceOptions::none()),
        MemoryLoader::new(),
    );
    let src = "  Line one\n\tindented { not a tag }\n\n   trailing   \n";
    let out = e.render_string(src, &(), None).await.unwrap();
    assert_eq!(out.content, src);
}

#[tokio::test]
async fn test_render_is_deterministic() {
    let e = engine();
    let v = vars(json!({"b": 2, "a": 1, "m": {"z": 1, "y": 2}}));
    let src = "{{ a }}{{ b }}{{ m }}{% for i in [1, 2] %}{{ i }}{% endfor %}";
    let first = e.render_string(src, &v, None).await.unwrap();
    let second = e.render_string(src, &v, None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.content, "12{y: 2, z: 1}12");
}

#[tokio::test]
async fn test_concurrent_renders_share_engine() {
    let e = std::sync::Arc::new(Engine::with_loader(
        EngineOptions::new(),
        MemoryLoader::new().with_template("greet.yapl", "hi {{ who }}"),
    ));
    let mut handles = Vec::new();
    for i in 0..8 {
        let e = e.clone();
        handles.push(tokio::spawn(async move {
            let v = vars(json!({"who": i}));
            e.render("greet", &v).await.unwrap().content
        }));
    }
    for (i, h) in handles.into_iter().enumerate() {
        assert_eq!(h.await.unwrap(), format!("hi {}", i));
    }
    assert_eq!(e.cached_templates(), 1);
}
