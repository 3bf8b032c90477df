use serde::Serialize;
use yapl::{Engine, EngineOptions, MemoryLoader, ToValue, Value, Vars};

#[derive(Vars)]
struct Persona {
    name: String,
    #[vars("style")]
    tone: String,
    #[vars(rename = "years")]
    age: u32,
    #[vars(ignore)]
    #[allow(dead_code)]
    secret: String,
    skills: Vec<String>,
    manager: Option<String>,
    team: Team,
}

#[derive(Vars)]
struct Team {
    name: String,
    size: i64,
}

#[derive(Vars)]
struct Wrapper<T> {
    inner: T,
}

#[derive(Serialize)]
struct Ticket {
    id: u64,
    title: String,
    tags: Vec<&'static str>,
}

fn persona() -> Persona {
    Persona {
        name: "Ada".to_string(),
        tone: "formal".to_string(),
        age: 36,
        secret: "hunter2".to_string(),
        skills: vec!["math".to_string(), "poetry".to_string()],
        manager: None,
        team: Team {
            name: "research".to_string(),
            size: 4,
        },
    }
}

fn engine() -> Engine {
    Engine::with_loader(EngineOptions::new(), MemoryLoader::new())
}

#[test]
fn test_derive_builds_map() {
    let value = persona().to_value();
    let Value::Map(map) = &value else {
        panic!("expected a map, got {:?}", value);
    };
    assert_eq!(map.get("name"), Some(&Value::Str("Ada".into())));
    assert_eq!(map.get("style"), Some(&Value::Str("formal".into())));
    assert_eq!(map.get("years"), Some(&Value::Int(36)));
    assert_eq!(map.get("manager"), Some(&Value::Null));
    assert!(!map.contains_key("tone"));
    assert!(!map.contains_key("secret"));
}

#[tokio::test]
async fn test_derived_vars_in_template() {
    let src = r#"{{ name }}/{{ style }}/{{ years }}/{{ secret | default("hidden") }}/{{ skills }}/{{ team.name }}:{{ team.size }}"#;
    let out = engine().render_string(src, &persona(), None).await.unwrap();
    assert_eq!(out.content, "Ada/formal/36/hidden/math,poetry/research:4");
}

#[tokio::test]
async fn test_generic_struct() {
    let vars = Wrapper { inner: 7_i64 };
    let out = engine()
        .render_string("{{ inner }}", &vars, None)
        .await
        .unwrap();
    assert_eq!(out.content, "7");
}

#[tokio::test]
async fn test_serde_struct_via_to_value() {
    let ticket = Ticket {
        id: 42,
        title: "Login fails".to_string(),
        tags: vec!["auth", "urgent"],
    };
    let vars = yapl::to_value(&ticket).unwrap();
    let src = "#{{ id }} {{ title }}{% for t in tags %} [{{ t }}]{% endfor %}";
    let out = engine().render_string(src, &vars, None).await.unwrap();
    assert_eq!(out.content, "#42 Login fails [auth] [urgent]");
}
