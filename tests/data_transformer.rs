mod common;
use crate::common::builders::{upstream_database, upstream_file};
use crate::common::{init_tracing, RecordingSink};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use spine_items::config::{DataTransformerItemConfig, RawDataTransformerSpecification};
use spine_items::dt::{DataTransformerExecutable, DataTransformerSpecification, FilterSettings};
use spine_items::fs::mock::MockFileSystem;
use spine_items::fs::FileSystem;
use spine_items::item::{ExecutableItem, ItemExecutionFinishState, MessageKind};
use spine_items::resource::ResourceType;

fn specification(value: serde_json::Value) -> Arc<DataTransformerSpecification> {
    let raw: RawDataTransformerSpecification =
        serde_json::from_value(value).expect("raw specification");
    Arc::new(DataTransformerSpecification::try_from(raw).expect("valid specification"))
}

fn rename_unit_to_node() -> Arc<DataTransformerSpecification> {
    specification(json!({
        "name": "unit to node",
        "filter": {
            "type": "entity_class_rename",
            "settings": { "entity_class_name_map": { "unit": "node" } }
        }
    }))
}

fn transformer(
    spec: Option<Arc<DataTransformerSpecification>>,
    fs: &MockFileSystem,
    sink: &RecordingSink,
) -> DataTransformerExecutable {
    DataTransformerExecutable::new(
        "Renamer",
        Path::new("/proj"),
        spec,
        Arc::new(fs.clone()),
        sink.logger("Renamer"),
    )
}

#[tokio::test]
async fn renamer_is_appended_as_shorthand() {
    init_tracing();
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let dt = transformer(Some(rename_unit_to_node()), &fs, &sink);

    let inbound = vec![upstream_database("sqlite:///x.sqlite")];
    assert_eq!(dt.execute(&inbound, &[]).await, ItemExecutionFinishState::Success);

    let forward = dt.output_resources_forward();
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].type_, ResourceType::Database);
    assert_eq!(forward[0].provider_name, "Renamer");
    assert_eq!(forward[0].label, inbound[0].label);
    assert_eq!(
        forward[0].url.as_deref(),
        Some("sqlite:///x.sqlite?spinedbfilter=entity_class_rename:unit:node")
    );
    assert!(!fs.is_file(&dt.data_dir().join("filter_config.json")));
}

#[tokio::test]
async fn configuration_without_shorthand_goes_to_a_file() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let spec = specification(json!({
        "name": "scale",
        "filter": {
            "type": "value_transformer",
            "settings": {
                "instructions": {
                    "unit": { "capacity": [{ "operation": "multiply", "rhs": 2.0 }] }
                }
            }
        }
    }));
    let dt = transformer(Some(spec), &fs, &sink);

    let inbound = vec![upstream_database("postgresql://host/db?sslmode=require")];
    assert_eq!(dt.execute(&inbound, &[]).await, ItemExecutionFinishState::Success);

    let config_path = dt.data_dir().join("filter_config.json");
    let written: serde_json::Value =
        serde_json::from_str(&fs.read_to_string(&config_path).expect("config file")).expect("json");
    assert_eq!(written["type"], "value_transformer");
    assert_eq!(
        written["instructions"]["unit"]["capacity"][0]["operation"],
        "multiply"
    );

    let forward = dt.output_resources_forward();
    assert_eq!(
        forward[0].url.as_deref(),
        Some(
            format!(
                "postgresql://host/db?sslmode=require&spinedbfilter={}",
                config_path.to_string_lossy()
            )
            .as_str()
        )
    );
}

#[tokio::test]
async fn reserved_characters_force_the_file_form() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let spec = Arc::new(DataTransformerSpecification::new(
        "odd names",
        Some(FilterSettings::EntityClassRename {
            name_map: BTreeMap::from([("a:b".to_string(), "c".to_string())]),
        }),
    ));
    let dt = transformer(Some(spec), &fs, &sink);

    let forward = dt
        .rewrite(&[upstream_database("sqlite:///x.sqlite")])
        .expect("rewrite");
    let url = forward[0].url.clone().unwrap_or_default();
    assert!(url.ends_with("filter_config.json"), "{url}");
    assert!(fs.is_file(&dt.data_dir().join("filter_config.json")));
}

#[tokio::test]
async fn only_databases_are_forwarded() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let dt = transformer(Some(rename_unit_to_node()), &fs, &sink);

    let inbound = vec![
        upstream_file(Path::new("/data/a.csv")),
        upstream_database("sqlite:///one.sqlite"),
        upstream_database("sqlite:///two.sqlite"),
    ];
    dt.execute(&inbound, &[]).await;
    let urls: Vec<String> = dt
        .output_resources_forward()
        .into_iter()
        .filter_map(|r| r.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "sqlite:///one.sqlite?spinedbfilter=entity_class_rename:unit:node",
            "sqlite:///two.sqlite?spinedbfilter=entity_class_rename:unit:node",
        ]
    );
}

#[tokio::test]
async fn missing_specification_passes_urls_through() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let dt = transformer(None, &fs, &sink);

    let inbound = vec![upstream_database("sqlite:///x.sqlite")];
    assert_eq!(dt.execute(&inbound, &[]).await, ItemExecutionFinishState::Success);
    assert_eq!(
        dt.output_resources_forward()[0].url.as_deref(),
        Some("sqlite:///x.sqlite")
    );
    assert_eq!(sink.messages(MessageKind::Warning).len(), 1);
}

#[tokio::test]
async fn excluded_transformer_still_rewrites() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let dt = transformer(Some(rename_unit_to_node()), &fs, &sink);

    dt.exclude_execution(&[upstream_database("sqlite:///x.sqlite")], &[])
        .await;
    assert_eq!(
        dt.output_resources_forward()[0].url.as_deref(),
        Some("sqlite:///x.sqlite?spinedbfilter=entity_class_rename:unit:node")
    );
}

#[test]
fn from_dict_resolves_named_specification() {
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let specs = BTreeMap::from([("unit to node".to_string(), rename_unit_to_node())]);

    let config: DataTransformerItemConfig = serde_json::from_value(json!({
        "type": "Data Transformer",
        "specification": "unit to node"
    }))
    .expect("item dict");
    let dt = DataTransformerExecutable::from_dict(
        "Renamer",
        &config,
        Path::new("/proj"),
        &specs,
        Arc::new(fs.clone()),
        sink.logger("Renamer"),
    )
    .expect("valid item");
    assert_eq!(dt.specification().map(|s| s.name()), Some("unit to node"));

    let config: DataTransformerItemConfig =
        serde_json::from_value(json!({ "type": "Data Transformer", "specification": "gone" }))
            .expect("item dict");
    let dt = DataTransformerExecutable::from_dict(
        "Renamer",
        &config,
        Path::new("/proj"),
        &specs,
        Arc::new(fs),
        sink.logger("Renamer"),
    )
    .expect("valid item");
    assert!(dt.specification().is_none());
    assert!(sink
        .messages(MessageKind::Warning)
        .iter()
        .any(|m| m.contains("gone")));
}
