//! Integration tests for the XML-backed settings map.
//!
//! Every test works on a real file in a temporary directory and checks both
//! what the map reports and what a fresh reader sees on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use settings_map::store::document::Element;
use settings_map::{Document, LoadError, PersistentMap, SchemaError, SettingsError, StoreOptions};
use tempfile::TempDir;

const THEME_ONLY: &str =
    r#"<Root><Variables><StringVariable name="Theme" value="Dark"/></Variables></Root>"#;

fn settings_file(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("settings.xml");
    fs::write(&path, content).expect("write fixture");
    (dir, path)
}

fn saved_document(path: &Path) -> Document {
    let text = fs::read_to_string(path).expect("read saved file");
    Document::parse(&text).expect("saved file must be valid XML")
}

/// `(name, value)` of every `StringVariable` in the saved file, in document order.
fn saved_variables(path: &Path) -> Vec<(String, String)> {
    fn walk(element: &Element, out: &mut Vec<(String, String)>) {
        for child in element.elements() {
            if child.name() == "StringVariable" {
                out.push((
                    child.attribute("name").unwrap_or_default().into_owned(),
                    child.attribute("value").unwrap_or_default().into_owned(),
                ));
            }
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    walk(saved_document(path).root(), &mut out);
    out
}

fn pair(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[test]
fn test_theme_font_scenario() {
    // Arrange
    let (_dir, path) = settings_file(THEME_ONLY);

    // Act / Assert: construct
    let mut map = PersistentMap::open(&path).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("Theme").unwrap(), "Dark");

    // update in place
    map.set("Theme", "Light").unwrap();
    assert_eq!(map.get("Theme").unwrap(), "Light");
    assert_eq!(saved_variables(&path), vec![pair("Theme", "Light")]);

    // insert
    map.set("Font", "Mono").unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(
        saved_variables(&path),
        vec![pair("Theme", "Light"), pair("Font", "Mono")]
    );

    // remove
    assert_eq!(map.remove("Theme").unwrap().as_deref(), Some("Light"));
    assert_eq!(map.len(), 1);
    assert_eq!(saved_variables(&path), vec![pair("Font", "Mono")]);
}

#[test]
fn test_reopen_after_mutations_yields_same_entries() {
    // Arrange
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    map.set("A", "1").unwrap();
    map.set("B", "2").unwrap();
    map.add("C", "3").unwrap();
    map.remove("A").unwrap();
    map.set("Theme", "Solarized").unwrap();
    let expected: HashMap<String, String> = map.as_map().clone();
    drop(map);

    let reopened = PersistentMap::open(&path).unwrap();

    // Assert
    assert_eq!(reopened.as_map(), &expected);
}

#[test]
fn test_reopen_after_clear_is_empty() {
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();
    map.set("Font", "Mono").unwrap();

    map.clear().unwrap();
    let reopened = PersistentMap::open(&path).unwrap();

    assert!(reopened.is_empty());
}

#[test]
fn test_set_same_value_twice_writes_identical_file() {
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    map.set("Font", "Mono").unwrap();
    let first = fs::read(&path).unwrap();
    map.set("Font", "Mono").unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(map.len(), 2);
}

#[test]
fn test_clear_empties_map_and_file_but_keeps_other_content() {
    // Arrange
    let (_dir, path) = settings_file(
        r#"<Root><Display dpi="96"/><Variables><StringVariable name="A" value="1"/><StringVariable name="B" value="2"/></Variables></Root>"#,
    );
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    map.clear().unwrap();

    // Assert
    assert_eq!(map.len(), 0);
    assert!(saved_variables(&path).is_empty());
    let saved = saved_document(&path);
    assert_eq!(
        saved.root().child("Display").unwrap().attribute("dpi").as_deref(),
        Some("96")
    );
    assert!(saved.root().child("Variables").is_some());
}

#[test]
fn test_unrelated_content_survives_every_mutation_kind() {
    // Arrange
    let (_dir, path) = settings_file(
        r#"<Project name="bracket" rev="7">
             <Units length="mm"/>
             <Notes>keep me</Notes>
             <Variables><StringVariable name="Theme" value="Dark"/></Variables>
           </Project>"#,
    );
    let mut map = PersistentMap::open(&path).unwrap();

    let check = |path: &Path| {
        let saved = saved_document(path);
        let root = saved.root();
        assert_eq!(root.name(), "Project");
        assert_eq!(root.attribute("name").as_deref(), Some("bracket"));
        assert_eq!(root.attribute("rev").as_deref(), Some("7"));
        assert_eq!(
            root.child("Units").unwrap().attribute("length").as_deref(),
            Some("mm")
        );
        assert_eq!(root.child("Notes").unwrap().text(), "keep me");
    };

    // Act / Assert
    map.set("Font", "Mono").unwrap();
    check(&path);
    map.remove("Theme").unwrap();
    check(&path);
    map.clear().unwrap();
    check(&path);
}

#[test]
fn test_remove_absent_key_leaves_file_untouched() {
    // Arrange: the fixture has no declaration, so any rewrite would add one
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    let removed = map.remove("nonexistent").unwrap();

    // Assert
    assert_eq!(removed, None);
    assert_eq!(map.len(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), THEME_ONLY);
}

#[test]
fn test_add_duplicate_leaves_map_and_file_unchanged() {
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    let result = map.add("Theme", "Light");

    assert!(matches!(result, Err(SettingsError::DuplicateKey(_))));
    assert_eq!(map.get("Theme").unwrap(), "Dark");
    assert_eq!(fs::read_to_string(&path).unwrap(), THEME_ONLY);
}

#[test]
fn test_open_with_duplicate_names_fails() {
    let (_dir, path) = settings_file(
        r#"<Root><Variables><StringVariable name="A" value="1"/><StringVariable name="A" value="2"/></Variables></Root>"#,
    );

    let result = PersistentMap::open(&path);

    assert!(matches!(result, Err(SettingsError::Schema(_))));
}

#[test]
fn test_batch_writes_once_with_final_state() {
    // Arrange
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    // Act: check the file is untouched mid-batch
    map.batch(|m| {
        m.set("A", "1")?;
        m.set("B", "2")?;
        assert_eq!(fs::read_to_string(&path).unwrap(), THEME_ONLY);
        m.remove("Theme")?;
        Ok(())
    })
    .unwrap();

    // Assert
    assert_eq!(saved_variables(&path), vec![pair("A", "1"), pair("B", "2")]);
}

#[test]
fn test_write_failure_is_reported_after_in_memory_update() {
    // Arrange: open, then make the target path a directory so the write fails
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    // Act
    let err = map.set("Font", "Mono").unwrap_err();

    // Assert
    assert!(err.is_persistence_failure());
    assert!(matches!(err, SettingsError::Write(_)));
    assert_eq!(map.get("Font").unwrap(), "Mono");
}

#[test]
fn test_create_then_populate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.xml");

    let mut map = PersistentMap::create(&path, "Settings", StoreOptions::default()).unwrap();
    map.set("Theme", "Dark").unwrap();

    assert_eq!(saved_document(&path).root().name(), "Settings");
    assert_eq!(saved_variables(&path), vec![pair("Theme", "Dark")]);
}

#[test]
fn test_values_with_markup_characters_round_trip() {
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    map.set("Expr", r#"a < b && c > "d""#).unwrap();
    let reopened = PersistentMap::open(&path).unwrap();

    assert_eq!(reopened.get("Expr").unwrap(), r#"a < b && c > "d""#);
}

#[test]
fn test_prolog_comment_and_processing_instruction_survive_a_save() {
    // Arrange
    let source = "<!-- header comment -->\n<?app-pi data?>\n<Root><Variables/></Root>\n<!-- trailer -->\n";
    let (_dir, path) = settings_file(source);
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    map.set("Font", "Mono").unwrap();

    // Assert
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- header comment -->\n<?app-pi data?>\n\
         <Root><Variables><StringVariable name=\"Font\" value=\"Mono\"/></Variables></Root>\n<!-- trailer -->\n"
    );
}

#[test]
fn test_namespace_prefixes_on_unrelated_elements_survive() {
    // Arrange
    let (_dir, path) = settings_file(
        r#"<c:Root xmlns:c="urn:cad" xmlns:o="urn:o"><o:Thing o:a="1"/><Variables/></c:Root>"#,
    );
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    map.set("Font", "Mono").unwrap();

    // Assert
    let saved = saved_document(&path);
    let thing = saved.root().child("o:Thing").unwrap();
    assert_eq!(saved.root().name(), "c:Root");
    assert_eq!(saved.root().attribute("xmlns:o").as_deref(), Some("urn:o"));
    assert_eq!(thing.attribute("o:a").as_deref(), Some("1"));
    assert_eq!(thing.attribute("a"), None);
}

#[test]
fn test_tab_in_value_is_written_as_character_reference() {
    // Arrange
    let (_dir, path) = settings_file(THEME_ONLY);
    let mut map = PersistentMap::open(&path).unwrap();

    // Act
    map.set("tab", "a\tb").unwrap();

    // Assert: a conforming reader would turn a raw tab into a space
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(r#"<StringVariable name="tab" value="a&#9;b"/>"#), "{text}");
    assert!(!text.contains('\t'));
    let reopened = PersistentMap::open(&path).unwrap();
    assert_eq!(reopened.get("tab").unwrap(), "a\tb");
}

#[test]
fn test_open_with_nested_variable_nodes_fails() {
    let (_dir, path) = settings_file(
        r#"<Root><Variables><StringVariable name="A" value="1"><StringVariable name="B" value="2"/></StringVariable></Variables></Root>"#,
    );

    let result = PersistentMap::open(&path);

    assert!(matches!(
        result,
        Err(SettingsError::Schema(SchemaError::NestedElement { index: 0 }))
    ));
}

#[test]
fn test_create_with_invalid_root_name_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.xml");

    let result = PersistentMap::create(&path, "a b", StoreOptions::default());

    assert!(matches!(
        result,
        Err(SettingsError::Load(LoadError::InvalidName { .. }))
    ));
    assert!(!path.exists());
}
