//! Report layout decoding.
//!
//! `Report/Layout` is UTF-16LE JSON. Each section becomes a [`Page`]; each
//! visual container becomes a [`Visual`]. A visual's `config` is a JSON
//! document embedded as a string and is parsed a second time. Any field that
//! is missing or has an unexpected shape falls back to a default, and a
//! broken visual config never fails the page it belongs to.

use crate::container::Container;
use crate::encoding::{decode_text, TextEncoding};
use crate::PbixError;
use report_model::{
    Page, ReportDocument, Visual, DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH, DEFAULT_VISUAL_HEIGHT,
    DEFAULT_VISUAL_WIDTH, UNKNOWN_VISUAL_TYPE,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const LAYOUT_ENTRY_PATH: &str = "Report/Layout";

#[derive(Debug, Default, Deserialize)]
struct RawLayout {
    #[serde(default, deserialize_with = "lenient")]
    sections: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSection {
    #[serde(default, deserialize_with = "lenient")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    width: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    height: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    visual_containers: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVisualContainer {
    #[serde(default, deserialize_with = "lenient")]
    config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVisualConfig {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    single_visual: Option<RawSingleVisual>,
    #[serde(default, deserialize_with = "lenient")]
    layouts: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSingleVisual {
    #[serde(default, deserialize_with = "lenient")]
    visual_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVisualLayout {
    #[serde(default, deserialize_with = "lenient_object")]
    position: Option<RawPosition>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPosition {
    #[serde(default, deserialize_with = "lenient")]
    x: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    y: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    width: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    height: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    z: Option<f64>,
}

/// A value of the wrong JSON type reads as absent instead of failing.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => Ok(T::deserialize(value).ok()),
        _ => Ok(None),
    }
}

fn from_object<T>(value: Value) -> T
where
    T: DeserializeOwned + Default,
{
    match value {
        Value::Object(_) => T::deserialize(value).unwrap_or_default(),
        _ => T::default(),
    }
}

/// Field fallbacks. Empty text and zero numbers count as missing.
pub mod fallback {
    use super::*;

    fn text(value: Option<&str>) -> Option<&str> {
        value.filter(|text| !text.is_empty())
    }

    fn number(value: Option<f64>, default: f64) -> f64 {
        value.filter(|number| *number != 0.0 && number.is_finite()).unwrap_or(default)
    }

    pub fn page_name(display_name: Option<&str>, page_index: usize) -> String {
        text(display_name).map_or_else(|| format!("Página {}", page_index + 1), str::to_owned)
    }

    pub fn page_width(width: Option<f64>) -> f64 {
        number(width, DEFAULT_PAGE_WIDTH)
    }

    pub fn page_height(height: Option<f64>) -> f64 {
        number(height, DEFAULT_PAGE_HEIGHT)
    }

    pub fn visual_name(name: Option<&str>, visual_index: usize) -> String {
        text(name).map_or_else(|| format!("Visual {}", visual_index + 1), str::to_owned)
    }

    pub fn visual_type(visual_type: Option<&str>) -> String {
        text(visual_type).unwrap_or(UNKNOWN_VISUAL_TYPE).to_owned()
    }

    pub fn offset(value: Option<f64>) -> f64 {
        number(value, 0.0)
    }

    pub fn visual_width(width: Option<f64>) -> f64 {
        number(width, DEFAULT_VISUAL_WIDTH)
    }

    pub fn visual_height(height: Option<f64>) -> f64 {
        number(height, DEFAULT_VISUAL_HEIGHT)
    }
}

pub fn read_layout(container: &mut Container, file_name: &str) -> Result<ReportDocument, PbixError> {
    let bytes = match container.read_bytes(LAYOUT_ENTRY_PATH) {
        Ok(bytes) => bytes,
        Err(PbixError::EntryNotFound { .. }) => return Err(PbixError::MissingLayoutEntry),
        Err(err) => return Err(err),
    };

    let text = decode_text(&bytes, TextEncoding::Utf16Le);
    let document = decode_layout(&text, file_name)?;

    tracing::info!(
        file_name,
        pages = document.pages.len(),
        visuals = document.visual_count(),
        layout_bytes = bytes.len(),
        "decoded report layout"
    );

    Ok(document)
}

pub fn decode_layout(text: &str, file_name: &str) -> Result<ReportDocument, PbixError> {
    let value: Value = serde_json::from_str(text).map_err(PbixError::MalformedLayout)?;
    let layout: RawLayout = from_object(value);

    let pages = layout
        .sections
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(page_index, section)| decode_section(page_index, from_object(section)))
        .collect();

    Ok(ReportDocument { file_name: file_name.to_owned(), pages })
}

fn decode_section(page_index: usize, section: RawSection) -> Page {
    let visuals = section
        .visual_containers
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(visual_index, container)| {
            decode_visual(page_index, visual_index, from_object(container))
        })
        .collect();

    Page {
        id: Page::id_for(page_index),
        name: fallback::page_name(section.display_name.as_deref(), page_index),
        width: fallback::page_width(section.width),
        height: fallback::page_height(section.height),
        visuals,
    }
}

fn decode_visual(page_index: usize, visual_index: usize, container: RawVisualContainer) -> Visual {
    let config = parse_visual_config(page_index, visual_index, container.config.as_deref());

    let position = config
        .layouts
        .and_then(|layouts| layouts.into_iter().next())
        .map(from_object::<RawVisualLayout>)
        .and_then(|layout| layout.position)
        .unwrap_or_default();

    let visual_type = config.single_visual.and_then(|single| single.visual_type);

    Visual {
        id: Visual::id_for(page_index, visual_index),
        name: fallback::visual_name(config.name.as_deref(), visual_index),
        visual_type: fallback::visual_type(visual_type.as_deref()),
        x: fallback::offset(position.x),
        y: fallback::offset(position.y),
        width: fallback::visual_width(position.width),
        height: fallback::visual_height(position.height),
        z: fallback::offset(position.z),
    }
}

fn parse_visual_config(page_index: usize, visual_index: usize, config: Option<&str>) -> RawVisualConfig {
    let Some(config) = config.filter(|config| !config.is_empty()) else {
        return RawVisualConfig::default();
    };

    match serde_json::from_str::<Value>(config) {
        Ok(value @ Value::Object(_)) => from_object(value),
        Ok(_) => {
            tracing::warn!(page_index, visual_index, "visual config is not an object, using defaults");
            RawVisualConfig::default()
        }
        Err(err) => {
            tracing::warn!(page_index, visual_index, %err, "unparsable visual config, using defaults");
            RawVisualConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PackageBuilder, SALES_LAYOUT};

    fn visual_config(config: &str) -> String {
        serde_json::json!({ "config": config }).to_string()
    }

    #[test]
    fn decodes_sales_scenario() {
        let doc = decode_layout(SALES_LAYOUT, "sales.pbix").expect("layout should decode");

        assert_eq!(doc.file_name, "sales.pbix");
        assert_eq!(doc.pages.len(), 1);

        let page = &doc.pages[0];
        assert_eq!(page.id, "page_0");
        assert_eq!(page.name, "Sales");
        assert_eq!((page.width, page.height), (1280.0, 720.0));
        assert_eq!(page.visuals.len(), 1);

        let visual = &page.visuals[0];
        assert_eq!(visual.id, "page0_visual0");
        assert_eq!(visual.name, "Chart1");
        assert_eq!(visual.visual_type, "lineChart");
        assert_eq!(
            (visual.x, visual.y, visual.width, visual.height, visual.z),
            (10.0, 20.0, 200.0, 150.0, 1.0)
        );
    }

    #[test]
    fn pages_and_visuals_follow_array_order() {
        let layout = serde_json::json!({
            "sections": [
                { "displayName": "First", "visualContainers": [{}, {}, {}] },
                { "displayName": "Second" },
                { "displayName": "Third", "visualContainers": [{}] },
            ]
        })
        .to_string();

        let doc = decode_layout(&layout, "r.pbix").expect("layout should decode");
        let pages: Vec<(&str, &str)> =
            doc.pages.iter().map(|page| (page.id.as_str(), page.name.as_str())).collect();
        assert_eq!(pages, [("page_0", "First"), ("page_1", "Second"), ("page_2", "Third")]);

        let ids: Vec<&str> = doc.pages[0].visuals.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["page0_visual0", "page0_visual1", "page0_visual2"]);
        assert!(doc.pages[1].visuals.is_empty());
        assert_eq!(doc.pages[2].visuals[0].id, "page2_visual0");

        let again = decode_layout(&layout, "r.pbix").expect("layout should decode");
        assert_eq!(again, doc);
    }

    #[test]
    fn missing_section_fields_use_fallbacks() {
        let layout = r#"{"sections":[{},{"displayName":"","width":0,"height":"tall"}]}"#;
        let doc = decode_layout(layout, "r.pbix").expect("layout should decode");

        assert_eq!(doc.pages[0].name, "Página 1");
        assert_eq!(doc.pages[1].name, "Página 2");
        for page in &doc.pages {
            assert_eq!((page.width, page.height), (1280.0, 720.0));
        }
    }

    #[test]
    fn position_fields_default_independently() {
        let config = r#"{"layouts":[{"position":{"x":5,"y":6,"height":40,"z":2}}]}"#;
        let layout = serde_json::json!({
            "sections": [{ "visualContainers": [{ "config": config }] }]
        })
        .to_string();

        let doc = decode_layout(&layout, "r.pbix").expect("layout should decode");
        let visual = &doc.pages[0].visuals[0];

        assert_eq!((visual.x, visual.y, visual.height, visual.z), (5.0, 6.0, 40.0, 2.0));
        assert_eq!(visual.width, 100.0);
        assert_eq!(visual.name, "Visual 1");
        assert_eq!(visual.visual_type, "unknown");
    }

    #[test]
    fn only_first_layout_entry_is_used() {
        let config = r#"{"layouts":[{"position":{"x":1}},{"position":{"x":99,"width":5}}]}"#;
        let layout = format!(r#"{{"sections":[{{"visualContainers":[{}]}}]}}"#, visual_config(config));

        let doc = decode_layout(&layout, "r.pbix").expect("layout should decode");
        let visual = &doc.pages[0].visuals[0];
        assert_eq!((visual.x, visual.width), (1.0, 100.0));
    }

    // Broken per-visual configs degrade to defaults and never fail the page.
    #[test]
    fn invalid_visual_config_yields_defaulted_visual() {
        let good = r#"{"name":"Good","singleVisual":{"visualType":"card"}}"#;
        let layout = format!(
            r#"{{"sections":[{{"displayName":"P","visualContainers":[{},{},{},{},{}]}}]}}"#,
            visual_config("{not json"),
            visual_config(good),
            visual_config("[1,2,3]"),
            r#"{"config":42}"#,
            r#"{"config":""}"#,
        );

        let doc = decode_layout(&layout, "r.pbix").expect("layout should decode");
        let visuals = &doc.pages[0].visuals;
        assert_eq!(visuals.len(), 5);

        for (index, visual) in visuals.iter().enumerate().filter(|(index, _)| *index != 1) {
            assert_eq!(visual.id, format!("page0_visual{index}"));
            assert_eq!(visual.name, format!("Visual {}", index + 1));
            assert_eq!(visual.visual_type, "unknown");
            assert_eq!(
                (visual.x, visual.y, visual.width, visual.height, visual.z),
                (0.0, 0.0, 100.0, 100.0, 0.0)
            );
        }

        assert_eq!(visuals[1].name, "Good");
        assert_eq!(visuals[1].visual_type, "card");
    }

    #[test]
    fn wrongly_typed_nested_fields_fall_back() {
        let config = r#"{"name":7,"singleVisual":"lineChart","layouts":{"position":{"x":3}}}"#;
        let layout = format!(r#"{{"sections":[{{"visualContainers":[{}]}}]}}"#, visual_config(config));

        let doc = decode_layout(&layout, "r.pbix").expect("layout should decode");
        let visual = &doc.pages[0].visuals[0];
        assert_eq!(visual.name, "Visual 1");
        assert_eq!(visual.visual_type, "unknown");
        assert_eq!(visual.x, 0.0);
    }

    #[test]
    fn layout_without_sections_has_no_pages() {
        for layout in ["{}", "[]", "null", r#"{"sections":"nope"}"#] {
            let doc = decode_layout(layout, "r.pbix").expect("layout should decode");
            assert!(doc.pages.is_empty(), "{layout}");
        }
    }

    #[test]
    fn invalid_top_level_json_is_malformed() {
        let err = decode_layout("{\"sections\": [", "r.pbix").expect_err("should fail");
        assert!(matches!(err, PbixError::MalformedLayout(_)));
    }

    #[test]
    fn read_layout_decodes_utf16_multibyte_names() {
        let config = r#"{"name":"Gráfico de líneas 📈","singleVisual":{"visualType":"lineChart"}}"#;
        let layout = format!(
            r#"{{"sections":[{{"displayName":"Resumen – 売上","visualContainers":[{}]}}]}}"#,
            visual_config(config)
        );
        let package = PackageBuilder::report(&layout).build();

        let mut container = Container::open(package).expect("open should succeed");
        let doc = read_layout(&mut container, "ventas.pbix").expect("layout should decode");

        assert_eq!(doc.pages[0].name, "Resumen – 売上");
        assert_eq!(doc.pages[0].visuals[0].name, "Gráfico de líneas 📈");
    }

    #[test]
    fn read_layout_requires_layout_entry() {
        let package = PackageBuilder::new().entry("DataModel", vec![1, 2, 3]).build();
        let mut container = Container::open(package).expect("open should succeed");

        let err = read_layout(&mut container, "r.pbix").expect_err("should fail");
        assert!(matches!(err, PbixError::MissingLayoutEntry));
    }

    #[test]
    fn utf8_layout_is_rejected_as_malformed() {
        let package = PackageBuilder::new()
            .entry(LAYOUT_ENTRY_PATH, SALES_LAYOUT.as_bytes().to_vec())
            .build();
        let mut container = Container::open(package).expect("open should succeed");

        let err = read_layout(&mut container, "r.pbix").expect_err("should fail");
        assert!(matches!(err, PbixError::MalformedLayout(_)));
    }

    #[test]
    fn fallbacks_treat_zero_and_empty_as_missing() {
        assert_eq!(fallback::page_name(Some(""), 0), "Página 1");
        assert_eq!(fallback::page_name(Some("Ventas"), 4), "Ventas");
        assert_eq!(fallback::page_width(Some(0.0)), 1280.0);
        assert_eq!(fallback::page_width(Some(1920.0)), 1920.0);
        assert_eq!(fallback::page_height(None), 720.0);
        assert_eq!(fallback::visual_name(None, 2), "Visual 3");
        assert_eq!(fallback::visual_type(Some("")), "unknown");
        assert_eq!(fallback::visual_type(Some("slicer")), "slicer");
        assert_eq!(fallback::offset(Some(-12.5)), -12.5);
        assert_eq!(fallback::offset(None), 0.0);
        assert_eq!(fallback::visual_width(Some(0.0)), 100.0);
        assert_eq!(fallback::visual_height(Some(33.3)), 33.3);
    }
}
