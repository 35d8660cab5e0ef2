//! In-memory package fixtures for tests.

use crate::encoding::encode_utf16le;
use crate::layout::LAYOUT_ENTRY_PATH;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One page, one line chart at (10, 20) sized 200x150 on layer 1.
pub const SALES_LAYOUT: &str = r#"{"sections":[{"displayName":"Sales","width":1280,"height":720,"visualContainers":[{"config":"{\"name\":\"Chart1\",\"singleVisual\":{\"visualType\":\"lineChart\"},\"layouts\":[{\"position\":{\"x\":10,\"y\":20,\"width\":200,\"height\":150,\"z\":1}}]}"}]}]}"#;

#[derive(Debug, Default)]
pub struct PackageBuilder {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entries a report package usually carries, with `layout` encoded
    /// as UTF-16LE.
    pub fn report(layout: &str) -> Self {
        Self::new()
            .entry("[Content_Types].xml", br#"<?xml version="1.0"?><Types/>"#.to_vec())
            .stored_entry("Version", encode_utf16le("1.28"))
            .stored_entry("DataModel", (0..=255u8).cycle().take(4096).collect())
            .entry("Report/StaticResources/SharedResources/BaseThemes/CY24SU10.json", b"{}".to_vec())
            .layout(layout)
    }

    pub fn layout(self, layout: &str) -> Self {
        self.entry(LAYOUT_ENTRY_PATH, encode_utf16le(layout))
    }

    pub fn entry(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.entries.push((path.to_owned(), bytes, CompressionMethod::Deflated));
        self
    }

    pub fn stored_entry(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.entries.push((path.to_owned(), bytes, CompressionMethod::Stored));
        self
    }

    /// # Panics
    ///
    /// Panics if the in-memory archive cannot be written.
    pub fn build(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (path, bytes, method) in self.entries {
            let options = SimpleFileOptions::default().compression_method(method);
            writer.start_file(path.as_str(), options).expect("fixture entry should start");
            writer.write_all(&bytes).expect("fixture entry should be written");
        }

        writer.finish().expect("fixture archive should finish").into_inner()
    }
}
