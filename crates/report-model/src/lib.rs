use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_WIDTH: f64 = 1280.0;
pub const DEFAULT_PAGE_HEIGHT: f64 = 720.0;
pub const DEFAULT_VISUAL_WIDTH: f64 = 100.0;
pub const DEFAULT_VISUAL_HEIGHT: f64 = 100.0;
pub const UNKNOWN_VISUAL_TYPE: &str = "unknown";
pub const DEFAULT_EXPORT_FILE_NAME: &str = "updated-file.pbix";
pub const DEFAULT_USER_NAME: &str = "John Doe";
pub const EXPORT_MIME_TYPE: &str = "application/octet-stream";

const PACKAGE_EXTENSION: &str = ".pbix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub visual_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z: f64,
}

impl Visual {
    pub fn id_for(page_index: usize, visual_index: usize) -> String {
        format!("page{page_index}_visual{visual_index}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub visuals: Vec<Visual>,
}

impl Page {
    pub fn id_for(page_index: usize) -> String {
        format!("page_{page_index}")
    }

    /// Visuals in paint order: lowest `z` first, ties keep layout order.
    pub fn visuals_by_depth(&self) -> Vec<&Visual> {
        let mut visuals: Vec<&Visual> = self.visuals.iter().collect();
        visuals.sort_by(|a, b| a.z.total_cmp(&b.z));
        visuals
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub file_name: String,
    pub pages: Vec<Page>,
}

impl ReportDocument {
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn visual(&self, id: &str) -> Option<&Visual> {
        self.pages.iter().flat_map(|page| page.visuals.iter()).find(|visual| visual.id == id)
    }

    pub fn visual_count(&self) -> usize {
        self.pages.iter().map(|page| page.visuals.len()).sum()
    }

    pub fn default_export_name(&self) -> String {
        let name = self.file_name.as_str();
        let split = name.len().saturating_sub(PACKAGE_EXTENSION.len());

        match name.get(split..) {
            Some(suffix) if suffix.eq_ignore_ascii_case(PACKAGE_EXTENSION) => name[..split].to_owned(),
            _ => name.to_owned(),
        }
    }
}

/// User-entered context text keyed by visual id, in the order it was first saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationSet {
    entries: IndexMap<String, String>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_context(&mut self, visual_id: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(visual_id.into(), text.into());
    }

    pub fn context(&self, visual_id: &str) -> Option<&str> {
        self.entries.get(visual_id).map(String::as_str)
    }

    /// An empty saved string counts as unset for display.
    pub fn has_context(&self, visual_id: &str) -> bool {
        self.context(visual_id).is_some_and(|text| !text.is_empty())
    }

    pub fn clear_context(&mut self, visual_id: &str) -> Option<String> {
        self.entries.shift_remove(visual_id)
    }

    pub fn reset(&mut self) {
        self.entries = IndexMap::new();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }

    pub fn annotated_count(&self, document: &ReportDocument) -> usize {
        document
            .pages
            .iter()
            .flat_map(|page| page.visuals.iter())
            .filter(|visual| self.has_context(&visual.id))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub guid: Uuid,
    pub created_date: String,
    pub name: String,
    pub user: String,
    pub contexts: AnnotationSet,
}

/// A re-serialized package ready to be handed to whoever saves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Exporting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub user_name: String,
    pub output_file_name: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            user_name: DEFAULT_USER_NAME.to_owned(),
            output_file_name: DEFAULT_EXPORT_FILE_NAME.to_owned(),
        }
    }
}
