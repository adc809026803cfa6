// src/template/mod.rs
pub mod fields;
pub mod xml;

use crate::data::Payload;
use crate::error::TemplateError;
use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::{Cursor, Read, Seek, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};
use xml::XmlDocument;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_CAPACITY_HINT: u64 = 16 * 1024 * 1024;

/// Content types of the parts that may carry merge fields.
const MAIN_DOCUMENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
    "application/vnd.ms-word.document.macroEnabled.main+xml",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml",
    "application/vnd.ms-word.template.macroEnabledTemplate.main+xml",
];
const HEADER_FOOTER_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml",
];
const SETTINGS_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml";

/// One archive entry, kept verbatim.
#[derive(Debug)]
struct Entry {
    name: String,
    compression: CompressionMethod,
    last_modified: Option<zip::DateTime>,
    unix_mode: Option<u32>,
    is_dir: bool,
    data: Vec<u8>,
}

/// A loaded `.docx` template.
///
/// Filling a document consumes it, so every output starts from
/// [`Template::instantiate`].
#[derive(Debug)]
pub struct Template {
    path: PathBuf,
    entries: Arc<[Entry]>,
    parts: Vec<(String, XmlDocument)>,
    settings: Option<(String, XmlDocument)>,
    fields: Vec<String>,
}

/// A fresh, mergeable copy of a [`Template`].
#[derive(Debug)]
pub struct MergeDocument {
    entries: Arc<[Entry]>,
    parts: Vec<(String, XmlDocument)>,
    settings: Option<(String, XmlDocument)>,
}

/// A filled-in document, ready to be written.
#[derive(Debug)]
pub struct RenderedDocument {
    entries: Arc<[Entry]>,
    replaced: HashMap<String, Vec<u8>>,
}

impl Template {
    #[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open template {:?}", path))?;
        let mut archive = ZipArchive::new(file)
            .map_err(TemplateError::NotAnArchive)
            .with_context(|| format!("Failed to read template {:?}", path))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(TemplateError::NotAnArchive)
                .with_context(|| format!("Failed to access entry #{} in {:?}", i, path))?;
            let mut data = Vec::with_capacity(capacity_hint(entry.size()));
            entry
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to read {} from {:?}", entry.name(), path))?;
            entries.push(Entry {
                name: entry.name().to_string(),
                compression: entry.compression(),
                last_modified: entry.last_modified(),
                unix_mode: entry.unix_mode(),
                is_dir: entry.is_dir(),
                data,
            });
        }

        let content_types = find_entry(&entries, CONTENT_TYPES)
            .ok_or_else(|| TemplateError::MissingPart(CONTENT_TYPES.to_string()))?;
        let overrides = parse_overrides(&content_types.data)?;

        let mut main = Vec::new();
        let mut others = Vec::new();
        let mut settings = None;
        for (part_name, content_type) in overrides {
            if MAIN_DOCUMENT_TYPES.contains(&content_type.as_str()) {
                main.push(part_name);
            } else if HEADER_FOOTER_TYPES.contains(&content_type.as_str()) {
                others.push(part_name);
            } else if content_type == SETTINGS_TYPE {
                settings = Some(part_name);
            }
        }
        if main.is_empty() {
            return Err(TemplateError::MissingPart("main document".to_string()).into());
        }

        let mut parts = Vec::with_capacity(main.len() + others.len());
        for name in main.into_iter().chain(others) {
            let doc = load_part(&entries, &name)?;
            debug!(part = %name, "loaded mergeable part");
            parts.push((name, doc));
        }
        let settings = match settings {
            Some(name) => {
                let doc = load_part(&entries, &name)?;
                Some((name, doc))
            }
            None => None,
        };

        let mut fields = Vec::new();
        for (_, doc) in &parts {
            fields::collect_fields(&doc.nodes, &mut fields);
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries: entries.into(),
            parts,
            settings,
            fields,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distinct merge-field names, in order of first appearance.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// A new independent instance to merge one row into.
    pub fn instantiate(&self) -> MergeDocument {
        MergeDocument {
            entries: Arc::clone(&self.entries),
            parts: self.parts.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl MergeDocument {
    /// Substitute `payload` into every merge field and detach the document
    /// from its mail-merge data source.
    pub fn merge(mut self, payload: &Payload) -> Result<RenderedDocument> {
        let mut replaced = HashMap::new();

        for (name, doc) in &mut self.parts {
            fields::merge_fields(&mut doc.nodes, payload);
            let bytes = doc
                .to_bytes()
                .with_context(|| format!("Failed to serialise part {}", name))?;
            replaced.insert(name.clone(), bytes);
        }

        if let Some((name, mut doc)) = self.settings.take() {
            if let Some(root) = doc.root_mut() {
                root.children
                    .retain(|n| !matches!(n, xml::Node::Element(e) if e.is("w:mailMerge")));
            }
            let bytes = doc
                .to_bytes()
                .with_context(|| format!("Failed to serialise part {}", name))?;
            replaced.insert(name, bytes);
        }

        Ok(RenderedDocument {
            entries: self.entries,
            replaced,
        })
    }
}

impl RenderedDocument {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_archive(Cursor::new(&mut buf))?;
        Ok(buf)
    }

    /// Write to `path`, failing if the file already exists.
    ///
    /// The archive is built in a temporary file next to `path` and only
    /// moved into place once complete, so a failed write leaves nothing
    /// behind.
    pub fn write_new<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        self.write_archive(tmp.as_file_mut())
            .with_context(|| format!("Failed to write {:?}", path))?;
        tmp.persist_noclobber(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to create {:?}", path))?;
        Ok(())
    }

    fn write_archive<W: Write + Seek>(&self, sink: W) -> Result<()> {
        let mut out = ZipWriter::new(sink);
        for entry in self.entries.iter() {
            let method = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let mut opts = SimpleFileOptions::default().compression_method(method);
            if let Some(dt) = entry.last_modified {
                opts = opts.last_modified_time(dt);
            }
            if let Some(mode) = entry.unix_mode {
                opts = opts.unix_permissions(mode);
            }

            if entry.is_dir {
                out.add_directory(entry.name.as_str(), opts)?;
                continue;
            }
            let data = self
                .replaced
                .get(&entry.name)
                .map(Vec::as_slice)
                .unwrap_or(&entry.data);
            out.start_file(entry.name.as_str(), opts)?;
            out.write_all(data)?;
        }
        out.finish()?;
        Ok(())
    }
}

/// Buffer size to reserve for an entry, trusting its header only up to a point.
fn capacity_hint(declared: u64) -> usize {
    declared.min(MAX_CAPACITY_HINT) as usize
}

fn find_entry<'a>(entries: &'a [Entry], name: &str) -> Option<&'a Entry> {
    entries.iter().find(|e| e.name == name)
}

fn load_part(entries: &[Entry], name: &str) -> Result<XmlDocument> {
    let entry =
        find_entry(entries, name).ok_or_else(|| TemplateError::MissingPart(name.to_string()))?;
    XmlDocument::parse(&entry.data)
        .map_err(|source| TemplateError::Xml {
            part: name.to_string(),
            source,
        })
        .map_err(Into::into)
}

/// `(entry name, content type)` for each `<Override>` in `[Content_Types].xml`.
fn parse_overrides(data: &[u8]) -> Result<Vec<(String, String)>> {
    let doc = XmlDocument::parse(data).map_err(|source| TemplateError::Xml {
        part: CONTENT_TYPES.to_string(),
        source,
    })?;
    let Some(root) = doc.root() else {
        return Ok(Vec::new());
    };
    Ok(root
        .child_elements()
        .filter(|e| e.is("Override"))
        .filter_map(|e| {
            let part = e.attribute("PartName")?;
            let content_type = e.attribute("ContentType")?;
            Some((part.trim_start_matches('/').to_string(), content_type))
        })
        .collect())
}
