//! OPC-style container assembly.
//!
//! A package is an arena of [`Part`]s plus a list of typed [`Relationship`]
//! edges keyed by part path. [`PackageAssembler::seal`] validates the graph
//! and serializes everything into a ZIP archive with a content-type manifest
//! and one relationships file per source.
//!
//! Relationships are buffered and checked at seal time, so parts and edges
//! can be added in any order. Sealing never produces partial output: every
//! structural error is reported before the archive writer starts.
//!
//! # Examples
//!
//! ```
//! use eyp::package::{PackageAssembler, RelationshipSource};
//!
//! let mut assembler = PackageAssembler::new();
//! assembler.add_part("UstYazi/belge.pdf", "application/pdf", b"%PDF-1.7".to_vec())?;
//! assembler.add_relationship(
//!     RelationshipSource::Root,
//!     "UstYazi/belge.pdf",
//!     eyp::package::relationships::REL_PRIMARY,
//! );
//! let bytes = assembler.seal()?;
//! assert_eq!(&bytes[..2], b"PK");
//! # Ok::<(), eyp::Error>(())
//! ```

pub mod archive;
pub mod content_types;
pub mod reader;
pub mod relationships;

pub use archive::CompressionLevel;
pub use reader::PackageReader;

use crate::digest::Digest;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

/// Content type declared for the container as a whole.
pub const EYP_CONTENT_TYPE: &str = "application/eyp";

/// Package-level attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Unique package identifier
    pub id: Uuid,
    /// Creation time, also used as the timestamp of every archive entry
    pub created_at: DateTime<Utc>,
    /// Container-level content type, stored as the archive comment
    pub content_type: String,
}

impl PackageInfo {
    /// Fresh identifier, current time, default content type.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4(), Utc::now())
    }

    pub fn new(id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            content_type: EYP_CONTENT_TYPE.to_string(),
        }
    }
}

/// A named byte blob inside the container.
#[derive(Debug, Clone)]
pub struct Part {
    path: String,
    mime_type: String,
    data: Vec<u8>,
    digest: OnceLock<Digest>,
}

impl Part {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// SHA-256 of the part bytes, computed on first use.
    pub fn digest(&self) -> Digest {
        *self.digest.get_or_init(|| Digest::of(&self.data))
    }

    /// Digest if it has already been computed.
    pub fn cached_digest(&self) -> Option<Digest> {
        self.digest.get().copied()
    }
}

/// Origin of a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipSource {
    /// The package itself (`_rels/.rels`)
    Root,
    /// A part, by path
    Part(String),
}

/// Directed, typed edge from a source to a target part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Identifier, unique within the source's relationship list
    pub id: String,
    pub source: RelationshipSource,
    /// Target part path
    pub target: String,
    /// Relationship type URI
    pub relation_type: String,
}

/// Check a part path: relative, forward slashes, no traversal, no
/// names reserved for generated package files.
pub fn validate_part_path(path: &str) -> Result<()> {
    let invalid = || Error::InvalidPartPath(path.to_string());

    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(invalid());
    }
    if path.contains("..") || path.contains('\\') {
        return Err(invalid());
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "_rels") {
        return Err(invalid());
    }
    if path.eq_ignore_ascii_case(content_types::CONTENT_TYPES_PATH) {
        return Err(invalid());
    }
    Ok(())
}

/// Builds a package from parts and relationships.
#[derive(Debug, Clone)]
pub struct PackageAssembler {
    info: PackageInfo,
    compression_level: CompressionLevel,
    /// Parts in creation order
    parts: Vec<Part>,
    /// Part path -> index into `parts`
    index: HashMap<String, usize>,
    /// Edges in insertion order
    relationships: Vec<Relationship>,
    /// Next relationship number per source
    next_id: HashMap<RelationshipSource, usize>,
}

impl Default for PackageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageAssembler {
    /// Create an assembler with a generated identifier and the current time.
    pub fn new() -> Self {
        Self::with_info(PackageInfo::generate())
    }

    pub fn with_info(info: PackageInfo) -> Self {
        Self {
            info,
            compression_level: CompressionLevel::DEFAULT,
            parts: Vec::new(),
            index: HashMap::new(),
            relationships: Vec::new(),
            next_id: HashMap::new(),
        }
    }

    /// Set the ZIP compression level.
    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Add a part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartPath`] for absolute or traversing paths and
    /// [`Error::DuplicatePart`] when the path is already taken.
    pub fn add_part(
        &mut self,
        path: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<()> {
        let path = path.into();
        validate_part_path(&path)?;
        if self.index.contains_key(&path) {
            return Err(Error::DuplicatePart(path));
        }

        debug!(part = %path, size = data.len(), "adding part");
        self.index.insert(path.clone(), self.parts.len());
        self.parts.push(Part {
            path,
            mime_type: mime_type.into(),
            data,
            digest: OnceLock::new(),
        });
        Ok(())
    }

    /// Add a relationship and return its identifier.
    ///
    /// The target is resolved when the package is sealed.
    pub fn add_relationship(
        &mut self,
        source: RelationshipSource,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> String {
        let counter = self.next_id.entry(source.clone()).or_insert(0);
        *counter += 1;
        let id = format!("rId{}", counter);

        self.relationships.push(Relationship {
            id: id.clone(),
            source,
            target: target.into(),
            relation_type: relation_type.into(),
        });
        id
    }

    pub fn part(&self, path: &str) -> Option<&Part> {
        self.index.get(path).and_then(|&idx| self.parts.get(idx))
    }

    /// Parts in creation order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Check that every relationship resolves and every part is reachable.
    ///
    /// # Errors
    ///
    /// [`Error::DanglingRelationship`] for an edge whose source or target part
    /// is missing, [`Error::UnreachablePart`] for the first part (in creation
    /// order) that no path from the root reaches.
    pub fn validate(&self) -> Result<()> {
        for rel in &self.relationships {
            if let RelationshipSource::Part(source) = &rel.source {
                if !self.index.contains_key(source) {
                    return Err(Error::DanglingRelationship {
                        id: rel.id.clone(),
                        target: source.clone(),
                    });
                }
            }
            if !self.index.contains_key(&rel.target) {
                return Err(Error::DanglingRelationship {
                    id: rel.id.clone(),
                    target: rel.target.clone(),
                });
            }
        }

        let mut adjacency: HashMap<&RelationshipSource, Vec<&str>> = HashMap::new();
        for rel in &self.relationships {
            adjacency.entry(&rel.source).or_default().push(&rel.target);
        }

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<RelationshipSource> = VecDeque::new();
        queue.push_back(RelationshipSource::Root);
        while let Some(source) = queue.pop_front() {
            for &target in adjacency.get(&source).into_iter().flatten() {
                if reached.insert(target) {
                    queue.push_back(RelationshipSource::Part(target.to_string()));
                }
            }
        }

        if let Some(part) = self.parts.iter().find(|p| !reached.contains(p.path())) {
            return Err(Error::UnreachablePart(part.path.clone()));
        }
        Ok(())
    }

    /// Relationships grouped by source, sources in a stable order: root
    /// first, then parts in creation order.
    pub(crate) fn relationships_by_source(&self) -> Vec<(RelationshipSource, Vec<&Relationship>)> {
        let mut grouped: BTreeMap<usize, (RelationshipSource, Vec<&Relationship>)> = BTreeMap::new();
        for rel in &self.relationships {
            let order = match &rel.source {
                RelationshipSource::Root => 0,
                RelationshipSource::Part(path) => self.index.get(path).map_or(usize::MAX, |i| i + 1),
            };
            grouped
                .entry(order)
                .or_insert_with(|| (rel.source.clone(), Vec::new()))
                .1
                .push(rel);
        }
        grouped.into_values().collect()
    }

    /// Validate and serialize the package.
    ///
    /// # Errors
    ///
    /// Any structural error from [`validate`](Self::validate); in that case
    /// no bytes are produced.
    pub fn seal(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let content_types = content_types::content_types_xml(&self.parts);
        let rels: HashMap<RelationshipSource, String> = self
            .relationships_by_source()
            .into_iter()
            .map(|(source, list)| (source, relationships::relationships_xml(&list)))
            .collect();

        let mut entries: Vec<(String, &[u8])> = Vec::with_capacity(self.parts.len() * 2 + 2);
        entries.push((
            content_types::CONTENT_TYPES_PATH.to_string(),
            content_types.as_bytes(),
        ));
        if let Some(root) = rels.get(&RelationshipSource::Root) {
            entries.push((relationships::rels_path(&RelationshipSource::Root), root.as_bytes()));
        }
        for part in &self.parts {
            entries.push((part.path.clone(), part.data()));
            let source = RelationshipSource::Part(part.path.clone());
            if let Some(xml) = rels.get(&source) {
                entries.push((relationships::rels_path(&source), xml.as_bytes()));
            }
        }

        let bytes = archive::write_archive(&entries, &self.info, self.compression_level)?;
        debug!(
            package = %self.info.id,
            parts = self.parts.len(),
            size = bytes.len(),
            "package sealed"
        );
        Ok(bytes)
    }
}
