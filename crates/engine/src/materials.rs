use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(String);

impl MaterialId {
    pub fn generate() -> Self {
        MaterialId(Uuid::new_v4().to_string().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub kind: MaterialKind,
    pub path: String,
    pub name: String,
}

/// Catalog of media files referenced by a timeline. Each distinct path is
/// registered once; later registrations return the existing id.
///
/// One registry belongs to one story's synthesis.
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    by_path: HashMap<String, MaterialId>,
    materials: Vec<Material>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: MaterialKind, path: &str) -> MaterialId {
        if let Some(id) = self.by_path.get(path) {
            return id.clone();
        }

        let id = MaterialId::generate();
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());

        self.by_path.insert(path.to_string(), id.clone());
        self.materials.push(Material {
            id: id.clone(),
            kind,
            path: path.to_string(),
            name,
        });
        id
    }

    pub fn get(&self, path: &str) -> Option<&MaterialId> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Materials in registration order.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn of_kind(&self, kind: MaterialKind) -> impl Iterator<Item = &Material> {
        self.materials.iter().filter(move |m| m.kind == kind)
    }

    pub fn into_materials(self) -> Vec<Material> {
        self.materials
    }
}
