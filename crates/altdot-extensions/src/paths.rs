//! Extension path resolution with a read-through memo cache
//!
//! Icon and library lookups happen on every render of every command row in
//! the UI, so resolved locations are memoized. Cache keys are built from
//! immutable inputs (`path` and `is_local` are write-once after creation),
//! which is why no invalidation protocol exists: a miss simply re-queries
//! the database, and `None` results for unknown ids are cached too.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use altdot_core::Result;
use tracing::trace;

use crate::config::ExtensionRoot;
use crate::db::{self, Database};

/// Which on-disk location of an extension is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// The bundle directory itself
    Base,
    /// `<base>/icon`
    Icon,
    /// `<base>/@libs`
    Libs,
}

impl PathKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Icon => "icon",
            Self::Libs => "libs",
        }
    }
}

/// Resolves (and memoizes) extension directories
pub struct PathResolver {
    db: Arc<Database>,
    root: ExtensionRoot,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl PathResolver {
    pub fn new(db: Arc<Database>, root: ExtensionRoot) -> Self {
        Self {
            db,
            root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Base directory given the row's location fields, no DB lookup
    pub fn base_dir_for(&self, extension_id: &str, path: &str, is_local: bool) -> PathBuf {
        if is_local {
            PathBuf::from(path)
        } else {
            self.root.managed_dir(extension_id)
        }
    }

    /// Resolve a location for an extension id, returning `None` when no such
    /// extension exists. Results are cached under
    /// `"ext-path:<id>/<kind>/<subpaths>"`.
    pub fn get_path(
        &self,
        extension_id: &str,
        kind: PathKind,
        subpaths: &[&str],
    ) -> Result<Option<PathBuf>> {
        let key = format!(
            "ext-path:{}/{}/{}",
            extension_id,
            kind.as_str(),
            subpaths.join("/")
        );

        if let Some(cached) = self.cache.lock().expect("path cache poisoned").get(&key) {
            trace!(key, "path cache hit");
            return Ok(cached.clone());
        }

        let location = self
            .db
            .with_conn(|conn| db::get_extension_location(conn, extension_id))?;

        let resolved = location.map(|(path, is_local)| {
            let base = self.base_dir_for(extension_id, &path, is_local);
            let mut dir = match kind {
                PathKind::Base => base,
                PathKind::Icon => base.join("icon"),
                PathKind::Libs => base.join("@libs"),
            };
            for subpath in subpaths {
                dir.push(subpath);
            }
            dir
        });

        self.cache
            .lock()
            .expect("path cache poisoned")
            .insert(key, resolved.clone());
        Ok(resolved)
    }
}
