//! Saves every project as one JSON document in a directory.

use std::path::PathBuf;

use pairwise_priority::ports::{ProjectSnapshot, ProjectStore};

use crate::prio::*;

pub struct JsonFileStore {
    root: PathBuf,
}

fn persistence(message: String) -> PriorityError {
    PriorityError::Persistence { message }
}

impl JsonFileStore {
    /// Opens a store, creating the directory if needed.
    pub fn open(root: &str) -> PrioResult<JsonFileStore> {
        fs::create_dir_all(root).context(WritingFileSnafu { path: root })?;
        Ok(JsonFileStore {
            root: PathBuf::from(root),
        })
    }

    fn path_of(&self, id: &ProjectId) -> PathBuf {
        self.root.join(format!("{}.json", slug(&id.0)))
    }
}

impl ProjectStore for JsonFileStore {
    fn load(&self, id: &ProjectId) -> PriorityResult<Option<ProjectSnapshot>> {
        let p = self.path_of(id);
        if !p.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&p)
            .map_err(|e| persistence(format!("reading {}: {}", p.display(), e)))?;
        let snapshot: ProjectSnapshot = serde_json::from_str(&contents)
            .map_err(|e| persistence(format!("parsing {}: {}", p.display(), e)))?;
        Ok(Some(snapshot))
    }

    // The document is written next to its final location, then renamed over it.
    fn save(&self, snapshot: &ProjectSnapshot) -> PriorityResult<()> {
        let p = self.path_of(&snapshot.id);
        let tmp = p.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(snapshot)
            .map_err(|e| persistence(format!("serializing {}: {}", snapshot.id, e)))?;
        fs::write(&tmp, contents)
            .map_err(|e| persistence(format!("writing {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &p)
            .map_err(|e| persistence(format!("replacing {}: {}", p.display(), e)))?;
        debug!("Saved {} to {}", snapshot.id, p.display());
        Ok(())
    }

    fn list(&self) -> PriorityResult<Vec<ProjectId>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| persistence(format!("listing {}: {}", self.root.display(), e)))?;
        let mut res: Vec<ProjectId> = Vec::new();
        for entry in entries {
            let p = entry
                .map_err(|e| persistence(format!("listing {}: {}", self.root.display(), e)))?
                .path();
            if p.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&p)
                .map_err(|e| persistence(format!("reading {}: {}", p.display(), e)))?;
            match serde_json::from_str::<ProjectSnapshot>(&contents) {
                Ok(s) => res.push(s.id),
                Err(e) => warn!("Skipping {}: {}", p.display(), e),
            }
        }
        res.sort();
        Ok(res)
    }
}
