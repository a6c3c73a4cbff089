/// Destination scope of an upload: a record inside a project, or the
/// project itself.
///
/// Everything downstream depends on exactly two capabilities: the parent
/// resource string used by list/generate calls, and the resource name of
/// a file under the parent. The engine itself has no scope branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadParent {
    Record {
        project_id: String,
        record_id: String,
    },
    Project {
        project_id: String,
    },
}

impl UploadParent {
    pub fn record(project_id: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self::Record {
            project_id: project_id.into(),
            record_id: record_id.into(),
        }
    }

    pub fn project(project_id: impl Into<String>) -> Self {
        Self::Project {
            project_id: project_id.into(),
        }
    }

    /// Resource string of the parent itself.
    pub fn parent_string(&self) -> String {
        match self {
            Self::Record {
                project_id,
                record_id,
            } => format!("projects/{project_id}/records/{record_id}"),
            Self::Project { project_id } => format!("projects/{project_id}"),
        }
    }

    /// Resource name of a file at `relative_path` under the parent.
    pub fn resource_name(&self, relative_path: &str) -> String {
        match self {
            Self::Record {
                project_id,
                record_id,
            } => format!("projects/{project_id}/records/{record_id}/files/{relative_path}"),
            Self::Project { project_id } => {
                format!("projects/{project_id}/files/{relative_path}")
            }
        }
    }

    /// Identifier that scopes durable state: the record id when uploading
    /// into a record, else the project id.
    pub fn scope_id(&self) -> &str {
        match self {
            Self::Record { record_id, .. } => record_id,
            Self::Project { project_id } => project_id,
        }
    }

    /// Project the parent belongs to.
    pub fn project_id(&self) -> &str {
        match self {
            Self::Record { project_id, .. } => project_id,
            Self::Project { project_id } => project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_parent_strings() {
        let parent = UploadParent::record("p1", "r1");
        assert_eq!(parent.parent_string(), "projects/p1/records/r1");
        assert_eq!(
            parent.resource_name("logs/run.log"),
            "projects/p1/records/r1/files/logs/run.log"
        );
        assert_eq!(parent.scope_id(), "r1");
        assert_eq!(parent.project_id(), "p1");
    }

    #[test]
    fn project_parent_strings() {
        let parent = UploadParent::project("p1");
        assert_eq!(parent.parent_string(), "projects/p1");
        assert_eq!(parent.resource_name("a.bin"), "projects/p1/files/a.bin");
        assert_eq!(parent.scope_id(), "p1");
    }
}
