use crate::error::{Error, ErrorKind};
use keeper_storage::{PackageVersion, VersionId};

/// Collects per-version failures of a batch job.
#[derive(Default)]
pub(crate) struct Failures {
    ids: Vec<VersionId>,
    errors: Vec<Error>,
}

impl Failures {
    pub(crate) fn record(&mut self, version: &PackageVersion, error: Error) {
        tracing::warn!(version_id = %version.id, version = %version.version, error = ?error, "Version failed");
        self.ids.push(version.id.clone());
        self.errors.push(error.raise(ErrorKind::Version {
            id: version.id.clone(),
            version: version.version.clone(),
        }));
    }

    pub(crate) fn len(&self) -> usize {
        self.errors.len()
    }

    /// Failed version ids, and one error with every failure as a child.
    pub(crate) fn finish(self, total: usize) -> (Vec<VersionId>, Option<Error>) {
        if self.errors.is_empty() {
            return (self.ids, None);
        }
        let failed = self.errors.len();
        let error = Error::raise_all(ErrorKind::Incomplete { failed, total }, self.errors);
        (self.ids, Some(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_storage::PackageType;

    #[test]
    fn test_no_failures_no_error() {
        let (ids, error) = Failures::default().finish(3);
        assert!(ids.is_empty());
        assert!(error.is_none());
    }

    #[test]
    fn test_failures_aggregate() {
        let mut failures = Failures::default();
        for id in ["a", "b"] {
            let version = PackageVersion::new(id, PackageType::Maven, "app", "1.0-SNAPSHOT");
            failures.record(&version, Error::from(ErrorKind::NotFound));
        }
        let (ids, error) = failures.finish(5);
        assert_eq!(ids, [VersionId::new("a"), VersionId::new("b")]);
        let error = error.unwrap();
        assert!(matches!(&*error, ErrorKind::Incomplete { failed: 2, total: 5 }));
    }
}
