//! Orchestration of full validation runs.

use std::path::Path;

use crate::archive::ArchiveHandle;
use crate::validation::{validate_archive, ValidationNode, ValidationOptions, VirtualPackageList};
use crate::version::Version;
use crate::ValidationError;

/// Runs recursive validation of package archives and owns the virtual
/// package list for the lifetime of each run.
///
/// One manager may run any number of independent `validate` calls; every
/// call fully resets the virtual package list first, so results never leak
/// between runs. A manager is not meant to be shared across threads for a
/// single run; independent runs use independent instances.
#[derive(Debug, Default)]
pub struct PackageValidationManager {
    options: ValidationOptions,
    virtual_packages: VirtualPackageList,
    outcome: Option<Result<ValidationNode, ValidationError>>,
}

impl PackageValidationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ValidationOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Validates the archive at `path` for existence and ability to be
    /// installed or updated, including every bundled sub-archive. The
    /// outcome (tree or error) is also stored for later retrieval.
    pub fn validate(&mut self, path: &Path) -> crate::Result<()> {
        self.virtual_packages.clear();
        self.outcome = None;

        let outcome = ArchiveHandle::open(path).and_then(|archive| {
            validate_archive(archive, &mut self.virtual_packages, &self.options, 0)
        });

        match outcome {
            Ok(node) => {
                self.outcome = Some(Ok(node));
                Ok(())
            }
            Err(err) => {
                self.outcome = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Root of the validation tree produced by the last successful run.
    pub fn validation_tree(&self) -> Option<&ValidationNode> {
        match &self.outcome {
            Some(Ok(node)) => Some(node),
            _ => None,
        }
    }

    /// Failure recorded by the last run, if it failed.
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.outcome {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    /// Offers a package version to the virtual package list, keeping the
    /// higher version when the name is already known. Returns `false` and
    /// leaves the record unchanged when the offered version is strictly
    /// lower than the stored one. Lets collaborators reconcile packages that
    /// are already installed outside the archive tree.
    pub fn add_virtual_package(&mut self, name: &str, version: Version) -> bool {
        self.virtual_packages.register(name, version)
    }

    /// Version on record for a virtual package, if any. Pure lookup.
    pub fn virtual_package_version(&self, name: &str) -> Option<&Version> {
        self.virtual_packages.version_of(name)
    }

    /// The run-scoped virtual package list.
    pub fn virtual_packages(&self) -> &VirtualPackageList {
        &self.virtual_packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_add_virtual_package_merge() {
        let mut manager = PackageValidationManager::new();
        assert!(manager.add_virtual_package("com.example.lib", version("1.0")));
        assert!(manager.add_virtual_package("com.example.lib", version("2.0")));
        assert!(!manager.add_virtual_package("com.example.lib", version("1.5")));
        assert_eq!(
            manager.virtual_package_version("com.example.lib"),
            Some(&version("2.0"))
        );
    }

    #[test]
    fn test_lookup_unknown_package() {
        let manager = PackageValidationManager::new();
        assert_eq!(manager.virtual_package_version("unknown"), None);
    }

    #[test]
    fn test_no_outcome_before_first_run() {
        let manager = PackageValidationManager::new();
        assert!(manager.validation_tree().is_none());
        assert!(manager.validation_error().is_none());
    }
}
