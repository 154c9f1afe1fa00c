//! Recursive validation of a package archive tree.
//!
//! Each archive node is opened, its manifest located and parsed, its package
//! registered into the run-scoped [`VirtualPackageList`], its bundled
//! sub-archives validated recursively, and finally its declared requirements
//! checked against the list. The first failure anywhere aborts the run and
//! propagates unchanged.

use std::collections::BTreeMap;

use crate::archive::ArchiveHandle;
use crate::manifest::ManifestDescriptor;
use crate::version::Version;
use crate::{ValidationError, MANIFEST_ENTRY};

/// Run-scoped record of the highest version seen so far for each package
/// name encountered anywhere in the archive tree.
#[derive(Debug, Default)]
pub struct VirtualPackageList {
    packages: BTreeMap<String, Version>,
}

impl VirtualPackageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package version under the monotonic merge policy: when
    /// the name is already present, the higher version wins. Returns `false`
    /// and leaves the record unchanged when the offered version is strictly
    /// lower than the stored one, `true` otherwise.
    pub fn register(&mut self, name: &str, version: Version) -> bool {
        if let Some(stored) = self.packages.get(name) {
            if version < *stored {
                return false;
            }
        }
        self.packages.insert(name.to_string(), version);
        true
    }

    /// Stored version for a package name, if any.
    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.packages.get(name)
    }

    pub fn clear(&mut self) {
        self.packages.clear();
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.packages.iter().map(|(name, version)| (name.as_str(), version))
    }
}

/// Policy knobs for one validation run.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Bound on archive-in-archive nesting; guards against resource
    /// exhaustion from maliciously deep trees.
    pub max_depth: usize,
    /// When set, an unresolved `optional = true` requirement fails the run
    /// like a required one; otherwise it is advisory and only logged.
    pub fail_on_unresolved_optional: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_depth: 16,
            fail_on_unresolved_optional: false,
        }
    }
}

/// One validated node of the archive tree. Owns its archive handle (and with
/// it any temporary extraction storage), its parsed manifest, and the
/// validated children in manifest declaration order.
#[derive(Debug)]
pub struct ValidationNode {
    descriptor: ManifestDescriptor,
    archive: ArchiveHandle,
    children: Vec<ValidationNode>,
}

impl ValidationNode {
    pub fn descriptor(&self) -> &ManifestDescriptor {
        &self.descriptor
    }

    pub fn archive(&self) -> &ArchiveHandle {
        &self.archive
    }

    pub fn children(&self) -> &[ValidationNode] {
        &self.children
    }

    /// Flattens the tree children-before-parents, the order an installer
    /// processes nodes so that dependencies are in place first.
    pub fn install_order(&self) -> Vec<&ValidationNode> {
        let mut order = Vec::new();
        self.collect_post_order(&mut order);
        order
    }

    fn collect_post_order<'a>(&'a self, order: &mut Vec<&'a ValidationNode>) {
        for child in &self.children {
            child.collect_post_order(order);
        }
        order.push(self);
    }
}

/// Validates one archive node and, recursively, its bundled sub-archives.
///
/// The node's package is registered into `virtual_packages` before its
/// children are validated, so nested archives observe ancestor versions; its
/// own requirements are checked only after all children have registered
/// themselves.
pub fn validate_archive(
    archive: ArchiveHandle,
    virtual_packages: &mut VirtualPackageList,
    options: &ValidationOptions,
    depth: usize,
) -> crate::Result<ValidationNode> {
    if depth > options.max_depth {
        return Err(ValidationError::NestingTooDeep {
            archive: archive.name().to_string(),
            depth,
        });
    }

    let manifest_bytes = archive
        .extract_bytes(MANIFEST_ENTRY)?
        .ok_or_else(|| ValidationError::MissingManifest {
            archive: archive.name().to_string(),
        })?;
    let descriptor = ManifestDescriptor::parse(&manifest_bytes)?;
    log::debug!(
        "validating package '{}' version '{}' from '{}'",
        descriptor.package_name,
        descriptor.package_version,
        archive.name()
    );

    // Advisory bookkeeping: the higher version wins, registering never fails.
    virtual_packages.register(
        &descriptor.package_name,
        descriptor.package_version.clone(),
    );

    let mut children = Vec::with_capacity(descriptor.bundled_archives.len());
    for entry in &descriptor.bundled_archives {
        let nested = archive.extract_nested(entry)?.ok_or_else(|| {
            ValidationError::ArchiveNotFound {
                archive: archive.name().to_string(),
                target_archive: Some(entry.clone()),
            }
        })?;
        children.push(validate_archive(
            nested,
            virtual_packages,
            options,
            depth + 1,
        )?);
    }

    for requirement in &descriptor.required_packages {
        let found = virtual_packages.version_of(&requirement.name);
        let satisfied = found.is_some_and(|version| *version >= requirement.min_version);
        if satisfied {
            continue;
        }
        if requirement.optional && !options.fail_on_unresolved_optional {
            log::warn!(
                "optional package '{}' (>= {}) not satisfied for '{}'",
                requirement.name,
                requirement.min_version,
                descriptor.package_name
            );
            continue;
        }
        return Err(ValidationError::DependencyUnsatisfied {
            package_name: requirement.name.clone(),
            required_version: requirement.min_version.to_string(),
            found_version: found.map(Version::to_string),
        });
    }

    Ok(ValidationNode {
        descriptor,
        archive,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_register_keeps_higher_version() {
        let mut list = VirtualPackageList::new();
        assert!(list.register("com.example.lib", version("1.0")));
        assert!(list.register("com.example.lib", version("2.0")));
        assert_eq!(list.version_of("com.example.lib"), Some(&version("2.0")));
    }

    #[test]
    fn test_register_is_commutative_in_outcome() {
        let mut forward = VirtualPackageList::new();
        forward.register("p", version("1.0"));
        forward.register("p", version("2.0"));

        let mut reverse = VirtualPackageList::new();
        reverse.register("p", version("2.0"));
        assert!(!reverse.register("p", version("1.0")));

        assert_eq!(forward.version_of("p"), reverse.version_of("p"));
        assert_eq!(forward.version_of("p"), Some(&version("2.0")));
    }

    #[test]
    fn test_register_equal_version_returns_true() {
        let mut list = VirtualPackageList::new();
        assert!(list.register("p", version("1.0")));
        assert!(list.register("p", version("1.0.0")));
    }

    #[test]
    fn test_clear_resets_list() {
        let mut list = VirtualPackageList::new();
        list.register("p", version("1.0"));
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.version_of("p"), None);
    }

    #[test]
    fn test_iter_is_deterministic() {
        let mut list = VirtualPackageList::new();
        list.register("b", version("1.0"));
        list.register("a", version("2.0"));
        let names: Vec<_> = list.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
