//! Package archive validation and dependency resolution.
//!
//! Validates tar-style package archives: locates and parses the `package.toml`
//! manifest inside each archive, recursively validates bundled sub-archives,
//! and checks declared minimum-version requirements against the highest
//! version of each package seen anywhere in the archive tree. On success the
//! caller receives a [`ValidationNode`] tree an installer can walk; on failure
//! a single [`ValidationError`] identifies the failing archive and rule.

pub mod archive;
pub mod manager;
pub mod manifest;
pub mod validation;
pub mod version;

pub use archive::ArchiveHandle;
pub use manager::PackageValidationManager;
pub use manifest::{ManifestDescriptor, RequiredPackage};
pub use validation::{ValidationNode, ValidationOptions, VirtualPackageList};
pub use version::{ReleaseStage, Version};

use std::collections::BTreeMap;

/// Well-known manifest entry name inside every package archive.
pub const MANIFEST_ENTRY: &str = "package.toml";

/// Validation failures.
///
/// These are expected outcomes of validating untrusted input, not defects:
/// they are returned verbatim to the caller for display and are never logged
/// by the engine itself. The first failure encountered aborts the whole run;
/// sibling errors are not aggregated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Root or nested archive is missing or not a readable container.
    #[error(fmt = archive_not_found_fmt)]
    ArchiveNotFound {
        archive: String,
        /// Set when a nested archive could not be extracted from its parent;
        /// `archive` then names the outer container.
        target_archive: Option<String>,
    },

    /// The manifest entry is absent from an otherwise readable archive.
    #[error("package information file 'package.toml' not found in '{archive}'")]
    MissingManifest { archive: String },

    /// The manifest entry exists but is not well-formed markup.
    #[error("failed to parse package information file: {reason}")]
    ManifestSyntax { reason: String },

    /// Package name violates the name grammar.
    #[error("'{package_name}' is not a valid package name")]
    InvalidPackageName { package_name: String },

    /// Package version violates the version grammar.
    #[error("package version '{package_version}' is invalid")]
    InvalidPackageVersion { package_version: String },

    /// A declared minimum version is not met, or the package is absent.
    #[error("required package '{package_name}' not satisfied (requires {required_version})")]
    DependencyUnsatisfied {
        package_name: String,
        required_version: String,
        found_version: Option<String>,
    },

    /// Archive-in-archive nesting exceeded the configured bound.
    #[error("nested archive '{archive}' exceeds the depth limit ({depth})")]
    NestingTooDeep { archive: String, depth: usize },
}

fn archive_not_found_fmt(
    archive: &String,
    target_archive: &Option<String>,
    f: &mut std::fmt::Formatter,
) -> std::fmt::Result {
    match target_archive {
        Some(target) => write!(f, "tar archive '{target}' not found in '{archive}'"),
        None => write!(f, "unable to find package archive '{archive}'"),
    }
}

/// Enumerated classification of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorCode {
    ArchiveNotFound,
    MissingManifest,
    ManifestSyntax,
    InvalidPackageName,
    InvalidPackageVersion,
    DependencyUnsatisfied,
    NestingTooDeep,
}

impl ValidationError {
    /// Classification code for this failure.
    pub fn code(&self) -> ValidationErrorCode {
        match self {
            ValidationError::ArchiveNotFound { .. } => ValidationErrorCode::ArchiveNotFound,
            ValidationError::MissingManifest { .. } => ValidationErrorCode::MissingManifest,
            ValidationError::ManifestSyntax { .. } => ValidationErrorCode::ManifestSyntax,
            ValidationError::InvalidPackageName { .. } => ValidationErrorCode::InvalidPackageName,
            ValidationError::InvalidPackageVersion { .. } => {
                ValidationErrorCode::InvalidPackageVersion
            }
            ValidationError::DependencyUnsatisfied { .. } => {
                ValidationErrorCode::DependencyUnsatisfied
            }
            ValidationError::NestingTooDeep { .. } => ValidationErrorCode::NestingTooDeep,
        }
    }

    /// Named detail fields for this failure, for message composition by the
    /// consumer.
    pub fn details(&self) -> BTreeMap<&'static str, String> {
        let mut details = BTreeMap::new();
        match self {
            ValidationError::ArchiveNotFound {
                archive,
                target_archive,
            } => {
                details.insert("archive", archive.clone());
                if let Some(target) = target_archive {
                    details.insert("targetArchive", target.clone());
                }
            }
            ValidationError::MissingManifest { archive } => {
                details.insert("archive", archive.clone());
            }
            ValidationError::ManifestSyntax { reason } => {
                details.insert("reason", reason.clone());
            }
            ValidationError::InvalidPackageName { package_name } => {
                details.insert("packageName", package_name.clone());
            }
            ValidationError::InvalidPackageVersion { package_version } => {
                details.insert("packageVersion", package_version.clone());
            }
            ValidationError::DependencyUnsatisfied {
                package_name,
                required_version,
                found_version,
            } => {
                details.insert("packageName", package_name.clone());
                details.insert("requiredVersion", required_version.clone());
                if let Some(found) = found_version {
                    details.insert("foundVersion", found.clone());
                }
            }
            ValidationError::NestingTooDeep { archive, depth } => {
                details.insert("archive", archive.clone());
                details.insert("depth", depth.to_string());
            }
        }
        details
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;
