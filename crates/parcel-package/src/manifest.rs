//! Package manifest parsing and types (package.toml).
//!
//! The manifest inside every archive declares the package name and version,
//! zero or more minimum-version requirements on other packages, and zero or
//! more bundled sub-archives:
//!
//! ```toml
//! [package]
//! name = "com.example.app"
//! version = "1.0.0"
//!
//! [[requiredpackage]]
//! name = "com.example.lib"
//! minversion = "2.0.0"
//!
//! [[bundledarchive]]
//! path = "requirements/com.example.lib.tar"
//! ```

use serde::{Deserialize, Serialize};

use crate::version::Version;
use crate::ValidationError;

/// Parsed and validated package manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDescriptor {
    pub package_name: String,
    pub package_version: Version,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    /// Minimum-version requirements in declaration order.
    pub required_packages: Vec<RequiredPackage>,
    /// Entry paths of bundled sub-archives in declaration order.
    pub bundled_archives: Vec<String>,
    /// Unknown `[package]` keys, preserved for forward compatibility.
    pub extra: toml::Table,
}

/// A declared minimum-version dependency on another package.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredPackage {
    pub name: String,
    pub min_version: Version,
    /// Whether an unresolved requirement may be downgraded to an advisory,
    /// subject to the run's validation options.
    pub optional: bool,
}

/// Wire form of the manifest. Versions stay strings here so that grammar
/// violations surface as the validation taxonomy, not as markup errors.
#[derive(Debug, Serialize, Deserialize)]
struct RawManifest {
    package: RawPackage,
    #[serde(default, rename = "requiredpackage", skip_serializing_if = "Vec::is_empty")]
    required_packages: Vec<RawRequiredPackage>,
    #[serde(default, rename = "bundledarchive", skip_serializing_if = "Vec::is_empty")]
    bundled_archives: Vec<RawBundledArchive>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawPackage {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    license: Option<String>,
    #[serde(flatten)]
    extra: toml::Table,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawRequiredPackage {
    name: String,
    minversion: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    optional: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawBundledArchive {
    path: String,
}

impl ManifestDescriptor {
    /// Parses and validates manifest bytes.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ManifestSyntax`] for malformed markup,
    /// [`ValidationError::InvalidPackageName`] when the package name violates
    /// the name grammar, [`ValidationError::InvalidPackageVersion`] when the
    /// package version or any `minversion` does not parse.
    pub fn parse(bytes: &[u8]) -> crate::Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|err| ValidationError::ManifestSyntax {
            reason: err.to_string(),
        })?;
        Self::from_toml_str(text)
    }

    /// Parses and validates a manifest from its TOML text.
    pub fn from_toml_str(text: &str) -> crate::Result<Self> {
        let raw: RawManifest =
            toml::from_str(text).map_err(|err| ValidationError::ManifestSyntax {
                reason: err.message().to_string(),
            })?;

        if !is_valid_package_name(&raw.package.name) {
            return Err(ValidationError::InvalidPackageName {
                package_name: raw.package.name,
            });
        }
        let package_version = Version::parse(&raw.package.version)?;

        let mut required_packages = Vec::with_capacity(raw.required_packages.len());
        for req in raw.required_packages {
            required_packages.push(RequiredPackage {
                min_version: Version::parse(&req.minversion)?,
                name: req.name,
                optional: req.optional,
            });
        }

        let bundled_archives = raw.bundled_archives.into_iter().map(|b| b.path).collect();

        Ok(ManifestDescriptor {
            package_name: raw.package.name,
            package_version,
            description: raw.package.description,
            author: raw.package.author,
            license: raw.package.license,
            required_packages,
            bundled_archives,
            extra: raw.package.extra,
        })
    }

    /// Serialises the descriptor back to its TOML wire form.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        let raw = RawManifest {
            package: RawPackage {
                name: self.package_name.clone(),
                version: self.package_version.to_string(),
                description: self.description.clone(),
                author: self.author.clone(),
                license: self.license.clone(),
                extra: self.extra.clone(),
            },
            required_packages: self
                .required_packages
                .iter()
                .map(|req| RawRequiredPackage {
                    name: req.name.clone(),
                    minversion: req.min_version.to_string(),
                    optional: req.optional,
                })
                .collect(),
            bundled_archives: self
                .bundled_archives
                .iter()
                .map(|path| RawBundledArchive { path: path.clone() })
                .collect(),
        };
        toml::to_string_pretty(&raw)
    }
}

/// Package names consist of `[A-Za-z0-9._-]`, contain at least one
/// alphanumeric character and neither start nor end with a separator.
pub fn is_valid_package_name(name: &str) -> bool {
    let is_separator = |c: char| c == '.' || c == '_' || c == '-';

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || is_separator(c))
    {
        return false;
    }
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    match (name.chars().next(), name.chars().last()) {
        (Some(first), Some(last)) => !is_separator(first) && !is_separator(last),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationErrorCode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_minimal_manifest() {
        let toml = r#"
            [package]
            name = "com.example.app"
            version = "1.0.0"
        "#;

        let manifest = ManifestDescriptor::from_toml_str(toml).unwrap();
        assert_eq!(manifest.package_name, "com.example.app");
        assert_eq!(manifest.package_version.to_string(), "1.0.0");
        assert!(manifest.required_packages.is_empty());
        assert!(manifest.bundled_archives.is_empty());
    }

    #[test]
    fn test_parse_complete_manifest() {
        let toml = r#"
            [package]
            name = "com.example.app"
            version = "2.1.0 beta 3"
            description = "Example application"
            author = "Example Org"
            license = "MIT"

            [[requiredpackage]]
            name = "com.example.core"
            minversion = "2.0.0"

            [[requiredpackage]]
            name = "com.example.extras"
            minversion = "1.1"
            optional = true

            [[bundledarchive]]
            path = "requirements/com.example.core.tar"
        "#;

        let manifest = ManifestDescriptor::from_toml_str(toml).unwrap();
        assert_eq!(manifest.required_packages.len(), 2);
        assert_eq!(manifest.required_packages[0].name, "com.example.core");
        assert!(!manifest.required_packages[0].optional);
        assert!(manifest.required_packages[1].optional);
        assert_eq!(
            manifest.bundled_archives,
            vec!["requirements/com.example.core.tar".to_string()]
        );
    }

    #[test]
    fn test_declaration_order_preserved() {
        let toml = r#"
            [package]
            name = "app"
            version = "1.0"

            [[requiredpackage]]
            name = "zzz"
            minversion = "1.0"

            [[requiredpackage]]
            name = "aaa"
            minversion = "1.0"
        "#;

        let manifest = ManifestDescriptor::from_toml_str(toml).unwrap();
        let names: Vec<_> = manifest
            .required_packages
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["zzz", "aaa"]);
    }

    #[test]
    fn test_unknown_package_keys_preserved() {
        let toml = r#"
            [package]
            name = "app"
            version = "1.0"
            apiversion = "3"
        "#;

        let manifest = ManifestDescriptor::from_toml_str(toml).unwrap();
        assert_eq!(
            manifest.extra.get("apiversion"),
            Some(&toml::Value::String("3".to_string()))
        );
    }

    #[rstest]
    #[case("com.example.app", true)]
    #[case("example", true)]
    #[case("a-b_c.d", true)]
    #[case("1app", true)]
    #[case("", false)]
    #[case(".app", false)]
    #[case("app.", false)]
    #[case("-app", false)]
    #[case("app_", false)]
    #[case("...", false)]
    #[case("com example", false)]
    #[case("com/example", false)]
    fn test_package_name_grammar(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_package_name(name), valid, "{name}");
    }

    #[test]
    fn test_invalid_name_reported() {
        let toml = r#"
            [package]
            name = ".bad."
            version = "1.0"
        "#;

        let err = ManifestDescriptor::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::InvalidPackageName);
        assert_eq!(err.details().get("packageName"), Some(&".bad.".to_string()));
    }

    #[test]
    fn test_invalid_version_reported() {
        let toml = r#"
            [package]
            name = "app"
            version = "1..0"
        "#;

        let err = ManifestDescriptor::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::InvalidPackageVersion);
    }

    #[test]
    fn test_invalid_minversion_reported() {
        let toml = r#"
            [package]
            name = "app"
            version = "1.0"

            [[requiredpackage]]
            name = "lib"
            minversion = "not a version!"
        "#;

        let err = ManifestDescriptor::from_toml_str(toml).unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::InvalidPackageVersion);
    }

    #[test]
    fn test_markup_error_reported() {
        let err = ManifestDescriptor::from_toml_str("not toml [").unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::ManifestSyntax);

        let err = ManifestDescriptor::parse(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::ManifestSyntax);
    }

    #[test]
    fn test_missing_required_fields_are_markup_errors() {
        let err = ManifestDescriptor::from_toml_str("[package]\nname = \"app\"").unwrap_err();
        assert_eq!(err.code(), ValidationErrorCode::ManifestSyntax);
    }

    #[test]
    fn test_round_trip() {
        let toml = r#"
            [package]
            name = "com.example.app"
            version = "2.1.0 rc 1"
            description = "Example"

            [[requiredpackage]]
            name = "com.example.core"
            minversion = "2.0.0"

            [[requiredpackage]]
            name = "com.example.extras"
            minversion = "1.5"
            optional = true

            [[bundledarchive]]
            path = "requirements/core.tar"

            [[bundledarchive]]
            path = "requirements/extras.tar"
        "#;

        let descriptor = ManifestDescriptor::from_toml_str(toml).unwrap();
        let rendered = descriptor.to_toml_string().unwrap();
        let reparsed = ManifestDescriptor::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, descriptor);
    }
}
